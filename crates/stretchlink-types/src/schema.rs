//! Binary encoding shared by every record on the bus.
//!
//! Records are MessagePack maps keyed by field name, so a Python peer doing
//! `msgpack.packb(model.model_dump())` produces identical bytes.  The protocol
//! envelope (see `stretchlink-middleware`) wraps these bytes as its payload.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::LinkError;

/// How strictly decoded records are checked.
///
/// Decided once at process start and passed down explicitly; it never
/// changes while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Run every schema invariant after decoding.
    #[default]
    Strict,
    /// Trust the sender: build the record straight from the decoded map.
    Skip,
}

impl ValidationMode {
    /// Environment variable that selects [`ValidationMode::Skip`] when set to `1`.
    pub const ENV_VAR: &'static str = "SKIP_VALIDATION";

    /// Read [`Self::ENV_VAR`].  Call once at startup.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(Self::ENV_VAR).ok().as_deref())
    }

    /// Interpret a raw value of [`Self::ENV_VAR`].
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some("1") => ValidationMode::Skip,
            _ => ValidationMode::Strict,
        }
    }

    pub fn is_strict(self) -> bool {
        self == ValidationMode::Strict
    }
}

/// A record that travels as a MessagePack payload.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Name used in error messages.
    const NAME: &'static str;

    /// Check cross-field invariants.  Records without invariants keep the
    /// default.
    fn validate(&self) -> Result<(), LinkError> {
        Ok(())
    }

    /// Encode as a field-name-keyed MessagePack map.
    fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| LinkError::Serialization(format!("{}: {e}", Self::NAME)))
    }

    /// Decode from MessagePack, validating unless `mode` is
    /// [`ValidationMode::Skip`].
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Validation`] when the bytes are not a well-formed
    /// record or (in strict mode) when an invariant does not hold.
    fn from_bytes(data: &[u8], mode: ValidationMode) -> Result<Self, LinkError> {
        let message: Self = rmp_serde::from_slice(data)
            .map_err(|e| LinkError::Validation(format!("{}: {e}", Self::NAME)))?;
        if mode.is_strict() {
            message.validate()?;
        }
        Ok(message)
    }
}
