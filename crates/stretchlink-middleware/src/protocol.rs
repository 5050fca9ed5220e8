//! Timestamped multipart envelope.
//!
//! ```text
//! frame 0: u64 big-endian, nanoseconds since the Unix epoch
//! frame 1: payload bytes (opaque)
//! ```
//!
//! Topic-routed traffic prepends a topic frame in front of these two; the
//! envelope itself is transport-agnostic.

use chrono::Utc;
use stretchlink_types::LinkError;

/// Size of the timestamp frame.
pub const TIMESTAMP_LEN: usize = 8;

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedMessage {
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

/// Wall-clock nanoseconds since the epoch, or zero when the clock is outside
/// the range a `u64` of nanoseconds can hold.
pub fn now_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |ns| u64::try_from(ns).unwrap_or(0))
}

/// Wrap `payload` with the current time.
pub fn encode_with_timestamp(payload: Vec<u8>) -> Vec<Vec<u8>> {
    encode_at(now_ns(), payload)
}

/// Wrap `payload` with an explicit timestamp.
pub fn encode_at(timestamp_ns: u64, payload: Vec<u8>) -> Vec<Vec<u8>> {
    vec![timestamp_ns.to_be_bytes().to_vec(), payload]
}

/// Split a two-frame envelope.
///
/// # Errors
///
/// [`LinkError::Framing`] if `frames` does not hold exactly two frames or
/// the first frame is not [`TIMESTAMP_LEN`] bytes.
pub fn decode_with_timestamp<F: AsRef<[u8]>>(
    frames: &[F],
) -> Result<TimestampedMessage, LinkError> {
    let [timestamp, payload] = frames else {
        return Err(LinkError::Framing(format!(
            "expected 2 frames, got {}",
            frames.len()
        )));
    };
    let timestamp: [u8; TIMESTAMP_LEN] = timestamp.as_ref().try_into().map_err(|_| {
        LinkError::Framing(format!(
            "timestamp frame must be {TIMESTAMP_LEN} bytes, got {}",
            timestamp.as_ref().len()
        ))
    })?;
    Ok(TimestampedMessage {
        timestamp_ns: u64::from_be_bytes(timestamp),
        payload: payload.as_ref().to_vec(),
    })
}
