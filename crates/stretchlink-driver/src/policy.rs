//! Motion policy: checks applied to base motion before it reaches hardware.
//!
//! A [`MotionPolicy`] holds an ordered list of [`Rule`]s.  Rules only look
//! at the requested base motion; joint ranges are left to the hardware
//! layer.  What a violation means is up to the caller: streamed commands
//! are discarded with a warning, while `goto` reports it as an error.
//!
//! # Example
//!
//! ```rust
//! use stretchlink_driver::policy::MotionPolicy;
//! use stretchlink_types::Twist2D;
//!
//! let policy = MotionPolicy::standard();
//! assert!(policy.check(&Twist2D::new(0.1, 0.0)).is_ok());
//! assert!(policy.check(&Twist2D::new(0.1, 0.2)).is_err());
//! ```

use stretchlink_types::{LinkError, Twist2D};

/// One check on a requested base motion.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// [`LinkError::Validation`] describing the violation.
    fn check(&self, motion: &Twist2D) -> Result<(), LinkError>;
}

#[derive(Default)]
pub struct MotionPolicy {
    rules: Vec<Box<dyn Rule>>,
}

impl MotionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The policy every controller runs with: [`BaseExclusivityRule`].
    pub fn standard() -> Self {
        let mut policy = Self::new();
        policy.add_rule(Box::new(BaseExclusivityRule));
        policy
    }

    /// Rules run in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// First violation found, or `Ok(())`.
    pub fn check(&self, motion: &Twist2D) -> Result<(), LinkError> {
        for rule in &self.rules {
            rule.check(motion)?;
        }
        Ok(())
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// The base can translate or rotate in one command, never both.
pub struct BaseExclusivityRule;

impl Rule for BaseExclusivityRule {
    fn name(&self) -> &str {
        "base_exclusivity"
    }

    fn check(&self, motion: &Twist2D) -> Result<(), LinkError> {
        if motion.is_compound() {
            return Err(LinkError::Validation(format!(
                "both linear ({}) and angular ({}) are non-zero; only one can be non-zero at a time",
                motion.linear, motion.angular
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MaxTranslation(f64);

    impl Rule for MaxTranslation {
        fn name(&self) -> &str {
            "max_translation"
        }

        fn check(&self, motion: &Twist2D) -> Result<(), LinkError> {
            if motion.linear.abs() > self.0 {
                return Err(LinkError::Validation("too far".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn single_axis_motion_passes() {
        let policy = MotionPolicy::standard();
        assert!(policy.check(&Twist2D::new(0.0, 0.0)).is_ok());
        assert!(policy.check(&Twist2D::new(0.5, 0.0)).is_ok());
        assert!(policy.check(&Twist2D::new(0.0, -1.2)).is_ok());
    }

    #[test]
    fn compound_motion_is_rejected_with_both_values() {
        let err = MotionPolicy::standard()
            .check(&Twist2D::new(0.1, 0.2))
            .unwrap_err();
        match err {
            LinkError::Validation(msg) => {
                assert!(msg.contains("0.1"));
                assert!(msg.contains("0.2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_policy_allows_everything() {
        assert!(MotionPolicy::new().check(&Twist2D::new(3.0, 3.0)).is_ok());
    }

    #[test]
    fn rules_run_in_insertion_order() {
        let mut policy = MotionPolicy::standard();
        policy.add_rule(Box::new(MaxTranslation(1.0)));
        assert_eq!(policy.rule_names(), vec!["base_exclusivity", "max_translation"]);

        let err = policy.check(&Twist2D::new(2.0, 0.0)).unwrap_err();
        assert_eq!(err, LinkError::Validation("too far".to_string()));
        // Exclusivity is reported before the second rule is consulted.
        let err = policy.check(&Twist2D::new(2.0, 1.0)).unwrap_err();
        assert!(matches!(err, LinkError::Validation(ref m) if m.contains("only one")));
    }
}
