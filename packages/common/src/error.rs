use serde::{Deserialize, Serialize};

/// How a failure is treated by the editing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Operation preconditions did not hold (stale position, cycle, ...)
    IncorrectOperation,

    /// Nothing registered to handle a node, attribute or marker
    Configuration,

    /// A core invariant broke. Never rolled back, never retried.
    InvariantViolation,
}

impl ErrorClass {
    /// Recoverable failures abort the command and roll its operations back
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorClass::InvariantViolation)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::IncorrectOperation => "IncorrectOperation",
            ErrorClass::Configuration => "ConfigurationError",
            ErrorClass::InvariantViolation => "InvariantViolation",
        };
        f.write_str(name)
    }
}

/// Implemented by every package error so callers can decide on rollback
/// without matching on foreign variants.
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_recoverable(&self) -> bool {
        self.class().is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Broken;

    impl Classify for Broken {
        fn class(&self) -> ErrorClass {
            ErrorClass::InvariantViolation
        }
    }

    #[test]
    fn test_only_invariant_violations_are_fatal() {
        assert!(ErrorClass::IncorrectOperation.is_recoverable());
        assert!(ErrorClass::Configuration.is_recoverable());
        assert!(!ErrorClass::InvariantViolation.is_recoverable());
        assert!(!Broken.is_recoverable());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ErrorClass::Configuration.to_string(), "ConfigurationError");
        assert_eq!(
            ErrorClass::IncorrectOperation.to_string(),
            "IncorrectOperation"
        );
    }
}
