//! Domain error types.

use thiserror::Error;

/// Errors raised by domain value validation and state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Digest string is not `sha256:<64 lowercase hex>`
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    /// Unknown provider tag
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A persisted enum column held a value this build does not know
    #[error("Invalid {field} value: {value}")]
    InvalidEnumValue {
        /// Column or field name
        field: &'static str,
        /// The offending stored value
        value: String,
    },

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: &'static str,
        /// The attempted target state
        to: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = DomainError::InvalidDigest("md5:abc".into());
        assert_eq!(err.to_string(), "Invalid digest: md5:abc");

        let err = DomainError::InvalidEnumValue {
            field: "state",
            value: "vanished".into(),
        };
        assert_eq!(err.to_string(), "Invalid state value: vanished");
    }
}
