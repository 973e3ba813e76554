// error.rs - Error types for compilation and matching.
//
// One public enum covering the whole failure surface: argument validation
// at the API boundary, the match deadline, internal invariant breakage
// inside the VM, and misuse of an empty result.

use std::fmt;
use std::time::Duration;

/// Error type for pattern writing and matching operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad argument at the public API boundary (out-of-range start
    /// position, negative count, malformed replacement pattern).
    InvalidArgument { message: String },
    /// Matching exceeded its configured deadline.
    Timeout {
        /// The configured budget that was exhausted.
        timeout: Duration,
        /// Leading fragment of the input being scanned when the deadline hit.
        input_prefix: String,
    },
    /// Internal engine bug: unknown opcode, malformed program, stack
    /// underflow. Should not occur in correct usage.
    Internal { message: String },
    /// A result was requested from a match that did not succeed.
    NoResult,
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Error {
        Error::InvalidArgument { message: message.into() }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Error {
        Error::Internal { message: message.into() }
    }

    pub(crate) fn timeout(timeout: Duration, input: &str) -> Error {
        const PREFIX_LEN: usize = 40;
        let mut end = input.len().min(PREFIX_LEN);
        while !input.is_char_boundary(end) {
            end -= 1;
        }
        Error::Timeout {
            timeout,
            input_prefix: input[..end].to_string(),
        }
    }

    /// Returns true for the deadline-exceeded variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            Error::Timeout { timeout, input_prefix } => write!(
                f,
                "match timed out after {:?} (input starts {:?})",
                timeout, input_prefix
            ),
            Error::Internal { message } => write!(f, "internal error: {}", message),
            Error::NoResult => write!(f, "no result available for a failed match"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_argument() {
        let err = Error::invalid("start position out of range");
        assert_eq!(
            err.to_string(),
            "invalid argument: start position out of range"
        );
    }

    #[test]
    fn timeout_prefix_is_truncated_on_char_boundary() {
        let input = "é".repeat(40);
        let err = Error::timeout(Duration::from_millis(50), &input);
        match err {
            Error::Timeout { input_prefix, .. } => {
                assert!(input_prefix.len() <= 40);
                assert!(input.starts_with(&input_prefix));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn is_timeout() {
        assert!(Error::timeout(Duration::from_millis(1), "x").is_timeout());
        assert!(!Error::NoResult.is_timeout());
    }

    #[test]
    fn error_trait_object() {
        let err: Box<dyn std::error::Error> = Box::new(Error::NoResult);
        assert_eq!(err.to_string(), "no result available for a failed match");
    }
}
