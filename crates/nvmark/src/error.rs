//! Error types for annotation operations.

use thiserror::Error;

use crate::backend::RangeId;

/// Result type alias for annotation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller of an annotation operation.
///
/// Every variant describes caller misuse or misconfiguration. None of them
/// is transient, so nothing in this crate retries. When annotation is
/// globally disabled no operation produces any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Color is neither an integer, a palette name, nor resolvable by a
    /// registered external resolver.
    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    /// `pop_range` with no open push/pop range for the domain on this thread.
    #[error("Range stack underflow in domain {domain}")]
    RangeStackUnderflow {
        /// Display name of the domain that was popped.
        domain: String,
    },

    /// `end_range` with an id that is not outstanding.
    #[error("Unknown range id: {0}")]
    UnknownRangeId(RangeId),

    /// The process-wide runtime was already configured.
    #[error("Annotation runtime already initialized")]
    AlreadyInitialized,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidColor("chartreuse-ish".to_string());
        assert!(err.to_string().contains("chartreuse-ish"));

        let err = Error::RangeStackUnderflow {
            domain: "io".to_string(),
        };
        assert!(err.to_string().contains("underflow"));
        assert!(err.to_string().contains("io"));

        let err = Error::UnknownRangeId(RangeId(42));
        assert!(err.to_string().contains("42"));

        let err = Error::Config("bad backend".to_string());
        assert!(err.to_string().contains("bad backend"));
    }
}
