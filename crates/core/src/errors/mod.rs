//! Error types and Result alias for the PEcoin services

use thiserror::Error;

/// Main error type shared by every PEcoin crate
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied a malformed request; never retried
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("{kind} #{id} not found")]
    EntityNotFound { kind: String, id: i64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether this error came from a slow or failing collaborator.
    ///
    /// Transient errors are absorbed by the caches and downgraded to a
    /// default value; everything else is reported to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::ApiError(_) | Error::NetworkError(_) | Error::InvalidData(_)
        )
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                after_ms: 0,
            }
        } else if err.is_decode() {
            Error::InvalidData(err.to_string())
        } else {
            Error::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Timeout { operation: "rpc".into(), after_ms: 5000 }.is_transient());
        assert!(Error::ApiError("502".into()).is_transient());
        assert!(!Error::ValidationError("mint is empty".into()).is_transient());
        assert!(!Error::EntityNotFound { kind: "team".into(), id: 4 }.is_transient());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout { operation: "balance batch".into(), after_ms: 5000 };
        assert_eq!(err.to_string(), "balance batch timed out after 5000ms");
    }
}
