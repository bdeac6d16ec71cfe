//! Error types for embedding generation and catalog import.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the embedding provider or
/// persisting its results.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Transport failure, timeout, rate limit or provider-side 5xx.
    /// Retrying later may succeed.
    #[error("embedding provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// The provider refused the input, or answered in a way that violates
    /// the wire contract. Retrying the same input will not help.
    #[error("embedding provider rejected the request: {message}")]
    ProviderRejected { message: String },

    /// A store write or commit failed.
    #[error("failed to persist embeddings: {0}")]
    Persistence(#[from] refrain_core::Error),

    /// A catalog source file could not be read.
    #[error("import failed for {}: {message}", path.display())]
    Import { path: PathBuf, message: String },

    /// Required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EmbedError {
    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        Self::ProviderRejected {
            message: message.into(),
        }
    }

    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    /// Returns `true` for failures reported by the provider, as opposed to
    /// local storage or configuration problems.
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::ProviderRejected { .. }
        )
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::rejected(format!("invalid request: {err}"))
        } else if err.is_timeout() || err.is_connect() || err.is_body() {
            Self::unavailable(err.to_string())
        } else if err.is_decode() {
            Self::rejected(format!("malformed response: {err}"))
        } else {
            match err.status() {
                Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                    Self::rejected(err.to_string())
                }
                _ => Self::unavailable(err.to_string()),
            }
        }
    }
}

/// Convenience alias for embedding results.
pub type EmbedResult<T> = std::result::Result<T, EmbedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EmbedError::unavailable("timeout").is_transient());
        assert!(!EmbedError::rejected("bad input").is_transient());
        assert!(!EmbedError::Config("no key".to_string()).is_transient());
    }

    #[test]
    fn test_provider_error_classification() {
        assert!(EmbedError::unavailable("x").is_provider_error());
        assert!(EmbedError::rejected("x").is_provider_error());
        let persistence = EmbedError::from(refrain_core::Error::InvalidData("x".to_string()));
        assert!(!persistence.is_provider_error());
    }

    #[test]
    fn test_import_error_display() {
        let err = EmbedError::Import {
            path: PathBuf::from("/data/songs.jsonl"),
            message: "unreadable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "import failed for /data/songs.jsonl: unreadable"
        );
    }
}
