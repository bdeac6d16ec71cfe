//! Search error types.

use refrain_embed::EmbedError;
use thiserror::Error;

/// Errors that can occur while answering a search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// No song has an embedding for the configured model yet.
    #[error("semantic search is not available: no embeddings found, run `refrain embed` first")]
    NoEmbeddingsAvailable,

    /// The query text or a search parameter is unusable.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The provider could not embed the query.
    #[error("failed to embed query: {0}")]
    QueryEmbedding(#[source] EmbedError),

    /// The store could not be read.
    #[error("store error: {0}")]
    Store(#[from] refrain_core::Error),

    /// The caller went away before the search finished.
    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    /// Returns `true` when the search could not run at all for reasons on
    /// the service side, as opposed to a bad request.
    #[must_use]
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Self::NoEmbeddingsAvailable | Self::QueryEmbedding(_) | Self::Store(_)
        )
    }

    /// Returns `true` when retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::QueryEmbedding(err) => err.is_transient(),
            Self::NoEmbeddingsAvailable | Self::Store(_) => true,
            Self::InvalidQuery(_) | Self::Cancelled => false,
        }
    }
}

/// Convenience alias for search results.
pub type SearchResult<T> = std::result::Result<T, SearchError>;
