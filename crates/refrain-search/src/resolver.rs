//! Query text to query vector.

use std::sync::Arc;

use refrain_core::Embedding;
use refrain_embed::{EmbedError, EmbeddingProvider};

use crate::error::{SearchError, SearchResult};

/// Normalise a raw query: trim, collapse whitespace runs to one space,
/// and enforce `1..=max_chars` characters with no control characters.
///
/// # Errors
/// Returns [`SearchError::InvalidQuery`] describing the first problem.
pub fn sanitize_query(raw: &str, max_chars: usize) -> SearchResult<String> {
    let query = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if query.is_empty() {
        return Err(SearchError::InvalidQuery("query is empty".to_string()));
    }
    if query.chars().any(char::is_control) {
        return Err(SearchError::InvalidQuery(
            "query contains control characters".to_string(),
        ));
    }
    let chars = query.chars().count();
    if chars > max_chars {
        return Err(SearchError::InvalidQuery(format!(
            "query has {chars} characters, limit is {max_chars}"
        )));
    }
    Ok(query)
}

/// A sanitised query and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub text: String,
    pub embedding: Embedding,
}

/// Turns user queries into vectors with the shared provider.
#[derive(Debug)]
pub struct QueryResolver<P: ?Sized> {
    max_chars: usize,
    provider: Arc<P>,
}

impl<P: EmbeddingProvider + ?Sized> QueryResolver<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, max_chars: usize) -> Self {
        Self {
            max_chars,
            provider,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Sanitise `raw` and embed it.
    ///
    /// # Errors
    /// Returns [`SearchError::InvalidQuery`] before any provider call if
    /// the text is unusable, and [`SearchError::QueryEmbedding`] wrapping
    /// the provider's own classification if embedding fails.
    pub async fn resolve(&self, raw: &str) -> SearchResult<ResolvedQuery> {
        let text = sanitize_query(raw, self.max_chars)?;

        let embedding = self
            .provider
            .embed_one(&text)
            .await
            .map_err(SearchError::QueryEmbedding)?;

        if !embedding.matches(self.provider.model()) {
            return Err(SearchError::QueryEmbedding(EmbedError::ProviderRejected {
                message: format!(
                    "query embedding has {} dims from {}, expected {}",
                    embedding.dimensions(),
                    embedding.model,
                    self.provider.model()
                ),
            }));
        }

        Ok(ResolvedQuery { text, embedding })
    }
}
