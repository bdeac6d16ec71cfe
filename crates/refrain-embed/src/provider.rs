//! The embedding provider boundary.

use std::fmt;
use std::sync::Arc;

use refrain_core::{Embedding, ModelSpec};

use crate::error::EmbedResult;

/// Turns text into vectors.
///
/// Implementations hold no per-call state and are shared between the
/// generation pipeline and concurrent search requests.
///
/// `embed` returns exactly one embedding per input, in input order, each
/// tagged with [`model`](Self::model). Failures are classified as
/// [`ProviderUnavailable`](crate::EmbedError::ProviderUnavailable) (worth
/// retrying later) or [`ProviderRejected`](crate::EmbedError::ProviderRejected)
/// (the input itself is the problem).
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + fmt::Debug {
    /// The model configuration this provider produces vectors for.
    fn model(&self) -> &ModelSpec;

    async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Embedding>>;

    /// Embed one text.
    async fn embed_one(&self, text: &str) -> EmbedResult<Embedding> {
        let mut embeddings = self.embed(&[text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| crate::EmbedError::ProviderRejected {
            message: "provider returned no embedding".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn model(&self) -> &ModelSpec {
        (**self).model()
    }

    async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Embedding>> {
        (**self).embed(texts).await
    }

    async fn embed_one(&self, text: &str) -> EmbedResult<Embedding> {
        (**self).embed_one(text).await
    }
}

/// Check a provider answer against the request it was given.
pub(crate) fn check_response(
    model: &ModelSpec,
    requested: usize,
    embeddings: &[Embedding],
) -> EmbedResult<()> {
    if embeddings.len() != requested {
        return Err(crate::EmbedError::ProviderRejected {
            message: format!(
                "provider returned {} embeddings for {} inputs",
                embeddings.len(),
                requested
            ),
        });
    }
    if let Some(bad) = embeddings.iter().find(|e| !e.matches(model)) {
        return Err(crate::EmbedError::ProviderRejected {
            message: format!(
                "provider returned a {}-dim vector from {}, expected {}",
                bad.dimensions(),
                bad.model,
                model
            ),
        });
    }
    Ok(())
}
