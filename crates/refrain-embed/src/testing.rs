//! A deterministic, scriptable embedding provider for tests.
//!
//! Used by this crate's tests and by downstream crates that need a
//! provider without network access.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use refrain_core::{Embedding, ModelSpec};

use crate::error::{EmbedError, EmbedResult};
use crate::provider::EmbeddingProvider;

#[derive(Debug, Default)]
struct MockState {
    batch_sizes: Vec<usize>,
    texts: Vec<String>,
    transient_failures_left: usize,
}

/// A provider that derives vectors from a hash of the input text.
///
/// The same text always maps to the same vector. Exact vectors can be
/// pinned per text, and failures can be scripted.
#[derive(Debug)]
pub struct MockProvider {
    model: ModelSpec,
    pinned: HashMap<String, Vec<f32>>,
    fail_batches: bool,
    reject_needles: Vec<String>,
    latency: Option<Duration>,
    state: Mutex<MockState>,
}

impl MockProvider {
    #[must_use]
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            pinned: HashMap::new(),
            fail_batches: false,
            reject_needles: Vec::new(),
            latency: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Return exactly `values` for `text`.
    #[must_use]
    pub fn with_vector(mut self, text: impl Into<String>, values: Vec<f32>) -> Self {
        self.pinned.insert(text.into(), values);
        self
    }

    /// Fail every call with more than one input as unavailable.
    #[must_use]
    pub fn failing_batches(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    /// Reject any call that includes a text containing `needle`.
    #[must_use]
    pub fn rejecting(mut self, needle: impl Into<String>) -> Self {
        self.reject_needles.push(needle.into());
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` calls as unavailable.
    pub fn fail_next(&self, n: usize) {
        self.state().transient_failures_left = n;
    }

    /// Number of `embed` calls received, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state().batch_sizes.len()
    }

    /// Input count of every call, in call order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_sizes.clone()
    }

    /// Every text received, in call order.
    #[must_use]
    pub fn texts_seen(&self) -> Vec<String> {
        self.state().texts.clone()
    }

    /// The vector this provider returns for `text`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(values) = self.pinned.get(text) {
            return values.clone();
        }
        (0..self.model.dimensions)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                let bucket = hasher.finish() % 2001;
                bucket as f32 / 1000.0 - 1.0
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn model(&self) -> &ModelSpec {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Embedding>> {
        let transient = {
            let mut state = self.state();
            state.batch_sizes.push(texts.len());
            state.texts.extend(texts.iter().cloned());
            if state.transient_failures_left > 0 {
                state.transient_failures_left -= 1;
                true
            } else {
                false
            }
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if transient {
            return Err(EmbedError::ProviderUnavailable {
                message: "scripted outage".to_string(),
            });
        }
        if texts.is_empty() {
            return Err(EmbedError::ProviderRejected {
                message: "no input texts".to_string(),
            });
        }
        if self.fail_batches && texts.len() > 1 {
            return Err(EmbedError::ProviderUnavailable {
                message: format!("batch of {} timed out", texts.len()),
            });
        }
        if let Some(needle) = self
            .reject_needles
            .iter()
            .find(|needle| texts.iter().any(|text| text.contains(needle.as_str())))
        {
            return Err(EmbedError::ProviderRejected {
                message: format!("input contains {needle:?}"),
            });
        }

        Ok(texts
            .iter()
            .map(|text| Embedding::new(self.model.name.clone(), self.vector_for(text)))
            .collect())
    }
}
