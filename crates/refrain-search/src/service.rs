//! The search surface: ranked search and readiness status.
//!
//! Each call opens its own store connection and drops it on every exit
//! path. No connection is held while the provider is being called.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use refrain_core::{Database, ModelSpec, RecordStore};
use refrain_embed::{Config, EmbeddingProvider};

use crate::engine::{SearchHit, SimilaritySearch};
use crate::error::{SearchError, SearchResult};
use crate::resolver::QueryResolver;

/// Request bounds and defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub max_query_chars: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_threshold: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_query_chars: 500,
            default_limit: 10,
            max_limit: 50,
            default_threshold: 0.5,
        }
    }
}

impl From<&Config> for SearchOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_query_chars: config.max_query_chars,
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            default_threshold: config.default_threshold,
        }
    }
}

/// Ranked results for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    /// The query as it was sent to the provider.
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    /// Wall time for the whole search, in milliseconds.
    pub processing_time_ms: f64,
}

/// Whether search can run, and how much of the catalog it covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchStatus {
    pub search_available: bool,
    pub total_songs: u64,
    pub embedded_songs: u64,
    /// Songs embedded with a different model configuration.
    pub stale_embeddings: u64,
    pub pending_songs: u64,
    /// Share of songs embedded with the current model, to two decimals.
    pub coverage_percent: f64,
    pub model: String,
    pub dimensions: usize,
}

impl SearchStatus {
    /// Coverage of `model` in `store`. Needs no provider.
    ///
    /// # Errors
    /// Returns [`SearchError::Store`] if the store cannot be read.
    pub fn collect<S: RecordStore + ?Sized>(store: &S, model: &ModelSpec) -> SearchResult<Self> {
        let stats = store.embedding_stats(model)?;

        Ok(Self {
            search_available: stats.embedded > 0,
            total_songs: stats.total,
            embedded_songs: stats.embedded,
            stale_embeddings: stats.stale,
            pending_songs: stats.pending,
            coverage_percent: stats.coverage_percent(),
            model: model.name.clone(),
            dimensions: model.dimensions,
        })
    }
}

/// Answers search and status requests against one catalog database.
#[derive(Debug)]
pub struct SearchService<P: ?Sized> {
    db_path: PathBuf,
    options: SearchOptions,
    resolver: QueryResolver<P>,
}

impl<P: EmbeddingProvider + ?Sized> SearchService<P> {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>, provider: Arc<P>, options: SearchOptions) -> Self {
        Self {
            db_path: db_path.into(),
            resolver: QueryResolver::new(provider, options.max_query_chars),
            options,
        }
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[must_use]
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    fn model(&self) -> &ModelSpec {
        self.resolver.provider().model()
    }

    fn open(&self) -> SearchResult<Database> {
        Ok(Database::open(&self.db_path)?)
    }

    /// Search the catalog for songs similar to `query`.
    ///
    /// `None` picks the configured default limit or threshold. Readiness is
    /// checked before the provider is called, so an unembedded catalog
    /// never costs a provider request.
    ///
    /// # Errors
    /// - [`SearchError::InvalidQuery`] for a bad query, limit or threshold
    /// - [`SearchError::NoEmbeddingsAvailable`] if nothing is embedded yet
    /// - [`SearchError::QueryEmbedding`] if the provider fails
    /// - [`SearchError::Store`] if the database cannot be read
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f64>,
    ) -> SearchResult<SearchResponse> {
        let started = Instant::now();
        let limit = limit.unwrap_or(self.options.default_limit);
        let threshold = threshold.unwrap_or(self.options.default_threshold);
        self.check_parameters(limit, threshold)?;

        {
            let db = self.open()?;
            SimilaritySearch::new(&db, self.model().clone()).ensure_ready()?;
        }

        let resolved = self.resolver.resolve(query).await?;

        let results = {
            let db = self.open()?;
            SimilaritySearch::new(&db, self.model().clone()).search(
                &resolved.embedding.values,
                limit,
                threshold,
            )?
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Search {:?}: {} results in {:.2} ms",
            resolved.text,
            results.len(),
            elapsed_ms
        );

        Ok(SearchResponse {
            query: resolved.text,
            total_results: results.len(),
            results,
            processing_time_ms: (elapsed_ms * 100.0).round() / 100.0,
        })
    }

    /// [`search`](Self::search), abandoned as soon as `shutdown` resolves.
    ///
    /// Dropping the search future aborts the in-flight provider request.
    ///
    /// # Errors
    /// Returns [`SearchError::Cancelled`] if `shutdown` wins, otherwise
    /// whatever [`search`](Self::search) returns.
    pub async fn search_until<F>(
        &self,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f64>,
        shutdown: F,
    ) -> SearchResult<SearchResponse>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = shutdown => {
                log::debug!("Search cancelled by caller");
                Err(SearchError::Cancelled)
            }
            result = self.search(query, limit, threshold) => result,
        }
    }

    /// Embedding coverage relative to the configured model.
    ///
    /// # Errors
    /// Returns [`SearchError::Store`] if the database cannot be read.
    pub fn status(&self) -> SearchResult<SearchStatus> {
        let db = self.open()?;
        SearchStatus::collect(&db, self.model())
    }

    fn check_parameters(&self, limit: usize, threshold: f64) -> SearchResult<()> {
        if !(1..=self.options.max_limit).contains(&limit) {
            return Err(SearchError::InvalidQuery(format!(
                "limit must be between 1 and {}, got {limit}",
                self.options.max_limit
            )));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SearchError::InvalidQuery(format!(
                "threshold must be between 0 and 1, got {threshold}"
            )));
        }
        Ok(())
    }
}
