//! The record store boundary.
//!
//! The embedding pipeline and the similarity search engine only talk to
//! storage through [`RecordStore`], which returns typed projections
//! ([`Song`], [`ScoredSong`], [`EmbeddingStats`]) rather than raw rows.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Embedding, ModelSpec, Song, SongId};

/// Which songs to select by embedding state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EmbeddingFilter {
    #[default]
    Any,
    /// Songs with no embedding, or with one produced by a different model
    /// configuration (stale).
    Pending(ModelSpec),
    /// Songs whose embedding was produced by exactly this model
    /// configuration.
    Current(ModelSpec),
}

/// Literal filter over the catalog. Results are always ordered by
/// ascending id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongFilter {
    /// Case-insensitive substring match on the artist name.
    pub artist: Option<String>,
    pub year: Option<i32>,
    /// Case-insensitive substring match on the title or lyrics.
    pub text: Option<String>,
    pub embedding: EmbeddingFilter,
    /// Keyset cursor: only songs with an id strictly greater than this.
    pub after: Option<SongId>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SongFilter {
    /// Songs that still need an embedding from `model`.
    #[must_use]
    pub fn pending(model: &ModelSpec) -> Self {
        Self {
            embedding: EmbeddingFilter::Pending(model.clone()),
            ..Self::default()
        }
    }

    /// Songs embedded with `model`.
    #[must_use]
    pub fn current(model: &ModelSpec) -> Self {
        Self {
            embedding: EmbeddingFilter::Current(model.clone()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn after(mut self, id: SongId) -> Self {
        self.after = Some(id);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Distance functions the store can order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// `1 - cosine similarity`, in `[0, 2]`.
    #[default]
    Cosine,
}

impl DistanceMetric {
    /// Name of the SQL function implementing this metric.
    #[must_use]
    pub const fn sql_function(self) -> &'static str {
        match self {
            Self::Cosine => "cosine_distance",
        }
    }
}

/// Candidate restriction for a distance scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFilter {
    /// Only embeddings produced by this model configuration are scanned.
    pub model: ModelSpec,
    /// Drop candidates farther than this. `None` scans every candidate.
    pub max_distance: Option<f64>,
}

/// A song paired with its distance to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSong {
    pub song: Song,
    pub distance: f64,
}

/// One embedding write within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingUpdate {
    pub id: SongId,
    pub embedding: Embedding,
}

impl EmbeddingUpdate {
    #[must_use]
    pub fn new(id: SongId, embedding: Embedding) -> Self {
        Self { id, embedding }
    }
}

/// Embedding coverage of the catalog relative to one model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total: u64,
    /// Songs embedded with the current model configuration.
    pub embedded: u64,
    /// Songs whose embedding came from another model configuration.
    pub stale: u64,
    /// Songs needing (re-)embedding: missing plus stale.
    pub pending: u64,
}

impl EmbeddingStats {
    /// Percentage of the catalog embedded with the current model, rounded
    /// to two decimals. An empty catalog has zero coverage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let raw = self.embedded as f64 / self.total as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }
}

/// Storage operations consumed by the pipeline and the search engine.
///
/// Every call is one logical operation: writes either commit fully or
/// leave the store unchanged.
pub trait RecordStore {
    /// Songs matching `filter`, ordered by ascending id.
    fn find(&self, filter: &SongFilter) -> Result<Vec<Song>>;

    /// Number of songs matching `filter`, ignoring its limit and offset.
    fn count(&self, filter: &SongFilter) -> Result<u64>;

    fn get(&self, id: SongId) -> Result<Option<Song>>;

    /// Songs with a current embedding ordered by distance to `query`
    /// (ascending), ties broken by ascending id.
    fn scan_with_distance(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        filter: &ScanFilter,
        limit: usize,
    ) -> Result<Vec<ScoredSong>>;

    /// Attach (or replace) one song's embedding.
    fn update_embedding(&mut self, id: SongId, embedding: &Embedding) -> Result<()>;

    /// Attach embeddings to several songs in a single transaction. If any
    /// write fails, none are applied.
    fn commit_batch(&mut self, updates: &[EmbeddingUpdate]) -> Result<()>;

    fn embedding_stats(&self, model: &ModelSpec) -> Result<EmbeddingStats>;
}
