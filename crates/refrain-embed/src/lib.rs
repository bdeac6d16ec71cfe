//! Embedding generation for refrain.
//!
//! Provides the embedding provider boundary and its OpenAI-compatible
//! client, the batch generation pipeline with per-song fallback, bulk
//! catalog import, and the import and embed stages as treadle `Stage`
//! implementations.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod openai;
pub mod pipeline;
pub mod provider;
pub mod resilience;
pub mod stage;
pub mod testing;
pub mod work_item;

pub use config::Config;
pub use error::{EmbedError, EmbedResult};
pub use generate::{EmbeddingPipeline, FailureKind, PipelineOptions, PipelineReport, RecordFailure};
pub use ingest::{import_path, ImportReport};
pub use openai::{OpenAiEmbedder, ProviderSettings};
pub use pipeline::{build_pipeline, build_pipeline_with_provider};
pub use provider::EmbeddingProvider;
pub use resilience::{Pacer, StopSignal};
pub use stage::{EmbedStage, ImportStage};
pub use work_item::CatalogJob;
