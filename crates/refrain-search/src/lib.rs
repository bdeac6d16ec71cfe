//! Semantic search for refrain.
//!
//! Ranks songs by cosine similarity between their stored embeddings and
//! the embedding of a natural-language query, and reports whether the
//! catalog is ready to be searched.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod engine;
pub mod error;
pub mod resolver;
pub mod service;
pub mod suggestions;

pub use engine::{SearchHit, SimilaritySearch};
pub use error::{SearchError, SearchResult};
pub use resolver::{sanitize_query, QueryResolver, ResolvedQuery};
pub use service::{SearchOptions, SearchResponse, SearchService, SearchStatus};
pub use suggestions::{suggestions, SuggestionGroup, Suggestions};
