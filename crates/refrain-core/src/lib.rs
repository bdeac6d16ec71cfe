//! Core domain model for refrain.
//!
//! This crate defines the song record and its embedding, the composite
//! text used as embedding input, the SQLite schema, and the
//! [`RecordStore`](store::RecordStore) boundary consumed by the embedding
//! pipeline and the similarity search engine.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;
pub mod store;
pub mod vector;

pub use error::{Error, Result};
pub use model::{Embedding, ModelSpec, NewSong, Song, SongId};
pub use schema::{CatalogStats, Database};
pub use store::RecordStore;
