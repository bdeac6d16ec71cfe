pub mod db;
pub mod functions;
pub mod migrations;

pub use db::{ArtistCount, CatalogStats, Database};
