pub mod composite;
pub mod embedding;
pub mod ids;
pub mod song;

pub use composite::{clean_text, composite_text, truncate_chars};
pub use embedding::{Embedding, ModelSpec};
pub use ids::SongId;
pub use song::{NewSong, Song};
