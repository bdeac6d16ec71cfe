use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::composite::composite_text;
use crate::model::ids::SongId;

/// A stored song: literal attributes, lyrics, and the composite text that
/// was (or will be) fed to the embedding provider.
///
/// The embedding itself is not part of this projection. Use
/// [`RecordStore::scan_with_distance`](crate::store::RecordStore::scan_with_distance)
/// to rank songs by their vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub track_name: String,
    pub artist_name: String,
    pub album: Option<String>,
    pub year: Option<i32>,

    /// Free-form release date as found in the source dataset.
    pub release_date: Option<String>,

    pub lyrics: String,

    /// Embedding input, computed once at import. Editing the literal
    /// attributes afterwards does not refresh it.
    #[serde(skip_serializing)]
    pub full_text: String,

    /// Model that produced the stored embedding, if any.
    pub embedding_model: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Song {
    /// Whether the song has an embedding produced by `model`.
    #[must_use]
    pub fn is_embedded_with(&self, model: &str) -> bool {
        self.embedding_model.as_deref() == Some(model)
    }
}

/// A song that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSong {
    pub track_name: String,
    pub artist_name: String,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub release_date: Option<String>,
    pub lyrics: String,
    pub full_text: String,
}

impl NewSong {
    /// Build a song and derive its composite text from the title, artist
    /// and lyrics.
    #[must_use]
    pub fn new(
        track_name: impl Into<String>,
        artist_name: impl Into<String>,
        lyrics: impl Into<String>,
    ) -> Self {
        let track_name = track_name.into();
        let artist_name = artist_name.into();
        let lyrics = lyrics.into();
        let full_text = composite_text(&track_name, &artist_name, &lyrics);
        Self {
            track_name,
            artist_name,
            album: None,
            year: None,
            release_date: None,
            lyrics,
            full_text,
        }
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn with_release_date(mut self, date: impl Into<String>) -> Self {
        self.release_date = Some(date.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_song_derives_full_text() {
        let song = NewSong::new("Yesterday", "The Beatles", "All my troubles seemed so far away");
        assert_eq!(
            song.full_text,
            "Title: Yesterday. Artist: The Beatles. Lyrics: All my troubles seemed so far away"
        );
        assert!(song.album.is_none());
    }

    #[test]
    fn test_new_song_builder() {
        let song = NewSong::new("Hey Jude", "The Beatles", "Hey Jude, don't make it bad")
            .with_album("Hey Jude")
            .with_year(1968)
            .with_release_date("1968-08-26");

        assert_eq!(song.album, Some("Hey Jude".to_string()));
        assert_eq!(song.year, Some(1968));
        assert_eq!(song.release_date, Some("1968-08-26".to_string()));
    }

    #[test]
    fn test_builder_does_not_touch_full_text() {
        let base = NewSong::new("Title", "Artist", "words");
        let with_album = base.clone().with_album("Album").with_year(2001);
        assert_eq!(base.full_text, with_album.full_text);
    }
}
