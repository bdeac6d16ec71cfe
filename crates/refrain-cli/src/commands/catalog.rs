use anyhow::{Context, Result};
use serde::Serialize;

use refrain_core::store::SongFilter;
use refrain_core::{Database, Song, SongId};
use refrain_embed::Config;

const MAX_PER_PAGE: usize = 100;

/// Filters and paging for `refrain songs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongQuery {
    pub artist: Option<String>,
    pub year: Option<i32>,
    pub search: Option<String>,
    pub page: usize,
    pub per_page: usize,
}

impl SongQuery {
    fn per_page(&self) -> usize {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    fn page(&self) -> usize {
        self.page.max(1)
    }

    /// Matching songs without paging, for counting.
    fn base_filter(&self) -> SongFilter {
        let mut filter = SongFilter::default();
        if let Some(artist) = &self.artist {
            filter = filter.with_artist(artist.clone());
        }
        if let Some(year) = self.year {
            filter = filter.with_year(year);
        }
        if let Some(text) = &self.search {
            filter = filter.with_text(text.clone());
        }
        filter
    }

    fn page_filter(&self) -> SongFilter {
        self.base_filter()
            .with_offset((self.page() - 1) * self.per_page())
            .with_limit(self.per_page())
    }
}

#[derive(Debug, Serialize)]
struct SongPage {
    songs: Vec<Song>,
    total: u64,
    page: usize,
    per_page: usize,
    total_pages: u64,
}

fn open(config: &Config) -> Result<Database> {
    Database::open(&config.database_path).context("Failed to open database")
}

pub fn list_songs(config: &Config, query: &SongQuery, json: bool) -> Result<()> {
    let db = open(config)?;
    let total = db.count_songs(&query.base_filter())?;
    let songs = db.list_songs(&query.page_filter())?;

    let per_page = query.per_page();
    let page = SongPage {
        songs,
        total,
        page: query.page(),
        per_page,
        total_pages: total.div_ceil(per_page as u64),
    };

    if json {
        return super::print_json(&page);
    }

    if page.songs.is_empty() {
        println!("No songs found");
        return Ok(());
    }

    println!(
        "\nPage {} of {} ({} songs)\n",
        page.page, page.total_pages, page.total
    );
    for song in &page.songs {
        let year = song.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
        let marker = if song.embedding_model.is_some() { "●" } else { "○" };
        println!(
            "  {marker} {:>6}  {}  by {}  [{}, {}]",
            song.id,
            song.track_name,
            song.artist_name,
            song.album.as_deref().unwrap_or("-"),
            year
        );
    }
    println!("\n  ● embedded  ○ pending");

    Ok(())
}

pub fn show_song(config: &Config, id: i64, json: bool) -> Result<()> {
    let db = open(config)?;
    let Some(song) = db.get_song(SongId::new(id))? else {
        anyhow::bail!("Song {id} not found");
    };

    if json {
        return super::print_json(&song);
    }

    println!("\n🎤 {}\n", song.track_name);
    println!("  Artist: {}", song.artist_name);
    if let Some(album) = &song.album {
        println!("  Album: {album}");
    }
    if let Some(year) = song.year {
        println!("  Year: {year}");
    }
    if let Some(date) = &song.release_date {
        println!("  Released: {date}");
    }
    println!(
        "  Embedding: {}",
        song.embedding_model.as_deref().unwrap_or("<none>")
    );
    println!("\n{}", song.lyrics);

    Ok(())
}

pub fn show_stats(config: &Config, top: usize, json: bool) -> Result<()> {
    let db = open(config)?;
    let stats = db.catalog_stats(top)?;

    if json {
        return super::print_json(&stats);
    }

    println!("\n📚 Catalog Statistics\n");
    println!("  Songs: {}", stats.total_songs);
    println!("  Artists: {}", stats.total_artists);
    match (stats.min_year, stats.max_year) {
        (Some(min), Some(max)) => {
            println!("  Years: {min}-{max} ({} distinct)", stats.unique_years);
        }
        _ => println!("  Years: -"),
    }
    println!(
        "  Average lyrics length: {:.2} characters",
        stats.average_lyrics_length
    );

    if !stats.top_artists.is_empty() {
        println!("\n  Top artists:");
        for artist in &stats.top_artists {
            println!("    {:>5}  {}", artist.song_count, artist.artist_name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrain_core::NewSong;

    fn query(page: usize, per_page: usize) -> SongQuery {
        SongQuery {
            artist: None,
            year: None,
            search: None,
            page,
            per_page,
        }
    }

    #[test]
    fn test_paging_is_clamped() {
        assert_eq!(query(0, 0).page_filter().offset, 0);
        assert_eq!(query(0, 0).page_filter().limit, Some(1));
        assert_eq!(query(3, 20).page_filter().offset, 40);
        assert_eq!(query(1, 1000).page_filter().limit, Some(MAX_PER_PAGE));
    }

    #[test]
    fn test_filters_apply_to_count_and_page() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_song(&NewSong::new(format!("Song {i}"), "Adele", "hello"))
                .unwrap();
        }
        db.insert_song(&NewSong::new("Other", "Coldplay", "yellow"))
            .unwrap();

        let q = SongQuery {
            artist: Some("adele".to_string()),
            ..query(2, 2)
        };
        assert_eq!(db.count_songs(&q.base_filter()).unwrap(), 5);

        let page = db.list_songs(&q.page_filter()).unwrap();
        let titles: Vec<&str> = page.iter().map(|s| s.track_name.as_str()).collect();
        assert_eq!(titles, vec!["Song 2", "Song 3"]);
    }
}
