//! Bulk catalog import from JSON Lines files.
//!
//! Each line is one song. Both the column names of the public lyrics
//! dataset (`Title`, `Artist`, `Lyric`, `Album`, `Year`, `Date`) and the
//! store's own snake-case names are accepted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use refrain_core::model::{clean_text, NewSong};
use refrain_core::Database;

use crate::error::{EmbedError, EmbedResult};

const UNKNOWN_ALBUM: &str = "Unknown";

#[derive(Debug, Deserialize)]
struct RawSong {
    #[serde(alias = "Title", alias = "title")]
    track_name: Option<String>,
    #[serde(alias = "Artist", alias = "artist")]
    artist_name: Option<String>,
    #[serde(alias = "Lyric", alias = "Lyrics", alias = "lyric")]
    lyrics: Option<String>,
    #[serde(alias = "Album")]
    album: Option<String>,
    #[serde(alias = "Year")]
    year: Option<Value>,
    #[serde(alias = "Date", alias = "date")]
    release_date: Option<String>,
}

/// Counts from one import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub files: usize,
    /// Non-blank lines read.
    pub rows: usize,
    pub imported: usize,
    /// Rows missing a title, artist or lyrics.
    pub skipped: usize,
    /// Lines that were not valid JSON objects.
    pub malformed: usize,
}

impl ImportReport {
    fn absorb(&mut self, other: &Self) {
        self.files += other.files;
        self.rows += other.rows;
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.malformed += other.malformed;
    }
}

/// Import a `.jsonl` file, or every `.jsonl` file under a directory.
///
/// Each file is inserted in its own transaction.
///
/// # Errors
/// Returns [`EmbedError::Import`] if a file cannot be read and
/// [`EmbedError::Persistence`] if an insert fails.
pub fn import_path(db: &mut Database, path: &Path) -> EmbedResult<ImportReport> {
    let files = source_files(path)?;
    let mut report = ImportReport::default();

    for file in &files {
        let file_report = import_file(db, file)?;
        log::info!(
            "Imported {} of {} rows from {}",
            file_report.imported,
            file_report.rows,
            file.display()
        );
        report.absorb(&file_report);
    }

    Ok(report)
}

fn source_files(path: &Path) -> EmbedResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(EmbedError::Import {
            path: path.to_path_buf(),
            message: "no such file or directory".to_string(),
        });
    }

    Ok(WalkDir::new(path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.is_file() && is_jsonl(p))
        .collect())
}

fn is_jsonl(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("jsonl"))
}

fn import_file(db: &mut Database, path: &Path) -> EmbedResult<ImportReport> {
    let content = std::fs::read_to_string(path).map_err(|e| EmbedError::Import {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut report = ImportReport {
        files: 1,
        ..ImportReport::default()
    };
    let mut songs = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        report.rows += 1;
        match parse_song(line) {
            Ok(Some(song)) => songs.push(song),
            Ok(None) => report.skipped += 1,
            Err(e) => {
                log::warn!("{}:{}: {}", path.display(), line_no + 1, e);
                report.malformed += 1;
            }
        }
    }

    db.insert_songs(&songs)?;
    report.imported = songs.len();
    Ok(report)
}

/// Parse one JSON line. Returns `Ok(None)` for rows without a usable
/// title, artist or lyrics.
pub fn parse_song(line: &str) -> Result<Option<NewSong>, serde_json::Error> {
    let raw: RawSong = serde_json::from_str(line)?;

    let (Some(title), Some(artist), Some(lyrics)) = (raw.track_name, raw.artist_name, raw.lyrics)
    else {
        return Ok(None);
    };
    if [&title, &artist, &lyrics]
        .iter()
        .any(|field| clean_text(field).is_empty())
    {
        return Ok(None);
    }

    let album = raw
        .album
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());

    let mut song = NewSong::new(title.trim(), artist.trim(), lyrics.trim()).with_album(album);
    if let Some(year) = raw.year.as_ref().and_then(parse_year) {
        song = song.with_year(year);
    }
    if let Some(date) = raw.release_date.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
        song = song.with_release_date(date);
    }
    Ok(Some(song))
}

/// Years arrive as integers, floats (`2011.0`) or strings.
#[allow(clippy::cast_possible_truncation)]
fn parse_year(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.get(..4).and_then(|prefix| prefix.parse().ok()))?
        }
        _ => return None,
    };
    i32::try_from(year).ok().filter(|y| (1000..=9999).contains(y))
}
