use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{Embedding, ModelSpec, NewSong, Song, SongId};
use crate::store::{
    DistanceMetric, EmbeddingFilter, EmbeddingStats, EmbeddingUpdate, RecordStore, ScanFilter,
    ScoredSong, SongFilter,
};

use super::functions;
use super::migrations::MIGRATIONS;

const SONG_COLUMNS: &str = "id, track_name, artist_name, album, year, release_date,
    lyrics, full_text, embedding_model, created_at, updated_at";

/// A database connection with CRUD methods for the song catalog.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        functions::register(&conn)?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }
}

// Song CRUD
impl Database {
    /// Insert a new song and return its id.
    pub fn insert_song(&self, song: &NewSong) -> Result<SongId> {
        insert_song_into(&self.conn, song)
    }

    /// Insert several songs in one transaction.
    pub fn insert_songs(&mut self, songs: &[NewSong]) -> Result<Vec<SongId>> {
        let tx = self.conn.transaction()?;
        let ids = songs
            .iter()
            .map(|song| insert_song_into(&tx, song))
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    /// Get a song by id.
    pub fn get_song(&self, id: SongId) -> Result<Option<Song>> {
        let song = self
            .conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
                [id.get()],
                row_to_song,
            )
            .optional()?;
        Ok(song)
    }

    /// List songs matching a filter, ordered by id.
    pub fn list_songs(&self, filter: &SongFilter) -> Result<Vec<Song>> {
        let (clause, mut params) = where_clause(filter);
        let limit = filter.limit.map_or(-1, to_sql_int);
        params.push(Value::Integer(limit));
        params.push(Value::Integer(to_sql_int(filter.offset)));

        let sql = format!(
            "SELECT {SONG_COLUMNS} FROM songs {clause} ORDER BY id ASC LIMIT ? OFFSET ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let songs = stmt
            .query_map(rusqlite::params_from_iter(params), row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// Count songs matching a filter (limit and offset are ignored).
    pub fn count_songs(&self, filter: &SongFilter) -> Result<u64> {
        let (clause, params) = where_clause(filter);
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM songs {clause}"),
            rusqlite::params_from_iter(params),
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Summary statistics over the whole catalog.
    pub fn catalog_stats(&self, top_artists: usize) -> Result<CatalogStats> {
        let (total_songs, total_artists): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT artist_name) FROM songs",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (min_year, max_year, unique_years): (Option<i32>, Option<i32>, i64) =
            self.conn.query_row(
                "SELECT MIN(year), MAX(year), COUNT(DISTINCT year) FROM songs WHERE year IS NOT NULL",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let average_lyrics_length: Option<f64> = self.conn.query_row(
            "SELECT AVG(LENGTH(lyrics)) FROM songs WHERE lyrics != ''",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT artist_name, COUNT(*) AS song_count FROM songs
             GROUP BY artist_name
             ORDER BY song_count DESC, artist_name ASC
             LIMIT ?1",
        )?;
        let top = stmt
            .query_map([to_sql_int(top_artists)], |row| {
                Ok(ArtistCount {
                    artist_name: row.get(0)?,
                    song_count: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CatalogStats {
            total_songs: u64::try_from(total_songs).unwrap_or(0),
            total_artists: u64::try_from(total_artists).unwrap_or(0),
            top_artists: top,
            min_year,
            max_year,
            unique_years: u64::try_from(unique_years).unwrap_or(0),
            average_lyrics_length: average_lyrics_length
                .map_or(0.0, |avg| (avg * 100.0).round() / 100.0),
        })
    }
}

// Embedding storage
impl Database {
    /// Attach an embedding to one song in its own transaction.
    pub fn set_embedding(&mut self, id: SongId, embedding: &Embedding) -> Result<()> {
        let tx = self.conn.transaction()?;
        write_embedding(&tx, id, embedding)?;
        tx.commit()?;
        Ok(())
    }

    /// Attach embeddings to several songs; all or nothing.
    pub fn set_embeddings(&mut self, updates: &[EmbeddingUpdate]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for update in updates {
            write_embedding(&tx, update.id, &update.embedding)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load the stored vector for a song, if any.
    pub fn get_embedding(&self, id: SongId) -> Result<Option<Embedding>> {
        let row: Option<(Option<Vec<u8>>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT embedding, embedding_model FROM songs WHERE id = ?1",
                [id.get()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((Some(blob), Some(model))) => Ok(Some(Embedding::new(
                model,
                crate::model::embedding::decode_vector(&blob)?,
            ))),
            Some(_) => Ok(None),
            None => Err(Error::NotFound {
                entity: "song",
                id: id.to_string(),
            }),
        }
    }

    /// Rank songs embedded with `filter.model` by distance to `query`.
    pub fn nearest_songs(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        filter: &ScanFilter,
        limit: usize,
    ) -> Result<Vec<ScoredSong>> {
        if query.len() != filter.model.dimensions {
            return Err(Error::InvalidData(format!(
                "query vector has {} dims, expected {}",
                query.len(),
                filter.model.dimensions
            )));
        }

        // Ordered by `1 - distance`, the score callers derive, so that the
        // LIMIT cut and any re-sort on score agree when scores round equal.
        let sql = format!(
            "SELECT {SONG_COLUMNS}, distance FROM (
                SELECT *, {function}(embedding, ?1) AS distance
                FROM songs
                WHERE embedding IS NOT NULL AND embedding_model = ?2 AND embedding_dims = ?3
             )
             WHERE ?4 IS NULL OR distance <= ?4
             ORDER BY 1.0 - distance DESC, id ASC
             LIMIT ?5",
            function = metric.sql_function(),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let scored = stmt
            .query_map(
                rusqlite::params![
                    crate::model::embedding::encode_vector(query),
                    filter.model.name,
                    to_sql_int(filter.model.dimensions),
                    filter.max_distance,
                    to_sql_int(limit),
                ],
                |row| {
                    Ok(ScoredSong {
                        song: row_to_song(row)?,
                        distance: row.get(11)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scored)
    }

    /// Embedding coverage relative to `model`.
    pub fn embedding_stats(&self, model: &ModelSpec) -> Result<EmbeddingStats> {
        let (total, embedded, stale): (i64, i64, i64) = self.conn.query_row(
            "SELECT
                COUNT(*),
                COUNT(CASE WHEN embedding IS NOT NULL AND embedding_model = ?1
                           AND embedding_dims = ?2 THEN 1 END),
                COUNT(CASE WHEN embedding IS NOT NULL AND NOT (embedding_model = ?1
                           AND embedding_dims = ?2) THEN 1 END)
             FROM songs",
            rusqlite::params![model.name, to_sql_int(model.dimensions)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let total = u64::try_from(total).unwrap_or(0);
        let embedded = u64::try_from(embedded).unwrap_or(0);
        Ok(EmbeddingStats {
            total,
            embedded,
            stale: u64::try_from(stale).unwrap_or(0),
            pending: total.saturating_sub(embedded),
        })
    }
}

impl RecordStore for Database {
    fn find(&self, filter: &SongFilter) -> Result<Vec<Song>> {
        self.list_songs(filter)
    }

    fn count(&self, filter: &SongFilter) -> Result<u64> {
        self.count_songs(filter)
    }

    fn get(&self, id: SongId) -> Result<Option<Song>> {
        self.get_song(id)
    }

    fn scan_with_distance(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        filter: &ScanFilter,
        limit: usize,
    ) -> Result<Vec<ScoredSong>> {
        self.nearest_songs(query, metric, filter, limit)
    }

    fn update_embedding(&mut self, id: SongId, embedding: &Embedding) -> Result<()> {
        self.set_embedding(id, embedding)
    }

    fn commit_batch(&mut self, updates: &[EmbeddingUpdate]) -> Result<()> {
        self.set_embeddings(updates)
    }

    fn embedding_stats(&self, model: &ModelSpec) -> Result<EmbeddingStats> {
        Database::embedding_stats(self, model)
    }
}

/// Catalog-wide statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_songs: u64,
    pub total_artists: u64,
    pub top_artists: Vec<ArtistCount>,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub unique_years: u64,
    /// Mean lyrics length in characters, rounded to two decimals.
    pub average_lyrics_length: f64,
}

/// Number of songs by one artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCount {
    pub artist_name: String,
    pub song_count: u64,
}

fn insert_song_into(conn: &Connection, song: &NewSong) -> Result<SongId> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO songs (
            track_name, artist_name, album, year, release_date,
            lyrics, full_text, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        rusqlite::params![
            song.track_name,
            song.artist_name,
            song.album,
            song.year,
            song.release_date,
            song.lyrics,
            song.full_text,
            now,
        ],
    )?;
    Ok(SongId::new(conn.last_insert_rowid()))
}

fn write_embedding(conn: &Connection, id: SongId, embedding: &Embedding) -> Result<()> {
    if embedding.values.is_empty() {
        return Err(Error::InvalidData(format!(
            "empty embedding for song {id}"
        )));
    }
    if embedding.values.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidData(format!(
            "non-finite embedding value for song {id}"
        )));
    }

    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE songs SET
            embedding = ?2, embedding_model = ?3, embedding_dims = ?4,
            embedded_at = ?5, updated_at = ?5
         WHERE id = ?1",
        rusqlite::params![
            id.get(),
            embedding.to_blob(),
            embedding.model,
            to_sql_int(embedding.dimensions()),
            now,
        ],
    )?;

    if changed == 0 {
        return Err(Error::NotFound {
            entity: "song",
            id: id.to_string(),
        });
    }
    Ok(())
}

fn where_clause(filter: &SongFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if let Some(artist) = &filter.artist {
        conditions.push("artist_name LIKE ? ESCAPE '\\'");
        params.push(Value::Text(like_pattern(artist)));
    }
    if let Some(year) = filter.year {
        conditions.push("year = ?");
        params.push(Value::Integer(i64::from(year)));
    }
    if let Some(text) = &filter.text {
        conditions.push("(track_name LIKE ? ESCAPE '\\' OR lyrics LIKE ? ESCAPE '\\')");
        let pattern = like_pattern(text);
        params.push(Value::Text(pattern.clone()));
        params.push(Value::Text(pattern));
    }
    match &filter.embedding {
        EmbeddingFilter::Any => {}
        EmbeddingFilter::Pending(model) => {
            conditions.push(
                "NOT (embedding IS NOT NULL AND embedding_model = ? AND embedding_dims = ?)",
            );
            params.push(Value::Text(model.name.clone()));
            params.push(Value::Integer(to_sql_int(model.dimensions)));
        }
        EmbeddingFilter::Current(model) => {
            conditions
                .push("embedding IS NOT NULL AND embedding_model = ? AND embedding_dims = ?");
            params.push(Value::Text(model.name.clone()));
            params.push(Value::Integer(to_sql_int(model.dimensions)));
        }
    }
    if let Some(after) = filter.after {
        conditions.push("id > ?");
        params.push(Value::Integer(after.get()));
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), params)
    }
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_song(row: &rusqlite::Row) -> rusqlite::Result<Song> {
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(Song {
        id: SongId::new(row.get(0)?),
        track_name: row.get(1)?,
        artist_name: row.get(2)?,
        album: row.get(3)?,
        year: row.get(4)?,
        release_date: row.get(5)?,
        lyrics: row.get(6)?,
        full_text: row.get(7)?,
        embedding_model: row.get(8)?,
        created_at: parse_timestamp(9, &created_at)?,
        updated_at: parse_timestamp(10, &updated_at)?,
    })
}
