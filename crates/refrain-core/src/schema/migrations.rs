/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Songs: literal attributes, composite text, optional embedding.
-- AUTOINCREMENT keeps ids monotonic so keyset pagination never revisits
-- a slot freed by a deletion.
CREATE TABLE IF NOT EXISTS songs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_name TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    album TEXT,
    year INTEGER,
    release_date TEXT,
    lyrics TEXT NOT NULL,
    full_text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_songs_artist_name ON songs(artist_name);
CREATE INDEX IF NOT EXISTS idx_songs_year ON songs(year);
CREATE INDEX IF NOT EXISTS idx_songs_track_name ON songs(track_name);
"#;

const MIGRATION_002: &str = r#"
-- Embeddings are tagged with the model configuration that produced them.
ALTER TABLE songs ADD COLUMN embedding BLOB;
ALTER TABLE songs ADD COLUMN embedding_model TEXT;
ALTER TABLE songs ADD COLUMN embedding_dims INTEGER;
ALTER TABLE songs ADD COLUMN embedded_at TEXT;

CREATE INDEX IF NOT EXISTS idx_songs_embedding_model ON songs(embedding_model, embedding_dims);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: MIGRATION_001,
    },
    Migration {
        version: 2,
        name: "tagged_embeddings",
        sql: MIGRATION_002,
    },
];
