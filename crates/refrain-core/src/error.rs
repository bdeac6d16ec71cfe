use thiserror::Error;

/// Failures of the record store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_errors_convert_to_database() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.to_string().starts_with("database error: "));
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            entity: "song",
            id: "42".to_string(),
        };
        assert_eq!(err.to_string(), "not found: song with id 42");
    }
}
