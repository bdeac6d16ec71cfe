use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use treadle::WorkItem;
use uuid::Uuid;

/// One catalog build flowing through the import → embed workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogJob {
    /// Unique ID for this job in the workflow state store.
    id: String,
    /// File or directory the catalog is imported from.
    pub source: PathBuf,
}

impl CatalogJob {
    /// A job with a fresh random id.
    #[must_use]
    pub fn new(source: PathBuf) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), source)
    }

    /// A job with a caller-chosen id, so a rerun resumes the same job.
    #[must_use]
    pub fn with_id(id: impl Into<String>, source: PathBuf) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

impl WorkItem for CatalogJob {
    fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for CatalogJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.display())
    }
}
