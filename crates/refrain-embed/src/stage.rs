//! treadle stages wrapping catalog import and embedding generation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use treadle::{Stage, StageContext, StageOutcome};

use refrain_core::Database;

use crate::generate::{EmbeddingPipeline, PipelineOptions};
use crate::ingest::import_path;
use crate::provider::EmbeddingProvider;
use crate::resilience::StopSignal;

fn open_database(db_path: &Path) -> treadle::Result<Database> {
    Database::open(db_path).map_err(|e| {
        treadle::TreadleError::StageExecution(format!("Failed to open database: {e}"))
    })
}

/// The Import stage: load songs from JSON Lines files.
#[derive(Debug)]
pub struct ImportStage {
    source: PathBuf,
    db_path: PathBuf,
}

impl ImportStage {
    #[must_use]
    pub fn new(source: PathBuf, db_path: PathBuf) -> Self {
        Self { source, db_path }
    }
}

#[async_trait::async_trait]
impl Stage for ImportStage {
    fn name(&self) -> &str {
        "import"
    }

    async fn execute(
        &self,
        _item: &dyn treadle::WorkItem,
        _context: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        log::info!("Starting import from {}", self.source.display());

        let mut db = open_database(&self.db_path)?;
        let report = import_path(&mut db, &self.source)
            .map_err(|e| treadle::TreadleError::StageExecution(format!("Import failed: {e}")))?;

        log::info!(
            "Import complete: {} songs from {} files ({} skipped, {} malformed)",
            report.imported,
            report.files,
            report.skipped,
            report.malformed
        );
        Ok(StageOutcome::Complete)
    }
}

/// The Embed stage: run the generation pipeline over the backlog.
///
/// Songs the provider fails on are logged and left for the next run; they
/// do not fail the stage.
#[derive(Debug)]
pub struct EmbedStage {
    pipeline: EmbeddingPipeline<dyn EmbeddingProvider>,
    db_path: PathBuf,
    stop: StopSignal,
}

impl EmbedStage {
    #[must_use]
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        options: PipelineOptions,
        db_path: PathBuf,
        stop: StopSignal,
    ) -> Self {
        Self {
            pipeline: EmbeddingPipeline::new(provider, options),
            db_path,
            stop,
        }
    }
}

#[async_trait::async_trait]
impl Stage for EmbedStage {
    fn name(&self) -> &str {
        "embed"
    }

    async fn execute(
        &self,
        _item: &dyn treadle::WorkItem,
        _context: &mut StageContext,
    ) -> treadle::Result<StageOutcome> {
        let mut db = open_database(&self.db_path)?;
        let report = self
            .pipeline
            .run(&mut db, &self.stop)
            .await
            .map_err(|e| treadle::TreadleError::StageExecution(format!("Embedding failed: {e}")))?;

        if !report.failures.is_empty() {
            log::warn!(
                "{} songs could not be embedded; rerun to retry them",
                report.failures.len()
            );
        }
        if report.stopped {
            return Err(treadle::TreadleError::StageExecution(format!(
                "Embedding stopped with {} songs pending",
                report.remaining
            )));
        }

        log::info!(
            "Embedding complete: {} songs embedded ({} individually), {} pending",
            report.embedded,
            report.embedded_individually,
            report.remaining
        );
        Ok(StageOutcome::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;
    use crate::work_item::CatalogJob;
    use refrain_core::store::{RecordStore, SongFilter};
    use refrain_core::ModelSpec;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_catalog(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("songs.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"Title": "Hello", "Artist": "Adele", "Lyric": "Hello, it's me"}"#,
                "\n",
                r#"{"Title": "Skyfall", "Artist": "Adele", "Lyric": "This is the end"}"#,
                "\n",
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_import_stage() {
        let dir = TempDir::new().unwrap();
        let source = write_catalog(&dir);
        let db_path = dir.path().join("test.db");

        let stage = ImportStage::new(source.clone(), db_path.clone());
        let job = CatalogJob::with_id("job", source);
        let mut context = StageContext::new("import".to_string());
        let outcome = stage.execute(&job, &mut context).await.unwrap();

        assert!(matches!(outcome, StageOutcome::Complete));
        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.count(&SongFilter::default()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_embed_stage() {
        let dir = TempDir::new().unwrap();
        let source = write_catalog(&dir);
        let db_path = dir.path().join("test.db");
        {
            let mut db = Database::open(&db_path).unwrap();
            import_path(&mut db, &source).unwrap();
        }

        let model = ModelSpec::new("mock", 3);
        let stage = EmbedStage::new(
            Arc::new(MockProvider::new(model.clone())),
            PipelineOptions {
                batch_delay: Duration::ZERO,
                individual_delay: Duration::ZERO,
                ..PipelineOptions::default()
            },
            db_path.clone(),
            StopSignal::new(),
        );
        let job = CatalogJob::with_id("job", source);
        let mut context = StageContext::new("embed".to_string());
        stage.execute(&job, &mut context).await.unwrap();

        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.embedding_stats(&model).unwrap().embedded, 2);
    }
}
