//! Integration tests for the import → embed workflow.
//!
//! The provider is replaced by `MockProvider`, so no network access or API
//! key is needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use refrain_core::store::{RecordStore, SongFilter};
use refrain_core::{Database, ModelSpec};
use refrain_embed::testing::MockProvider;
use refrain_embed::{
    build_pipeline, build_pipeline_with_provider, CatalogJob, Config, EmbeddingPipeline,
    PipelineOptions, StopSignal,
};

fn quick_options(batch_size: usize) -> PipelineOptions {
    PipelineOptions {
        batch_size,
        working_set_batches: 2,
        batch_delay: Duration::ZERO,
        individual_delay: Duration::ZERO,
        max_input_chars: 8000,
    }
}

fn write_catalog(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join("catalog.jsonl");
    let lines: Vec<String> = (0..n)
        .map(|i| {
            serde_json::json!({
                "Title": format!("Song {i}"),
                "Artist": format!("Artist {}", i % 3),
                "Lyric": format!("verse {i} about love and loss"),
                "Year": 2000 + i,
            })
            .to_string()
        })
        .collect();
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

/// Test that the pipeline can be built and wired correctly
#[tokio::test]
async fn test_pipeline_construction() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        openai_api_key: Some("sk-test".to_string()),
        ..Config::default()
    };

    let result = build_pipeline(
        temp_dir.path().to_path_buf(),
        temp_dir.path().join("test.db"),
        &config,
        StopSignal::new(),
    );

    assert!(result.is_ok(), "Pipeline should build successfully");
}

#[tokio::test]
async fn test_pipeline_requires_api_key() {
    let temp_dir = TempDir::new().unwrap();
    let result = build_pipeline(
        temp_dir.path().to_path_buf(),
        temp_dir.path().join("test.db"),
        &Config::default(),
        StopSignal::new(),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_workflow_imports_and_embeds() {
    let temp_dir = TempDir::new().unwrap();
    let source = write_catalog(temp_dir.path(), 12);
    let db_path = temp_dir.path().join("test.db");
    let model = ModelSpec::new("mock", 8);

    let workflow = build_pipeline_with_provider(
        source.clone(),
        db_path.clone(),
        Arc::new(MockProvider::new(model.clone())),
        quick_options(5),
        StopSignal::new(),
    )
    .unwrap();

    let mut state = treadle::SqliteStateStore::open(&temp_dir.path().join("pipeline.db"))
        .await
        .unwrap();
    workflow
        .advance(&CatalogJob::with_id("build", source), &mut state)
        .await
        .unwrap();

    let db = Database::open(&db_path).unwrap();
    let stats = db.embedding_stats(&model).unwrap();
    assert_eq!(stats.total, 12);
    assert_eq!(stats.embedded, 12);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_rerun_after_partial_failure() {
    let temp_dir = TempDir::new().unwrap();
    let source = write_catalog(temp_dir.path(), 6);
    let mut db = Database::open(temp_dir.path().join("test.db")).unwrap();
    refrain_embed::import_path(&mut db, &source).unwrap();

    let model = ModelSpec::new("mock", 4);
    let provider = Arc::new(MockProvider::new(model.clone()));
    let pipeline = EmbeddingPipeline::new(Arc::clone(&provider), quick_options(3));

    // Every call fails during the first run: each batch and each song.
    provider.fail_next(usize::MAX);
    let first = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();
    assert_eq!(first.embedded, 0);
    assert_eq!(first.failures.len(), 6);
    assert_eq!(first.remaining, 6);

    provider.fail_next(0);
    let second = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();
    assert_eq!(second.embedded, 6);
    assert!(second.is_complete());

    let third = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();
    assert_eq!(third.embedded, 0);
    assert_eq!(third.rounds, 0);
}

#[tokio::test]
async fn test_backlog_is_paged() {
    let temp_dir = TempDir::new().unwrap();
    let mut db = Database::open(temp_dir.path().join("test.db")).unwrap();
    let source = write_catalog(temp_dir.path(), 3);
    refrain_embed::import_path(&mut db, &source).unwrap();
    refrain_embed::import_path(&mut db, &source).unwrap();

    let model = ModelSpec::new("mock", 4);
    let pipeline = EmbeddingPipeline::new(
        Arc::new(MockProvider::new(model.clone())),
        PipelineOptions {
            working_set_batches: 1,
            ..quick_options(2)
        },
    );
    let report = pipeline.run(&mut db, &StopSignal::new()).await.unwrap();

    assert_eq!(report.rounds, 3);
    assert_eq!(report.embedded, 6);
    assert_eq!(db.count(&SongFilter::current(&model)).unwrap(), 6);
}
