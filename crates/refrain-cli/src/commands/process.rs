use anyhow::{Context, Result};
use std::path::PathBuf;

use refrain_core::Database;
use refrain_embed::{build_pipeline, CatalogJob, Config};
use refrain_search::SearchStatus;

/// Run the import → embed workflow for one source.
///
/// Stage state is kept in `pipeline.db` next to the catalog database, so
/// rerunning with the same `--job` id skips stages that already completed.
/// A failed or stopped embed stage is retried on the next run.
pub async fn run_process(config: &Config, source: PathBuf, job: Option<String>) -> Result<()> {
    let db_path = config.database_path.clone();

    println!("\n🎵 Refrain Processing Pipeline\n");
    println!("  Source: {}", source.display());
    println!("  Database: {}", db_path.display());

    let work_item = match job {
        Some(id) => CatalogJob::with_id(id, source.clone()),
        None => CatalogJob::new(source.clone()),
    };
    println!("  Job: {}\n", treadle::WorkItem::id(&work_item));

    let stop = super::stop_on_ctrl_c();
    let workflow = build_pipeline(source, db_path.clone(), config, stop)
        .context("Failed to build pipeline")?;

    let parent = db_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
    let state_path = parent.join("pipeline.db");
    let mut store = treadle::SqliteStateStore::open(&state_path)
        .await
        .context("Failed to open pipeline state store")?;

    // Subscribe to events for progress display
    let mut events = workflow.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                treadle::WorkflowEvent::StageStarted { stage, .. } => {
                    println!("  ⏳ [{stage}] Starting...");
                }
                treadle::WorkflowEvent::StageCompleted { stage, .. } => {
                    println!("  ✓ [{stage}] Complete");
                }
                treadle::WorkflowEvent::StageFailed { stage, error, .. } => {
                    eprintln!("  ✗ [{stage}] FAILED: {error}");
                }
                _ => {}
            }
        }
    });

    workflow
        .advance(&work_item, &mut store)
        .await
        .context("Pipeline execution failed")?;

    let db = Database::open(&db_path).context("Failed to open database")?;
    let status = SearchStatus::collect(&db, &config.model_spec())?;

    println!("\n✓ Processing pipeline finished");
    println!(
        "  {} of {} songs searchable ({:.2}%)",
        status.embedded_songs, status.total_songs, status.coverage_percent
    );
    if status.pending_songs > 0 {
        println!(
            "\n  {} songs still pending; rerun with `--job {}` or run `refrain embed`",
            status.pending_songs,
            treadle::WorkItem::id(&work_item)
        );
    }

    Ok(())
}
