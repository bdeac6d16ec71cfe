use anyhow::{Context, Result};

use refrain_core::Database;
use refrain_embed::{Config, EmbeddingPipeline, PipelineReport};

/// Failures listed before the rest are summarised.
const SHOWN_FAILURES: usize = 10;

pub async fn run_embed(config: &Config, json: bool) -> Result<()> {
    let provider = super::provider(config)?;
    let pipeline = EmbeddingPipeline::new(provider, config.pipeline_options());
    let mut db = Database::open(&config.database_path).context("Failed to open database")?;

    let backlog = pipeline.backlog(&db)?;
    if backlog == 0 && !json {
        println!("✓ Every song already has a current embedding");
        return Ok(());
    }
    if !json {
        println!("\n🧠 Embedding {backlog} songs with {}\n", config.model_spec());
        println!("  Press Ctrl-C to stop after the current batch\n");
    }

    let stop = super::stop_on_ctrl_c();
    let report = pipeline.run(&mut db, &stop).await?;

    if json {
        return super::print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!("  Rounds:               {}", report.rounds);
    println!("  Batches committed:    {}", report.batches_committed);
    println!("  Batches retried:      {}", report.batches_fallen_back);
    if report.commits_split > 0 {
        println!("  Commits split:        {}", report.commits_split);
    }
    println!(
        "  Songs embedded:       {} ({} individually)",
        report.embedded, report.embedded_individually
    );

    if !report.failures.is_empty() {
        println!("\n  ✗ {} songs failed:", report.failures.len());
        for failure in report.failures.iter().take(SHOWN_FAILURES) {
            println!("    - song {}: {}", failure.id, failure.message);
        }
        if report.failures.len() > SHOWN_FAILURES {
            println!("    ... and {} more", report.failures.len() - SHOWN_FAILURES);
        }
    }

    if report.is_complete() {
        println!("\n✓ Embedding complete");
    } else if report.stopped {
        println!("\n⏸  Stopped with {} songs pending", report.remaining);
        println!("  Run `refrain embed` again to continue");
    } else {
        println!("\n⚠  {} songs still pending", report.remaining);
        println!("  Run `refrain embed` again to retry them");
    }
}
