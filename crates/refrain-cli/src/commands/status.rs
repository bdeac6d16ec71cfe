use anyhow::{Context, Result};

use refrain_core::Database;
use refrain_embed::Config;
use refrain_search::SearchStatus;

pub fn show_status(config: &Config, json: bool) -> Result<()> {
    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let status = SearchStatus::collect(&db, &config.model_spec())?;

    if json {
        return super::print_json(&status);
    }

    println!("\n📊 Refrain Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Model: {} ({} dims)", status.model, status.dimensions);
    println!(
        "  Search: {}",
        if status.search_available { "available" } else { "unavailable" }
    );
    println!("  Songs: {}", status.total_songs);
    println!(
        "  Embedded: {} ({:.2}%)",
        status.embedded_songs, status.coverage_percent
    );
    println!("  Pending: {}", status.pending_songs);
    if status.stale_embeddings > 0 {
        println!(
            "  Stale: {} (embedded with another model)",
            status.stale_embeddings
        );
    }

    if status.total_songs == 0 {
        println!("\n  Run `refrain import <path>` to add songs");
    } else if status.pending_songs > 0 {
        println!("\n  Run `refrain embed` to embed pending songs");
    }

    Ok(())
}
