use anyhow::{Context, Result};
use std::path::Path;

use refrain_core::Database;
use refrain_embed::{import_path, Config};

pub fn run_import(config: &Config, path: &Path) -> Result<()> {
    log::info!("Importing songs from {}", path.display());

    let mut db = Database::open(&config.database_path).context("Failed to open database")?;
    let report = import_path(&mut db, path)?;

    println!("\n📥 Import complete\n");
    println!("  Files read:     {}", report.files);
    println!("  Rows read:      {}", report.rows);
    println!("  Imported:       {}", report.imported);
    if report.skipped > 0 {
        println!("  Skipped:        {} (missing title, artist or lyrics)", report.skipped);
    }
    if report.malformed > 0 {
        println!("  Malformed:      {} (not valid JSON)", report.malformed);
    }

    if report.imported > 0 {
        println!("\n  Run `refrain embed` to make the new songs searchable");
    }

    Ok(())
}
