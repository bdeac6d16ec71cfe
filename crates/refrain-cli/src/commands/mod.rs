pub mod catalog;
pub mod config;
pub mod embed;
pub mod import;
pub mod process;
pub mod search;
pub mod status;

pub use catalog::{list_songs, show_song, show_stats, SongQuery};
pub use embed::run_embed;
pub use import::run_import;
pub use process::run_process;
pub use search::{run_search, show_suggestions};
pub use status::show_status;

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use refrain_embed::{Config, OpenAiEmbedder, StopSignal};

/// Pretty-print any report as JSON on stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// The provider client every provider-backed command shares.
fn provider(config: &Config) -> Result<Arc<OpenAiEmbedder>> {
    let settings = config.provider_settings()?;
    let embedder = OpenAiEmbedder::new(settings).context("Failed to create embedding client")?;
    Ok(Arc::new(embedder))
}

/// A stop signal raised by the first Ctrl-C.
fn stop_on_ctrl_c() -> StopSignal {
    let stop = StopSignal::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\n⏸  Stopping after the current batch...");
                signal.stop();
            }
            Err(e) => log::warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });
    stop
}
