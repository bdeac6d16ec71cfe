use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use refrain_embed::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "refrain", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/refrain/refrain.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Import songs from JSON Lines files
    ///
    /// Accepts a single `.jsonl` file or a directory, which is walked
    /// recursively for `*.jsonl` files. Each line is one song. Column names
    /// from the public lyrics dataset (Title, Artist, Lyric, Album, Year,
    /// Date) and snake-case names (track_name, artist_name, lyrics, ...) are
    /// both understood.
    ///
    /// Rows without a title, artist or lyrics are skipped and counted. Each
    /// file is inserted in one transaction. Importing the same file twice
    /// stores its songs twice.
    Import {
        /// File or directory to import
        path: PathBuf,
    },
    /// Generate embeddings for every song that needs one
    ///
    /// Songs are sent to the provider in batches. When a batch call fails
    /// its songs are retried one at a time, and songs that still fail are
    /// reported and left for the next run. Songs embedded with a different
    /// model or dimensionality are re-embedded.
    ///
    /// Ctrl-C stops the run after the batch in flight; everything committed
    /// so far is kept.
    Embed {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a source and embed the catalog as one resumable workflow
    Process {
        /// File or directory to import
        path: PathBuf,

        /// Job id to resume; stages already completed for it are skipped
        #[arg(long)]
        job: Option<String>,
    },
    /// Find songs whose lyrics match a description
    Search {
        /// What the songs should be about, e.g. "heartbreak and sadness"
        query: String,

        /// Maximum number of results (default from config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity between 0 and 1; 0 disables filtering
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show whether search is available and how much is embedded
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show catalog statistics
    Stats {
        /// Number of top artists to list
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[arg(long)]
        json: bool,
    },
    /// List songs
    Songs {
        /// Artist name contains
        #[arg(long)]
        artist: Option<String>,

        /// Release year
        #[arg(long)]
        year: Option<i32>,

        /// Title or lyrics contain
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        per_page: usize,

        #[arg(long)]
        json: bool,
    },
    /// Show one song with its lyrics
    Song {
        id: i64,

        #[arg(long)]
        json: bool,
    },
    /// Example queries that work well
    Suggestions {
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print one value, or the whole config file
    Get { key: Option<String> },
    /// Set a value in the config file
    Set { key: String, value: String },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file if it does not exist
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Config commands work on the file itself and must run even when it
    // does not parse.
    if let Commands::Config(command) = cli.command {
        return match command {
            ConfigCommand::Show => commands::config::show_config(),
            ConfigCommand::Get { key } => commands::config::get_config(key),
            ConfigCommand::Set { key, value } => commands::config::set_config(&key, &value),
            ConfigCommand::Path => commands::config::show_path(),
            ConfigCommand::Example => commands::config::show_example(),
            ConfigCommand::Init => commands::config::init_config(),
        };
    }

    let config = match cli.db {
        Some(path) => Config::load_with_db_path(path)?,
        None => Config::load()?,
    };

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match cli.command {
        Commands::Import { path } => commands::run_import(&config, &path)?,
        Commands::Embed { json } => commands::run_embed(&config, json).await?,
        Commands::Process { path, job } => commands::run_process(&config, path, job).await?,
        Commands::Search {
            query,
            limit,
            threshold,
            json,
        } => commands::run_search(&config, &query, limit, threshold, json).await?,
        Commands::Status { json } => commands::show_status(&config, json)?,
        Commands::Stats { top, json } => commands::show_stats(&config, top, json)?,
        Commands::Songs {
            artist,
            year,
            search,
            page,
            per_page,
            json,
        } => {
            let query = commands::SongQuery {
                artist,
                year,
                search,
                page,
                per_page,
            };
            commands::list_songs(&config, &query, json)?;
        }
        Commands::Song { id, json } => commands::show_song(&config, id, json)?,
        Commands::Suggestions { json } => commands::show_suggestions(json)?,
        Commands::Config(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "refrain", "--db", "/tmp/x.db", "search", "love and loss", "-l", "5", "-t", "0.3",
        ]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Commands::Search {
                query,
                limit,
                threshold,
                json,
            } => {
                assert_eq!(query, "love and loss");
                assert_eq!(limit, Some(5));
                assert_eq!(threshold, Some(0.3));
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::parse_from(["refrain", "config", "set", "batch_size", "25"]);
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommand::Set { ref key, ref value })
                if key == "batch_size" && value == "25"
        ));
    }
}
