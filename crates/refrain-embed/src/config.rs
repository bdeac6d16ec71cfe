use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use refrain_core::ModelSpec;

use crate::error::{EmbedError, EmbedResult};
use crate::openai::ProviderSettings;
use crate::generate::PipelineOptions;

/// Configuration for refrain.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (REFRAIN_* prefix)
/// 3. Config file (~/.config/refrain/config.toml)
/// 4. Built-in defaults (lowest priority)
///
/// The struct is built once at startup and handed to the provider client,
/// the pipeline and the search service; nothing reads it globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the embedding provider.
    ///
    /// Can be set via:
    /// - ENV: REFRAIN_OPENAI_API_KEY
    /// - Config: openai_api_key = "..."
    pub openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible embeddings API.
    pub api_base_url: String,

    pub embedding_model: String,
    pub embedding_dimensions: usize,

    /// Records per provider call.
    pub batch_size: usize,
    /// Batches loaded per backlog page.
    pub working_set_batches: usize,
    /// Pause after each committed batch, in milliseconds.
    pub batch_delay_ms: u64,
    /// Pause between per-record fallback calls, in milliseconds.
    pub individual_delay_ms: u64,

    pub single_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    /// Retries of transient provider failures within one call.
    pub max_transient_retries: usize,
    /// Longest composite text sent to the provider, in characters.
    pub max_input_chars: usize,

    pub max_query_chars: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_threshold: f64,

    /// Path to the SQLite database.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: REFRAIN_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/refrain/refrain.db
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            api_base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            batch_size: 50,
            working_set_batches: 10,
            batch_delay_ms: 1000,
            individual_delay_ms: 500,
            single_timeout_secs: 30,
            batch_timeout_secs: 60,
            max_transient_retries: 2,
            max_input_chars: 8000,
            max_query_chars: 500,
            default_limit: 10,
            max_limit: 50,
            default_threshold: 0.5,
            database_path: default_db_path(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/refrain/config.toml
    /// Reads environment variables with REFRAIN_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("refrain");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }

    /// Reject values the pipeline or the search service cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.embedding_model.trim().is_empty(),
            "embedding_model must not be empty"
        );
        anyhow::ensure!(
            self.embedding_dimensions > 0,
            "embedding_dimensions must be positive"
        );
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(
            self.working_set_batches > 0,
            "working_set_batches must be positive"
        );
        anyhow::ensure!(self.max_limit > 0, "max_limit must be positive");
        anyhow::ensure!(
            (1..=self.max_limit).contains(&self.default_limit),
            "default_limit must be between 1 and max_limit ({})",
            self.max_limit
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.default_threshold),
            "default_threshold must be between 0 and 1"
        );
        anyhow::ensure!(self.max_query_chars > 0, "max_query_chars must be positive");
        anyhow::ensure!(self.max_input_chars > 0, "max_input_chars must be positive");
        Ok(())
    }

    /// The model configuration embeddings are produced and tagged with.
    #[must_use]
    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec::new(self.embedding_model.clone(), self.embedding_dimensions)
    }

    /// Settings for the provider client.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::Config`] when no API key is configured.
    pub fn provider_settings(&self) -> EmbedResult<ProviderSettings> {
        let api_key = self
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                EmbedError::Config(
                    "no embedding provider API key; set REFRAIN_OPENAI_API_KEY or openai_api_key"
                        .to_string(),
                )
            })?;

        Ok(ProviderSettings {
            api_key: api_key.to_string(),
            base_url: self.api_base_url.clone(),
            model: self.model_spec(),
            single_timeout: Duration::from_secs(self.single_timeout_secs),
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
            max_retries: self.max_transient_retries,
            max_input_chars: self.max_input_chars,
            ..ProviderSettings::default()
        })
    }

    /// Batching and pacing for the generation pipeline.
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            working_set_batches: self.working_set_batches,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            individual_delay: Duration::from_millis(self.individual_delay_ms),
            max_input_chars: self.max_input_chars,
        }
    }
}

/// Get the default database path.
///
/// Returns: ~/.local/share/refrain/refrain.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("refrain")
        .join("refrain.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/refrain/config.toml
/// - macOS: ~/Library/Application Support/refrain/config.toml
/// - Windows: %APPDATA%\refrain\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("refrain")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Refrain Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (REFRAIN_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# API key for the embedding provider.
# Required by `refrain embed`, `refrain process` and `refrain search`.
#
# Can also be set via:
# - Environment: REFRAIN_OPENAI_API_KEY=sk-...
openai_api_key = "your-openai-api-key-here"

# Any OpenAI-compatible embeddings endpoint works.
#api_base_url = "https://api.openai.com/v1"

# Changing the model or its dimensions marks every stored embedding as
# stale; run `refrain embed` afterwards to rebuild them.
#embedding_model = "text-embedding-3-small"
#embedding_dimensions = 1536

# Embedding pipeline
#batch_size = 50
#working_set_batches = 10
#batch_delay_ms = 1000
#individual_delay_ms = 500
#single_timeout_secs = 30
#batch_timeout_secs = 60
#max_transient_retries = 2
#max_input_chars = 8000

# Search defaults
#max_query_chars = 500
#default_limit = 10
#max_limit = 50
#default_threshold = 0.5

# Path to the SQLite database
#
# Can also be set via:
# - CLI: refrain --db /custom/path.db status
# - Environment: REFRAIN_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/refrain.db"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
