use anyhow::{Context, Result};
use serde_json::{Map, Value};
use toml_edit::DocumentMut;

use refrain_embed::{config, Config};

const API_KEY: &str = "openai_api_key";

/// Every setting as a JSON object, keyed by its config-file name.
fn settings(config: &Config) -> Result<Map<String, Value>> {
    match serde_json::to_value(config).context("Failed to serialize config")? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Config did not serialize to a table"),
    }
}

fn valid_keys() -> Result<String> {
    Ok(settings(&Config::default())?
        .keys()
        .cloned()
        .collect::<Vec<_>>()
        .join(", "))
}

fn display_value(key: &str, value: &Value) -> String {
    match value {
        Value::Null => "<not set>".to_string(),
        Value::String(_) if key == API_KEY => "<set>".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Show the current effective configuration.
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    for (key, value) in settings(&config)? {
        println!("  {key}: {}", display_value(&key, &value));
    }

    println!("\nPriority: CLI args > ENV vars (REFRAIN_*) > Config file > Defaults");

    Ok(())
}

/// Get a specific config value.
pub fn get_config(key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        let config = Config::load()?;
        let settings = settings(&config)?;

        let Some(value) = settings.get(&key) else {
            anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, valid_keys()?);
        };
        match value {
            Value::Null => println!("<not set>"),
            Value::String(s) => println!("{s}"),
            other => println!("{other}"),
        }
    } else {
        // No key provided, show entire config file contents
        let config_path = config::config_file_path();

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'refrain config init' to create it.");
        }
    }

    Ok(())
}

/// Parse `raw` into the TOML type the setting `key` expects.
fn typed_value(key: &str, raw: &str) -> Result<toml_edit::Value> {
    let defaults = settings(&Config::default())?;
    let Some(default) = defaults.get(key) else {
        anyhow::bail!("Unknown config key: {}\n\nValid keys: {}", key, valid_keys()?);
    };

    let value = match default {
        Value::Number(n) if n.is_f64() => {
            let parsed: f64 = raw
                .parse()
                .with_context(|| format!("{key} expects a number, got {raw:?}"))?;
            toml_edit::Value::from(parsed)
        }
        Value::Number(_) => {
            let parsed: i64 = raw
                .parse()
                .with_context(|| format!("{key} expects a whole number, got {raw:?}"))?;
            anyhow::ensure!(parsed >= 0, "{key} must not be negative");
            toml_edit::Value::from(parsed)
        }
        _ => toml_edit::Value::from(raw),
    };
    Ok(value)
}

/// Set `key = value` in a config document, keeping comments and layout.
fn apply_setting(contents: &str, key: &str, raw: &str) -> Result<String> {
    let value = typed_value(key, raw)?;
    let mut doc = contents
        .parse::<DocumentMut>()
        .context("Config file is not valid TOML")?;
    doc[key] = toml_edit::Item::Value(value);
    Ok(doc.to_string())
}

/// Set a config value.
pub fn set_config(key: &str, value: &str) -> Result<()> {
    let config_path = config::config_file_path();

    // Ensure config file exists
    config::ensure_config_file()?;

    let contents = std::fs::read_to_string(&config_path).context("Failed to read config file")?;
    let updated = apply_setting(&contents, key, value)?;

    std::fs::write(&config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {} = {}", key, display_value(key, &Value::from(value)));
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure refrain.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
