pub mod types;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use std::path::Path;
pub use types::*;

/// Prefix for environment overrides, e.g. `NOTION_BRIDGE__HTTP__PORT=8080`
pub const ENV_PREFIX: &str = "NOTION_BRIDGE";

/// Load configuration from an optional TOML file layered under environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();

    let config = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load config from: {}", path.display()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate the loaded configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        anyhow::bail!(
            "Invalid log level '{}'. Valid levels: {}",
            config.logging.level,
            valid_levels.join(", ")
        );
    }

    // Validate log format
    let valid_formats = ["pretty", "json"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        anyhow::bail!(
            "Invalid log format '{}'. Valid formats: {}",
            config.logging.format,
            valid_formats.join(", ")
        );
    }

    let base_url = &config.backend.base_url;
    let parsed = reqwest::Url::parse(base_url)
        .with_context(|| format!("Invalid backend base_url '{}'", base_url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!(
            "Backend base_url '{}' must use http or https, got '{}'",
            base_url,
            parsed.scheme()
        );
    }
    // Tool paths start with '/', so a trailing slash would double it
    if base_url.ends_with('/') {
        anyhow::bail!("Backend base_url '{}' must not end with '/'", base_url);
    }

    if config.backend.request_timeout_secs == 0 {
        anyhow::bail!("backend.request_timeout_secs must be greater than 0");
    }
    if config.backend.credentials_env.is_empty() {
        anyhow::bail!("backend.credentials_env must not be empty");
    }

    if config.stream.heartbeat_interval_secs == 0 {
        anyhow::bail!("stream.heartbeat_interval_secs must be greater than 0");
    }
    if config.stream.channel_capacity == 0 {
        anyhow::bail!("stream.channel_capacity must be greater than 0");
    }
    if config.stream.max_frame_bytes == 0 {
        anyhow::bail!("stream.max_frame_bytes must be greater than 0");
    }

    Ok(())
}
