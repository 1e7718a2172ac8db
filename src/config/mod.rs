mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./moeplex.toml", "~/.config/moeplex/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.mux.queue_capacity == 0 {
        anyhow::bail!("mux.queue_capacity must be at least 1");
    }

    if config.mux.batch_size == 0 {
        anyhow::bail!("mux.batch_size must be at least 1");
    }

    if !(1..=22).contains(&config.mux.compression_level) {
        anyhow::bail!(
            "mux.compression_level {} is outside the zstd range 1..=22",
            config.mux.compression_level
        );
    }

    if config.mux.interleave == moeplex_container::InterleaveMode::Live
        && config.mux.live_timeout_ms == 0
    {
        tracing::warn!("mux.live_timeout_ms is 0, stalled tracks are never waited for");
    }

    if config.demux.max_payload_len == 0 {
        anyhow::bail!("demux.max_payload_len must be at least 1");
    }

    Ok(())
}
