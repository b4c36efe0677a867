mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./mediacat.toml",
        "~/.config/mediacat/config.toml",
        "/etc/mediacat/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

fn expand_paths(config: &mut Config) {
    if let Some(root) = &config.catalog.root {
        let expanded = shellexpand::tilde(&root.to_string_lossy()).into_owned();
        config.catalog.root = Some(expanded.into());
    }
    let db = shellexpand::tilde(&config.catalog.db_path.to_string_lossy()).into_owned();
    config.catalog.db_path = db.into();
}

/// Validate configuration. Hard errors abort; questionable settings are
/// logged.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.friendly_name.contains('/') {
        anyhow::bail!(
            "Friendly name '{}' cannot contain '/'",
            config.server.friendly_name
        );
    }

    match &config.catalog.root {
        Some(root) if !root.is_dir() => {
            anyhow::bail!("Catalog root is not a directory: {:?}", root);
        }
        None if config.catalog.backend == BackendKind::Scanning => {
            anyhow::bail!("The scanning backend requires catalog.root");
        }
        None => {
            if !config.catalog.db_path.exists() {
                tracing::warn!(
                    "No catalog root set and index {:?} does not exist yet",
                    config.catalog.db_path
                );
            }
        }
        Some(_) => {}
    }

    if config.transfer.chunk_size == 0 {
        anyhow::bail!("Transfer chunk size cannot be 0");
    }

    if config.transfer.max_header_bytes < 256 {
        tracing::warn!(
            "transfer.max_header_bytes = {} is very small; most clients will be rejected",
            config.transfer.max_header_bytes
        );
    }

    if config.gateway.cache_capacity == 0 {
        tracing::warn!("gateway.cache_capacity = 0 disables path caching");
    }

    if config.gateway.connect_timeout_ms == 0 || config.gateway.read_timeout_ms == 0 {
        anyhow::bail!("Gateway timeouts cannot be 0");
    }

    if config.catalog.backend == BackendKind::Scanning && config.catalog.reset {
        tracing::warn!("catalog.reset has no effect on the scanning backend");
    }

    Ok(())
}
