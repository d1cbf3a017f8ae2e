//! CLI subcommands and shared helpers.

pub mod config;
pub mod lookup;
pub mod parse;
pub mod run;
pub mod rut;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use dteocr_core::models::config::DteConfig;
use dteocr_core::registry::{HttpRegistryTransport, JsonFileTaxpayerCache, RegistryClient};

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dteocr")
        .join("config.json")
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dteocr")
        .join("taxpayers.json")
}

/// Effective configuration: file (explicit or default location), then environment.
///
/// With `allow_missing`, an explicit path that does not exist yet yields defaults.
pub fn load_config(path: Option<&Path>, allow_missing: bool) -> anyhow::Result<DteConfig> {
    let mut config = match path {
        Some(path) if allow_missing && !path.exists() => DteConfig::default(),
        Some(path) => DteConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                DteConfig::from_file(&default_path).with_context(|| {
                    format!("Failed to load config from {}", default_path.display())
                })?
            } else {
                DteConfig::default()
            }
        }
    };

    config.apply_env()?;
    Ok(config)
}

/// Registry client over HTTP with the persistent JSON cache.
pub async fn build_registry(config: &DteConfig) -> anyhow::Result<RegistryClient> {
    let cache_path = config
        .registry
        .cache_path
        .clone()
        .unwrap_or_else(default_cache_path);
    let cache = JsonFileTaxpayerCache::open(&cache_path)
        .await
        .with_context(|| format!("Failed to open taxpayer cache {}", cache_path.display()))?;
    let transport = HttpRegistryTransport::new(&config.registry)?;

    Ok(RegistryClient::new(
        &config.registry,
        Arc::new(transport),
        Arc::new(cache),
    ))
}
