//! Configuration structures for the processing pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::DteError;

/// Main configuration for dteocr.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DteConfig {
    /// SII registry client configuration.
    pub registry: RegistryConfig,

    /// Poll loop configuration.
    pub processor: ProcessorConfig,

    /// OCR backend configuration.
    pub ocr: OcrConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// SII registry lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry query endpoint.
    pub endpoint: String,

    /// Total attempts per lookup, including the first.
    pub max_retries: u32,

    /// Days a cached taxpayer record stays valid.
    pub cache_ttl_days: i64,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Base delay between attempts; attempt `n` waits `n` times this.
    pub backoff_ms: u64,

    /// Taxpayer cache file used by the CLI.
    pub cache_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://zeus.sii.cl/cvc_cgi/stc/getstc".to_string(),
            max_retries: 3,
            cache_ttl_days: 30,
            timeout_secs: 10,
            backoff_ms: 1000,
            cache_path: None,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Cache TTL, saturating for day counts `chrono` cannot represent.
    pub fn cache_ttl(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::try_days(self.cache_ttl_days).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Pending documents fetched per poll.
    pub batch_size: usize,

    /// Pause between two documents, to respect third-party rate limits.
    pub pacing_ms: u64,

    /// Pause when no document is pending.
    pub idle_ms: u64,

    /// Pause after an unexpected poll failure.
    pub cooldown_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pacing_ms: 2_000,
            idle_ms: 10_000,
            cooldown_ms: 30_000,
        }
    }
}

impl ProcessorConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// OCR backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// HTTP endpoint accepting raw image bytes. Required by `run`.
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `dteocr_core=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl DteConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, DteError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), DteError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<(), DteError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable source.
    ///
    /// Recognized keys: `MAX_RETRIES`, `SII_CACHE_EXPIRY_DAYS`, `SII_ENDPOINT`,
    /// `OCR_ENDPOINT`, `LOG_LEVEL`.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), DteError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MAX_RETRIES") {
            self.registry.max_retries = parse_var("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("SII_CACHE_EXPIRY_DAYS") {
            self.registry.cache_ttl_days = parse_var("SII_CACHE_EXPIRY_DAYS", &v)?;
        }
        if let Some(v) = lookup("SII_ENDPOINT") {
            self.registry.endpoint = v;
        }
        if let Some(v) = lookup("OCR_ENDPOINT") {
            self.ocr.endpoint = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v.to_lowercase();
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), DteError> {
        let mut errors = Vec::new();

        if self.registry.max_retries == 0 {
            errors.push("registry.max_retries must be at least 1");
        }
        if self.registry.cache_ttl_days < 0 {
            errors.push("registry.cache_ttl_days must not be negative");
        } else if chrono::TimeDelta::try_days(self.registry.cache_ttl_days).is_none() {
            errors.push("registry.cache_ttl_days is out of range");
        }
        if self.processor.batch_size == 0 {
            errors.push("processor.batch_size must be at least 1");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DteError::Config(errors.join("; ")))
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DteError> {
    value
        .trim()
        .parse()
        .map_err(|_| DteError::Config(format!("invalid value for {}: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DteConfig::default();
        assert_eq!(config.registry.max_retries, 3);
        assert_eq!(config.registry.cache_ttl_days, 30);
        assert_eq!(config.registry.timeout(), Duration::from_secs(10));
        assert_eq!(config.processor.batch_size, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DteConfig =
            serde_json::from_str(r#"{"registry": {"max_retries": 5}}"#).unwrap();
        assert_eq!(config.registry.max_retries, 5);
        assert_eq!(config.registry.cache_ttl_days, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_apply_vars() {
        let vars: HashMap<&str, &str> = [
            ("MAX_RETRIES", "7"),
            ("SII_CACHE_EXPIRY_DAYS", "10"),
            ("LOG_LEVEL", "DEBUG"),
            ("OCR_ENDPOINT", "http://localhost:9000/ocr"),
        ]
        .into_iter()
        .collect();

        let mut config = DteConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.registry.max_retries, 7);
        assert_eq!(config.registry.cache_ttl_days, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.ocr.endpoint.as_deref(), Some("http://localhost:9000/ocr"));
    }

    #[test]
    fn test_apply_vars_rejects_garbage() {
        let mut config = DteConfig::default();
        let result = config.apply_vars(|k| (k == "MAX_RETRIES").then(|| "three".to_string()));
        assert!(matches!(result, Err(DteError::Config(_))));
    }

    #[test]
    fn test_huge_cache_ttl_is_rejected_without_panicking() {
        let mut config = DteConfig::default();
        config
            .apply_vars(|k| (k == "SII_CACHE_EXPIRY_DAYS").then(|| "999999999999999".to_string()))
            .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache_ttl_days"));
        assert_eq!(config.registry.cache_ttl(), chrono::TimeDelta::MAX);
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = DteConfig::default();
        config.registry.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = DteConfig::default();
        config.processor.pacing_ms = 250;
        config.save(&path).unwrap();

        let loaded = DteConfig::from_file(&path).unwrap();
        assert_eq!(loaded.processor.pacing_ms, 250);
    }
}
