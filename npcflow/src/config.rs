//! Pipeline configuration.
//!
//! Values are layered: serde defaults, then an optional `npcflow.toml`, then
//! environment variables prefixed with `NPCFLOW_`. Nested keys use a double
//! underscore, e.g. `NPCFLOW_BATCH__MAX_CONCURRENCY=8`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::NpcflowError;
use crate::providers::RetryConfig;

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "npcflow.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "NPCFLOW_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Record store settings.
    pub database: DatabaseConfig,
    /// Settings passed to every provider call.
    pub provider: ProviderConfig,
    /// Confidence thresholds and synthesis weights.
    pub quality: QualityConfig,
    /// Batch execution settings.
    pub batch: BatchConfig,
    /// Timeout and retry settings for provider calls.
    pub resilience: ResilienceConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Loads defaults, `npcflow.toml` if present, then `NPCFLOW_` env vars.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Config`] if a source is malformed or the
    /// result fails validation.
    pub fn load() -> Result<Self, NpcflowError> {
        Self::extract(Self::figment().merge(Toml::file(DEFAULT_CONFIG_FILE)))
    }

    /// Loads defaults, the given TOML file, then `NPCFLOW_` env vars.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Config`] if the file is missing or malformed,
    /// or the result fails validation.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, NpcflowError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NpcflowError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        Self::extract(Self::figment().merge(Toml::file(path)))
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    fn extract(figment: Figment) -> Result<Self, NpcflowError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), NpcflowError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.quality.low_confidence) {
            return Err(NpcflowError::Config(
                "quality.low_confidence must be within [0, 1]".to_string(),
            ));
        }
        if !unit.contains(&self.quality.voice_confidence) {
            return Err(NpcflowError::Config(
                "quality.voice_confidence must be within [0, 1]".to_string(),
            ));
        }
        let weights = [self.quality.text_weight, self.quality.visual_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(NpcflowError::Config(
                "quality weights must be finite and not negative".to_string(),
            ));
        }
        if self.quality.text_weight + self.quality.visual_weight <= 0.0 {
            return Err(NpcflowError::Config(
                "quality.text_weight + quality.visual_weight must be positive".to_string(),
            ));
        }
        if self.batch.max_concurrency == 0 {
            return Err(NpcflowError::Config(
                "batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.resilience.retry.max_attempts == 0 {
            return Err(NpcflowError::Config(
                "resilience.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Volatile in-process store.
    Memory,
    /// SQLite file.
    #[default]
    Sqlite,
}

/// Record store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Which backend to open.
    pub backend: StoreBackend,
    /// SQLite database path; ignored by the memory backend.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("npcflow.db"),
        }
    }
}

/// Immutable settings handed to every provider call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Model identifier for inference providers.
    pub model: String,
    /// API key for inference providers. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL of the wiki the scraper reads.
    pub wiki_base_url: String,
    /// User agent for HTTP fetches.
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            wiki_base_url: "https://oldschool.runescape.wiki".to_string(),
            user_agent: format!("npcflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("wiki_base_url", &self.wiki_base_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Confidence thresholds and synthesis weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Text confidence below this is flagged as low confidence.
    pub low_confidence: f64,
    /// Minimum overall confidence for a voice brief.
    pub voice_confidence: f64,
    /// Weight of text confidence in the overall score.
    pub text_weight: f64,
    /// Weight of visual confidence in the overall score.
    pub visual_weight: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            low_confidence: 0.5,
            voice_confidence: 0.70,
            text_weight: 0.6,
            visual_weight: 0.4,
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum entities processed at once.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// Timeout and retry settings for provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,
    /// Retry policy for transient provider errors.
    pub retry: RetryConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 60_000,
            retry: RetryConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Returns the call timeout as a duration.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.quality.voice_confidence, 0.70);
        assert_eq!(config.batch.max_concurrency, 4);
        assert_eq!(config.database.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn test_api_key_is_redacted() {
        let config = ProviderConfig {
            api_key: Some("secret-key".to_string()),
            ..ProviderConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("<redacted>"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-key"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = PipelineConfig::default();
        config.quality.low_confidence = 1.5;
        assert!(matches!(config.validate(), Err(NpcflowError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_weights_and_concurrency() {
        let mut config = PipelineConfig::default();
        config.quality.text_weight = 0.0;
        config.quality.visual_weight = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.batch.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_weights() {
        for bad in [f64::NAN, f64::INFINITY] {
            let mut config = PipelineConfig::default();
            config.quality.visual_weight = bad;
            assert!(matches!(config.validate(), Err(NpcflowError::Config(_))));

            let mut config = PipelineConfig::default();
            config.quality.text_weight = bad;
            assert!(matches!(config.validate(), Err(NpcflowError::Config(_))));
        }
    }

    #[test]
    fn test_load_layers_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [database]
                backend = "memory"

                [batch]
                max_concurrency = 2

                [quality]
                low_confidence = 0.4
                "#,
            )?;
            jail.set_env("NPCFLOW_BATCH__MAX_CONCURRENCY", "8");
            jail.set_env("NPCFLOW_PROVIDER__MODEL", "test-model");

            let config = PipelineConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.database.backend, StoreBackend::Memory);
            assert_eq!(config.batch.max_concurrency, 8);
            assert_eq!(config.quality.low_confidence, 0.4);
            assert_eq!(config.quality.text_weight, 0.6);
            assert_eq!(config.provider.model, "test-model");
            Ok(())
        });
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = PipelineConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config, PipelineConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_from_explicit_path() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [database]
                backend = "sqlite"
                path = "profiles.db"

                [logging]
                format = "json"
                "#,
            )?;

            let config = PipelineConfig::load_from("custom.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.database.backend, StoreBackend::Sqlite);
            assert_eq!(config.database.path, PathBuf::from("profiles.db"));
            assert_eq!(config.logging.format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        Jail::expect_with(|_jail| {
            let err = PipelineConfig::load_from("nope.toml").unwrap_err();
            assert!(err.to_string().contains("nope.toml"));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_env_value_fails_validation() {
        Jail::expect_with(|jail| {
            jail.set_env("NPCFLOW_QUALITY__VOICE_CONFIDENCE", "2.0");
            assert!(PipelineConfig::load().is_err());
            Ok(())
        });
    }
}
