//! Configuration management for clipscout.
//!
//! Configuration is read from `~/.config/clipscout/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.
//! Credentials may also come from the environment, which wins over the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::analysis::AnalysisSettings;
use crate::domain::Platform;
use crate::executor::{BrowserSettings, HttpSettings};
use crate::orchestrator::{
    RetryPolicy, StrategyTable, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MIN_COMPLETENESS,
};
use crate::pipeline::DEFAULT_WORKERS;
use crate::ratelimit::RateLimitSettings;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineSettings,
    /// Strategy ids per platform, replacing the built-in chain
    pub chains: BTreeMap<Platform, Vec<String>>,
    pub rate_limits: BTreeMap<Platform, RateLimitSettings>,
    pub browser: BrowserSettings,
    pub http: HttpSettings,
    pub credentials: Credentials,
    pub analysis: AnalysisSettings,
}

/// Retry, timeout and acceptance settings of the orchestrator
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Targets resolved concurrently by `batch`
    pub workers: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Bound on one strategy attempt, open and fetch together
    pub attempt_timeout_secs: u64,
    /// Lowest completeness a best-effort partial result may have
    pub min_completeness: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            workers: DEFAULT_WORKERS,
            max_retries: retry.max_retries,
            backoff_base_ms: retry.backoff_base.as_millis() as u64,
            backoff_max_ms: retry.backoff_max.as_millis() as u64,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT.as_secs(),
            min_completeness: DEFAULT_MIN_COMPLETENESS,
        }
    }
}

impl PipelineSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_completeness) {
            return Err(format!(
                "pipeline.min_completeness must be between 0 and 1, got {}",
                self.min_completeness
            ));
        }
        Ok(())
    }
}

/// API keys and tokens; executors that need a missing one skip themselves
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub youtube_api_key: Option<String>,
    pub instagram_access_token: Option<String>,
    pub apify_token: Option<String>,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, creating a commented default there if missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
            config.pipeline.validate().map_err(|message| ConfigError::Invalid {
                path: path.to_path_buf(),
                message,
            })?;
            config
        } else {
            // Create default config with comments
            Self::create_default_config(path)?;
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Get the default config file path: `~/.config/clipscout/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("clipscout").join("config.toml"))
    }

    /// Override credentials from environment variables that are set and non-empty
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("YOUTUBE_API_KEY") {
            self.credentials.youtube_api_key = Some(v);
        }
        if let Some(v) = var("INSTAGRAM_ACCESS_TOKEN") {
            self.credentials.instagram_access_token = Some(v);
        }
        if let Some(v) = var("APIFY_TOKEN") {
            self.credentials.apify_token = Some(v);
        }
        if let Some(v) = var("MISTRAL_API_KEY") {
            self.analysis.api_key = Some(v);
        }
    }

    /// Built-in chains with the configured ones laid over them
    pub fn strategy_table(&self) -> StrategyTable {
        self.chains
            .iter()
            .fold(StrategyTable::default(), |table, (platform, ids)| {
                table.with_chain(*platform, ids.iter().map(String::as_str))
            })
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        tracing::info!("Created default config at {}", path.display());
        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# clipscout configuration
#
# Strategy ids: browser_dom, http_html, public_api, apify_actor
# Platforms: youtube, instagram, tiktok, twitter
#
# Credentials can also be set with the environment variables
# YOUTUBE_API_KEY, INSTAGRAM_ACCESS_TOKEN, APIFY_TOKEN and MISTRAL_API_KEY.

[pipeline]
# Targets resolved concurrently by `clipscout batch`
workers = 4

# Retries of one strategy on transient or rate-limit failures
max_retries = 2

# Exponential backoff between retries (milliseconds)
backoff_base_ms = 500
backoff_max_ms = 8000

# Upper bound for a single strategy attempt (seconds)
attempt_timeout_secs = 45

# A partial result is accepted after the whole chain ran only if at least
# this share of the platform's required fields resolved
min_completeness = 0.4

[chains]
# Strategies are tried in order; a complete result stops the chain
youtube = ["public_api", "http_html", "browser_dom"]
instagram = ["browser_dom", "http_html", "public_api", "apify_actor"]
tiktok = ["browser_dom", "http_html", "public_api", "apify_actor"]
twitter = ["public_api", "browser_dom", "apify_actor"]

# Token bucket per platform
[rate_limits.youtube]
capacity = 5
refill_per_minute = 40
max_concurrent = 4
wait_window_ms = 2000

[rate_limits.instagram]
capacity = 5
refill_per_minute = 30
max_concurrent = 2
wait_window_ms = 2000

[rate_limits.tiktok]
capacity = 5
refill_per_minute = 40
max_concurrent = 4
wait_window_ms = 2000

[rate_limits.twitter]
capacity = 5
refill_per_minute = 60
max_concurrent = 4
wait_window_ms = 2000

[browser]
# Run browser in headless mode (no visible window)
headless = true

# Page load timeout in seconds
timeout_secs = 30

# Wait time after page load for client-side rendering (milliseconds)
wait_after_load_ms = 1500

# Maximum concurrent browser pages
max_pages = 3

[http]
# Request timeout in seconds
timeout_secs = 15

[credentials]
# youtube_api_key = ""
# instagram_access_token = ""
# apify_token = ""

[analysis]
# Summarise captions after a successful resolution (needs api_key)
enabled = true
api_url = "https://api.mistral.ai/v1/chat/completions"
# api_key = ""
model = "mistral-tiny"
temperature = 0.7
max_tokens = 500
timeout_secs = 30
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config file at {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StrategyId;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(
            config.rate_limits[&Platform::Instagram],
            RateLimitSettings::for_platform(Platform::Instagram)
        );
        assert_eq!(config.strategy_table(), StrategyTable::default());
        assert_eq!(config.analysis.model, "mistral-tiny");
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[pipeline]
max_retries = 5

[chains]
tiktok = ["apify_actor", "browser_dom"]
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        // Custom values
        assert_eq!(config.pipeline.max_retries, 5);
        assert_eq!(
            config.strategy_table().chain(Platform::TikTok),
            &[StrategyId::new("apify_actor"), StrategyId::new("browser_dom")]
        );
        // Default values
        assert_eq!(config.pipeline.workers, DEFAULT_WORKERS);
        assert_eq!(
            config.strategy_table().chain(Platform::YouTube),
            StrategyTable::default().chain(Platform::YouTube)
        );
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");

        assert_eq!(config.pipeline.retry_policy(), RetryPolicy::default());
        assert!(config.browser.headless);
        assert_eq!(config.credentials, Credentials::default());
    }

    #[test]
    fn test_unknown_platform_key_is_rejected() {
        let content = "[chains]\nmyspace = [\"browser_dom\"]\n";
        assert!(toml::from_str::<Config>(content).is_err());
    }

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = Config::default();
        config.credentials.apify_token = Some("from-file".into());

        config.apply_env(|name| match name {
            "APIFY_TOKEN" => Some("from-env".into()),
            "YOUTUBE_API_KEY" => Some("  ".into()),
            _ => None,
        });

        assert_eq!(config.credentials.apify_token.as_deref(), Some("from-env"));
        assert_eq!(config.credentials.youtube_api_key, None);
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.pipeline.workers, DEFAULT_WORKERS);

        fs::write(&path, "[pipeline]\nworkers = 9\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().pipeline.workers, 9);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipeline\nworkers = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_from_rejects_out_of_range_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for value in ["nan", "1.5", "-0.1"] {
            fs::write(&path, format!("[pipeline]\nmin_completeness = {}\n", value)).unwrap();
            assert!(
                matches!(Config::load_from(&path), Err(ConfigError::Invalid { .. })),
                "{} should be rejected",
                value
            );
        }

        fs::write(&path, "[pipeline]\nmin_completeness = 1.0\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().pipeline.min_completeness, 1.0);
    }
}
