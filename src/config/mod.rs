//! Configuration management.
//!
//! Settings come from an optional TOML file, overridden by `ARXIV_HARVEST_*`
//! environment variables (`__` separates section and key), overridden in turn
//! by command-line flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! endpoint = "http://export.arxiv.org/api/query"
//! timeout_secs = 60
//! politeness_secs = 3.0
//! page_size = 1000
//!
//! [retry]
//! max_attempts = 5
//! initial_delay_ms = 2000
//! max_delay_secs = 120
//! backoff_multiplier = 2.0
//! jitter_ms = 500
//!
//! [crawl]
//! empty_page_limit = 20
//! parse_policy = "abort"
//! concurrency = 1
//!
//! [output]
//! directory = "data"
//!
//! [keywords]
//! label = "cyber"
//! terms = ["secur*", "safe*", "priva*"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::crawler::{
    CrawlError, DriverConfig, HttpTransport, ParsePolicy, QueryClient, ARXIV_API_URL,
    EMPTY_PAGE_LIMIT,
};
use crate::models::{KeywordFilter, DEFAULT_PAGE_SIZE};
use crate::utils::{default_user_agent, HttpClient, RateGate, RetryConfig};

/// Name of the configuration file looked up by [`find_config_file`]
pub const CONFIG_FILE_NAME: &str = "arxiv-harvest.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "ARXIV_HARVEST";

/// Largest page the query API serves in one response
pub const MAX_PAGE_SIZE: usize = 2000;

/// Longest accepted pause between requests, in seconds
pub const MAX_POLITENESS_SECS: f64 = 3600.0;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub crawl: CrawlSettings,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub keywords: KeywordsConfig,
}

/// Query API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Defaults to `arxiv-harvest/<version>`
    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum seconds between two requests, shared by all sessions
    #[serde(default = "default_politeness_secs")]
    pub politeness_secs: f64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: None,
            timeout_secs: default_timeout_secs(),
            politeness_secs: default_politeness_secs(),
            page_size: default_page_size(),
        }
    }
}

fn default_endpoint() -> String {
    ARXIV_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_politeness_secs() -> f64 {
    3.0
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_max_delay_secs() -> u64 {
    120
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_ms() -> u64 {
    500
}

/// Pagination and scheduling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSettings {
    #[serde(default = "default_empty_page_limit")]
    pub empty_page_limit: u32,

    #[serde(default)]
    pub parse_policy: ParsePolicy,

    /// Sessions in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            empty_page_limit: default_empty_page_limit(),
            parse_policy: ParsePolicy::default(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_empty_page_limit() -> u32 {
    EMPTY_PAGE_LIMIT
}

fn default_concurrency() -> usize {
    1
}

/// Artifact location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Keyword filter of the filtered harvest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default = "default_terms")]
    pub terms: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            terms: default_terms(),
        }
    }
}

fn default_label() -> String {
    KeywordFilter::cyber().label
}

fn default_terms() -> Vec<String> {
    KeywordFilter::cyber().keywords
}

impl HarvestConfig {
    /// Load from `path` (if any) plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, environment())
    }

    /// Load with an explicit environment source
    pub fn load_with_env(
        path: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder.add_source(env).build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the crawler cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.page_size == 0 || self.api.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "api.page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.api.page_size
            )));
        }
        if !(0.0..=MAX_POLITENESS_SECS).contains(&self.api.politeness_secs) {
            return Err(ConfigError::Invalid(format!(
                "api.politeness_secs must be between 0 and {}, got {}",
                MAX_POLITENESS_SECS, self.api.politeness_secs
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "api.timeout_secs must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_multiplier must be a finite number of at least 1, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.crawl.empty_page_limit == 0 {
            return Err(ConfigError::Invalid(
                "crawl.empty_page_limit must be at least 1".to_string(),
            ));
        }
        if self.crawl.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "crawl.concurrency must be at least 1".to_string(),
            ));
        }
        if !self.keywords.terms.is_empty() && self.keywords.label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "keywords.label is required when terms are set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn politeness(&self) -> Duration {
        Duration::from_secs_f64(self.api.politeness_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            backoff_multiplier: self.retry.backoff_multiplier,
            max_jitter: Duration::from_millis(self.retry.jitter_ms),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            page_size: self.api.page_size,
            empty_page_limit: self.crawl.empty_page_limit,
            parse_policy: self.crawl.parse_policy,
        }
    }

    /// Filter of the filtered harvest; `None` when no terms are configured
    pub fn keyword_filter(&self) -> Option<KeywordFilter> {
        if self.keywords.terms.is_empty() {
            return None;
        }
        Some(KeywordFilter::new(
            self.keywords.label.trim(),
            self.keywords.terms.clone(),
        ))
    }

    /// Client over HTTP with the configured pacing, retry and timeout
    pub fn query_client(&self) -> Result<QueryClient, CrawlError> {
        let user_agent = self
            .api
            .user_agent
            .as_deref()
            .unwrap_or(default_user_agent());
        // reqwest's own timeout stays above the per-attempt one
        let http = HttpClient::with_user_agent(
            user_agent,
            self.request_timeout() + Duration::from_secs(5),
        )?;
        let transport = HttpTransport::with_client(http, self.api.endpoint.clone());

        Ok(QueryClient::new(Arc::new(transport))
            .with_gate(RateGate::new(self.politeness()))
            .with_retry(self.retry_config())
            .with_timeout(self.request_timeout()))
    }
}

/// Environment source for `ARXIV_HARVEST_SECTION__KEY` variables
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("keywords.terms")
}

/// Find a configuration file in the working directory or the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("arxiv-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
