//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `RESEARCH_HARVESTER_` using `__` as the
//! section separator (e.g. `RESEARCH_HARVESTER_CRAWL__MAX_PAGES=5`).

mod file_config;

pub use file_config::{find_config_file, save_config, CONFIG_FILE_NAME};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::WaitPolicy;
use crate::extract::{SelectorError, SelectorTable};
use crate::utils::RetryConfig;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RESEARCH_HARVESTER";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub retry: RetryPolicyConfig,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub authors: AuthorConfig,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Field -> fallback chain table
    #[serde(default)]
    pub selectors: SelectorTable,
}

impl Config {
    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.crawl.base_url)
            .map_err(|e| ConfigError::Invalid(format!("crawl.base_url: {e}")))?;
        if self.crawl.max_pages == 0 {
            return Err(ConfigError::Invalid("crawl.max_pages must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.pacing.page_delay_min_ms > self.pacing.page_delay_max_ms {
            return Err(ConfigError::Invalid("pacing: page delay range is inverted".into()));
        }
        if self.pacing.author_delay_min_ms > self.pacing.author_delay_max_ms {
            return Err(ConfigError::Invalid("pacing: author delay range is inverted".into()));
        }
        if self.authors.progress_every == 0 {
            return Err(ConfigError::Invalid("authors.progress_every must be at least 1".into()));
        }
        for locator in self
            .session
            .challenge_markers
            .iter()
            .chain(&self.session.challenge_click_targets)
        {
            scraper::Selector::parse(locator)
                .map_err(|e| ConfigError::Invalid(format!("session selector '{locator}': {e}")))?;
        }
        self.selectors.compile()?;
        Ok(())
    }
}

/// Search and pagination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub base_url: String,
    pub search_path: String,
    pub sort: String,
    /// Hard ceiling on result pages per run
    pub max_pages: u32,
    pub default_limit: usize,
    pub default_query: String,
    /// Query parameter selecting a result page; lets the crawl skip past a
    /// page that could not be loaded. Without it a failed page ends the crawl.
    pub page_param: Option<String>,
    pub wait_policy: WaitPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.semanticscholar.org".to_string(),
            search_path: "/search".to_string(),
            sort: "relevance".to_string(),
            max_pages: 20,
            default_limit: 50,
            default_query: "computer architecture".to_string(),
            page_param: Some("page".to_string()),
            wait_policy: WaitPolicy::NetworkIdle,
        }
    }
}

impl CrawlConfig {
    /// First result page for `query`
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}{}?q={}&sort={}",
            self.base_url.trim_end_matches('/'),
            self.search_path,
            urlencoding::encode(query),
            urlencoding::encode(&self.sort)
        )
    }

    /// Result page `page` (1-based) for `query`, when page addressing is configured
    pub fn page_url(&self, query: &str, page: u32) -> Option<String> {
        if page <= 1 {
            return Some(self.search_url(query));
        }
        let param = self.page_param.as_deref()?;
        Some(format!("{}&{}={}", self.search_url(query), param, page))
    }
}

/// Session manager timeouts and challenge signatures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub search_navigation_timeout_ms: u64,
    pub profile_navigation_timeout_ms: u64,
    /// Wait for the primary ready signal
    pub ready_timeout_ms: u64,
    /// Wait for each fallback ready signal
    pub fallback_ready_timeout_ms: u64,
    /// Any other single driver call
    pub operation_timeout_ms: u64,
    /// Session launch and teardown
    pub lifecycle_timeout_ms: u64,
    /// Pause after a bypass action before re-checking
    pub settle_delay_ms: u64,
    pub bypass_attempts: u32,
    /// URL substrings that identify a verification page
    pub challenge_url_patterns: Vec<String>,
    /// Elements whose presence identifies a verification page
    pub challenge_markers: Vec<String>,
    /// Elements clicked, in order, when attempting a bypass
    pub challenge_click_targets: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_navigation_timeout_ms: 30_000,
            profile_navigation_timeout_ms: 15_000,
            ready_timeout_ms: 10_000,
            fallback_ready_timeout_ms: 5_000,
            operation_timeout_ms: 10_000,
            lifecycle_timeout_ms: 30_000,
            settle_delay_ms: 2_000,
            bypass_attempts: 1,
            challenge_url_patterns: vec![
                "/captcha".to_string(),
                "/sorry/".to_string(),
                "cdn-cgi/challenge-platform".to_string(),
                "/challenge".to_string(),
            ],
            challenge_markers: vec![
                "#challenge-form".to_string(),
                r#"iframe[src*="captcha"]"#.to_string(),
                ".cf-browser-verification".to_string(),
                "#px-captcha".to_string(),
            ],
            challenge_click_targets: vec![
                "#challenge-continue".to_string(),
                "#challenge-form button".to_string(),
            ],
        }
    }
}

impl SessionConfig {
    pub fn search_navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.search_navigation_timeout_ms)
    }

    pub fn profile_navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_navigation_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn fallback_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_ready_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Per-unit retry ceiling and backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicyConfig {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Randomized politeness delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,
    pub author_delay_min_ms: u64,
    pub author_delay_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_min_ms: 2_000,
            page_delay_max_ms: 4_000,
            author_delay_min_ms: 1_000,
            author_delay_max_ms: 2_500,
        }
    }
}

impl PacingConfig {
    /// No delays at all
    pub fn none() -> Self {
        Self {
            page_delay_min_ms: 0,
            page_delay_max_ms: 0,
            author_delay_min_ms: 0,
            author_delay_max_ms: 0,
        }
    }
}

/// Author queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorConfig {
    /// Log progress every N authors
    pub progress_every: usize,
    /// Characters of profile text scanned for citation phrases
    pub visible_text_window: usize,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            progress_every: 5,
            visible_text_window: 4_000,
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub extra_args: Vec<String>,
    pub executable: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            window_width: 1920,
            window_height: 1080,
            extra_args: vec![
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--no-sandbox".to_string(),
                "--lang=en-US".to_string(),
            ],
            executable: None,
        }
    }
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub papers_file: String,
    pub authors_file: String,
    pub paper_authors_file: String,
    /// Save the last markup of a search page that exhausted its retries
    pub debug_snapshots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            papers_file: "papers.csv".to_string(),
            authors_file: "authors.csv".to_string(),
            paper_authors_file: "paper_authors.csv".to_string(),
            debug_snapshots: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Load configuration from an optional file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.crawl.max_pages, 20);
        assert_eq!(config.crawl.default_limit, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.pacing.page_delay_min_ms, 2_000);
        assert!(config.browser.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_search_url_is_encoded() {
        let crawl = CrawlConfig::default();
        assert_eq!(
            crawl.search_url("computer architecture"),
            "https://www.semanticscholar.org/search?q=computer%20architecture&sort=relevance"
        );
    }

    #[test]
    fn test_page_url() {
        let mut crawl = CrawlConfig::default();
        assert_eq!(crawl.page_url("q", 1), Some(crawl.search_url("q")));
        assert_eq!(
            crawl.page_url("q", 3).as_deref(),
            Some("https://www.semanticscholar.org/search?q=q&sort=relevance&page=3")
        );
        crawl.page_param = None;
        assert_eq!(crawl.page_url("q", 3), None);
    }

    #[test]
    fn test_inverted_delay_rejected() {
        let mut config = Config::default();
        config.pacing.author_delay_min_ms = 5_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_selector_rejected() {
        let mut config = Config::default();
        config.selectors.title = vec![crate::extract::ExtractionRule::text("h3 >> a")];
        assert!(matches!(config.validate(), Err(ConfigError::Selector(_))));
    }

    #[test]
    fn test_retry_conversion() {
        let retry = RetryPolicyConfig::default().to_retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
    }
}
