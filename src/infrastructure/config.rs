//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (every field has one)
//! 2. An optional TOML file passed on the command line
//! 3. Environment variables prefixed with `SOLDCAR__`
//!    (e.g. `SOLDCAR__CRAWLING__BATCH_SIZE=4`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::infrastructure::parsing::ParsingConfig;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SOLDCAR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawling: CrawlingConfig,
    pub storage: StorageConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
    pub parsing: ParsingConfig,
}

/// Inclusive millisecond range a jittered delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Draw a delay uniformly from the range
    pub fn sample(&self) -> Duration {
        let millis = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            fastrand::u64(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(millis)
    }

    pub fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }
}

/// Listing resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlingConfig {
    /// Site root that relative listing identifiers are joined onto
    pub base_url: String,

    /// Listings resolved concurrently per batch
    pub batch_size: usize,

    /// Fetch attempts per listing before giving up for this run
    pub max_attempts: u32,

    /// Per-fetch navigation timeout in milliseconds
    pub fetch_timeout_ms: u64,

    /// Delay before each attempt (primary anti-detection spacing)
    pub attempt_delay: DelayRange,

    /// Delay right before navigating, charged again on every retry
    pub navigation_delay: DelayRange,

    /// Browser identity strings; one is drawn per session
    pub user_agents: Vec<String>,

    /// Accept-Language header sent with every session
    pub accept_language: String,

    /// What a session is backed by
    pub session_backend: SessionBackend,

    /// Browser backend only: run Chrome without a window
    pub headless: bool,

    /// Browser backend only: Chrome binary, detected when unset
    pub chrome_executable: Option<PathBuf>,

    /// Draw a progress bar on stderr while ingesting
    pub show_progress: bool,
}

/// Session implementation used for fetching pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Headless Chrome, one incognito context per session; pages are rendered
    #[default]
    Browser,
    /// Plain HTTP client with its own cookie jar; no script execution
    Http,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.grays.com".to_string(),
            batch_size: 8,
            max_attempts: 3,
            fetch_timeout_ms: 60_000,
            attempt_delay: DelayRange::new(5_000, 8_000),
            navigation_delay: DelayRange::new(1_000, 3_000),
            user_agents: default_user_agents(),
            accept_language: "en-AU,en;q=0.9".to_string(),
            session_backend: SessionBackend::default(),
            headless: true,
            chrome_executable: None,
            show_progress: true,
        }
    }
}

impl CrawlingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Parsed `base_url`
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid(format!("base_url '{}' is invalid: {e}", self.base_url)))
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.91 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.91 Safari/537.36 Edg/124.0.2478.51",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:124.0) Gecko/20100101 Firefox/124.0",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Where the pending list, datasets and link log live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub car_links_csv: PathBuf,
    pub sold_csv: PathBuf,
    pub referred_csv: PathBuf,
    pub scraped_links_csv: PathBuf,
    pub sold_json: PathBuf,
    pub referred_json: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            car_links_csv: PathBuf::from("CSV_data/car_links.csv"),
            sold_csv: PathBuf::from("CSV_data/sold_cars.csv"),
            referred_csv: PathBuf::from("CSV_data/referred_cars.csv"),
            scraped_links_csv: PathBuf::from("CSV_data/scraped_links.csv"),
            sold_json: PathBuf::from("JSON_data/sold_cars.json"),
            referred_json: PathBuf::from("JSON_data/referred_cars.json"),
        }
    }
}

impl StorageConfig {
    /// Same file names as the defaults, rooted under `dir`
    pub fn under(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let defaults = Self::default();
        Self {
            car_links_csv: dir.join(defaults.car_links_csv),
            sold_csv: dir.join(defaults.sold_csv),
            referred_csv: dir.join(defaults.referred_csv),
            scraped_links_csv: dir.join(defaults.scraped_links_csv),
            sold_json: dir.join(defaults.sold_json),
            referred_json: dir.join(defaults.referred_json),
        }
    }
}

/// Listing discovery (search result pagination) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Search page URL with a `{page}` placeholder
    pub search_url_template: String,

    /// Safety cap on pages visited per run
    pub max_pages: u32,

    /// Delay between result pages
    pub page_delay: DelayRange,

    /// A listing link must contain one of these category slugs
    pub category_slugs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_url_template: "https://www.grays.com/search/automotive-trucks-and-marine/motor-vehiclesmotor-cycles?tab=items&sort=close-time-asc&page={page}".to_string(),
            max_pages: 200,
            page_delay: DelayRange::new(3_000, 6_000),
            category_slugs: vec![
                "motor-vehicles-motor-cycles".to_string(),
                "motor-vehiclesmotor-cycles".to_string(),
            ],
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Write JSON lines to the log file instead of plain text
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    pub log_dir: PathBuf,

    pub file_name: String,

    /// Rotated log files to keep (older ones are deleted on start-up)
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from("logs"),
            file_name: "scraping.log".to_string(),
            max_files: 10,
        }
    }
}

impl AppConfig {
    /// Load defaults, then `path` (if given), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let crawling = &self.crawling;
        if crawling.batch_size == 0 {
            return Err(ConfigError::invalid("crawling.batch_size must be greater than 0"));
        }
        if crawling.max_attempts == 0 {
            return Err(ConfigError::invalid("crawling.max_attempts must be greater than 0"));
        }
        if crawling.fetch_timeout_ms == 0 {
            return Err(ConfigError::invalid("crawling.fetch_timeout_ms must be greater than 0"));
        }
        if crawling.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::invalid("crawling.user_agents must not be empty"));
        }
        crawling.base_url()?;

        for (name, range) in [
            ("crawling.attempt_delay", crawling.attempt_delay),
            ("crawling.navigation_delay", crawling.navigation_delay),
            ("discovery.page_delay", self.discovery.page_delay),
        ] {
            if !range.is_valid() {
                return Err(ConfigError::invalid(format!(
                    "{name}: min_ms ({}) cannot be greater than max_ms ({})",
                    range.min_ms, range.max_ms
                )));
            }
        }

        if !self.discovery.search_url_template.contains("{page}") {
            return Err(ConfigError::invalid(
                "discovery.search_url_template must contain a {page} placeholder",
            ));
        }
        if self.parsing.markers.regions.is_empty() {
            return Err(ConfigError::invalid("parsing.markers.regions must not be empty"));
        }

        Ok(())
    }
}
