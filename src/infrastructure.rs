//! Infrastructure layer: configuration, logging, sessions, parsing and storage
//!
//! Everything here talks to the outside world (network, filesystem, process
//! environment) or turns raw markup into domain values.

pub mod chrome_session;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod page_fetcher;
pub mod parsing;
pub mod record_store;
pub mod session;

pub use chrome_session::ChromeSessionProvider;
pub use config::{
    AppConfig, ConfigError, CrawlingConfig, DelayRange, DiscoveryConfig, LoggingConfig, SessionBackend,
    StorageConfig,
};
pub use discovery::{DiscoveryError, DiscoveryReport, LinkDiscovery};
pub use logging::{LoggingGuard, init_logging};
pub use page_fetcher::PageFetcher;
pub use parsing::{DetailExtractor, ParsingConfig, ParsingError, ParsingResult, StateClassifier};
pub use record_store::{CheckpointStore, FileRecordStore, StoreError};
pub use session::{BrowserSession, HttpSessionProvider, IdentityPool, NavigationError, SessionProvider};
