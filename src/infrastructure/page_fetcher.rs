//! Page fetching through an acquired session

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::domain::Document;
use crate::infrastructure::config::{CrawlingConfig, DelayRange};
use crate::infrastructure::session::{BrowserSession, NavigationError};

/// Throttled navigation with a fixed timeout.
///
/// The pre-navigation delay is paid on every call, so a retried listing pays
/// it again.
#[derive(Debug, Clone, Copy)]
pub struct PageFetcher {
    navigation_delay: DelayRange,
    timeout: Duration,
}

impl PageFetcher {
    pub const fn new(navigation_delay: DelayRange, timeout: Duration) -> Self {
        Self {
            navigation_delay,
            timeout,
        }
    }

    pub fn from_config(config: &CrawlingConfig) -> Self {
        Self::new(config.navigation_delay, config.fetch_timeout())
    }

    pub async fn fetch(
        &self,
        session: &dyn BrowserSession,
        url: &str,
    ) -> Result<Document, NavigationError> {
        let delay = self.navigation_delay.sample();
        if !delay.is_zero() {
            debug!(url = %url, delay_ms = delay.as_millis() as u64, "Waiting before navigation");
            sleep(delay).await;
        }

        session.navigate(url, self.timeout).await
    }
}
