//! Rendering sessions on headless Chrome
//!
//! One browser process is launched per provider. Each `acquire` opens a new
//! incognito browser context (separate cookies and storage) with a single
//! page whose user agent comes from the identity pool; `release` closes the
//! page and disposes of the context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::Document;
use crate::infrastructure::config::CrawlingConfig;
use crate::infrastructure::session::{BrowserSession, IdentityPool, NavigationError, SessionProvider};

/// Hides the most common automation fingerprints before any page script runs
const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
";

pub struct ChromeSessionProvider {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    identities: IdentityPool,
    accept_language: String,
}

impl ChromeSessionProvider {
    /// Launch Chrome and start driving its event loop
    pub async fn launch(config: &CrawlingConfig) -> Result<Self, NavigationError> {
        let identities = IdentityPool::new(config.user_agents.iter().cloned())?;

        let mut builder = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run");
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder
            .build()
            .map_err(|e| NavigationError::session(format!("invalid browser configuration: {e}")))?;

        let (browser, mut events) = Browser::launch(browser_config)
            .await
            .map_err(|e| NavigationError::session(format!("failed to launch Chrome: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser event loop stopped");
                    break;
                }
            }
        });

        debug!(headless = config.headless, "Chrome launched");
        Ok(Self {
            browser: Arc::new(browser),
            handler,
            identities,
            accept_language: config.accept_language.clone(),
        })
    }

    async fn open_page(&self, context: &BrowserContextId, identity: &str) -> Result<Page, NavigationError> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context.clone())
            .build()
            .map_err(NavigationError::session)?;
        let page = self
            .browser
            .new_page(target)
            .await
            .map_err(|e| NavigationError::session(format!("failed to open page: {e}")))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(identity)
            .accept_language(self.accept_language.clone())
            .build()
            .map_err(NavigationError::session)?;
        page.execute(user_agent)
            .await
            .map_err(|e| NavigationError::session(format!("failed to set user agent: {e}")))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| NavigationError::session(format!("failed to install page script: {e}")))?;

        Ok(page)
    }

    async fn dispose_context(&self, context: BrowserContextId) {
        if let Err(e) = self
            .browser
            .execute(DisposeBrowserContextParams::new(context))
            .await
        {
            warn!(error = %e, "Failed to dispose browser context");
        }
    }
}

impl Drop for ChromeSessionProvider {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl SessionProvider for ChromeSessionProvider {
    async fn acquire(&self) -> Result<Box<dyn BrowserSession>, NavigationError> {
        let context = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| NavigationError::session(format!("failed to create browser context: {e}")))?
            .result
            .browser_context_id;

        let identity = self.identities.pick().to_string();
        match self.open_page(&context, &identity).await {
            Ok(page) => {
                trace!(identity = %identity, "Browser session acquired");
                Ok(Box::new(ChromeSession {
                    browser: Arc::clone(&self.browser),
                    context,
                    page,
                    identity,
                }))
            }
            Err(e) => {
                self.dispose_context(context).await;
                Err(e)
            }
        }
    }

    async fn release(&self, session: Box<dyn BrowserSession>) {
        trace!(identity = %session.identity(), "Browser session released");
        session.close().await;
    }
}

/// One incognito context holding a single page
pub struct ChromeSession {
    browser: Arc<Browser>,
    context: BrowserContextId,
    page: Page,
    identity: String,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Document, NavigationError> {
        let load = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| NavigationError::browser(url, e))?;
            let html = self
                .page
                .content()
                .await
                .map_err(|e| NavigationError::browser(url, e))?;
            let final_url = self
                .page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string());
            debug!(url = %url, bytes = html.len(), "Page rendered");
            Ok::<_, NavigationError>(Document::new(final_url, html))
        };

        tokio::time::timeout(timeout, load)
            .await
            .map_err(|_| NavigationError::timeout(url, timeout))?
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            warn!(error = %e, "Failed to close page");
        }
        if let Err(e) = self
            .browser
            .execute(DisposeBrowserContextParams::new(self.context.clone()))
            .await
        {
            warn!(error = %e, "Failed to dispose browser context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_chrome_binary_fails_to_launch() {
        let config = CrawlingConfig {
            chrome_executable: Some("/nonexistent/chrome-binary".into()),
            ..CrawlingConfig::default()
        };

        let err = ChromeSessionProvider::launch(&config).await.err().unwrap();

        assert!(matches!(err, NavigationError::Session { .. }));
    }
}
