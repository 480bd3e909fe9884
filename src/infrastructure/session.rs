//! Session provisioning
//!
//! Every fetch attempt runs in its own isolated session with a browser
//! identity drawn at random from the configured pool. Sessions are never
//! shared between attempts. This module holds the provider traits and the
//! plain HTTP backend; the rendering backend lives in `chrome_session`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use tracing::{debug, trace};

use crate::domain::Document;
use crate::infrastructure::config::CrawlingConfig;

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("Navigation to {url} timed out after {timeout_ms} ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status}: {url}")]
    Status { url: String, status: u16 },

    #[error("Browser failed on {url}: {message}")]
    Browser { url: String, message: String },

    #[error("Failed to create session: {message}")]
    Session { message: String },
}

impl NavigationError {
    pub fn timeout(url: &str, timeout: Duration) -> Self {
        Self::Timeout {
            url: url.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn browser(url: &str, message: impl ToString) -> Self {
        Self::Browser {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }
}

/// Fixed pool of realistic browser identity strings
#[derive(Debug, Clone)]
pub struct IdentityPool {
    identities: Vec<String>,
}

impl IdentityPool {
    pub fn new(identities: impl IntoIterator<Item = String>) -> Result<Self, NavigationError> {
        let identities: Vec<String> = identities
            .into_iter()
            .filter(|identity| !identity.trim().is_empty())
            .collect();
        if identities.is_empty() {
            return Err(NavigationError::session("identity pool is empty"));
        }
        Ok(Self { identities })
    }

    /// Uniformly random identity
    pub fn pick(&self) -> &str {
        &self.identities[fastrand::usize(..self.identities.len())]
    }
}

/// One isolated browsing context
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Identity string the session presents
    fn identity(&self) -> &str;

    /// Load `url` and return its markup, failing on timeout, transport
    /// failure or a non-success status
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Document, NavigationError>;

    /// Tear down whatever the session holds open
    async fn close(&self) {}
}

/// Source of fresh sessions.
///
/// Callers must hand every acquired session back through `release`, on the
/// success path and on every failure path.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn BrowserSession>, NavigationError>;

    async fn release(&self, session: Box<dyn BrowserSession>);
}

/// Sessions backed by a dedicated `reqwest` client each
#[derive(Debug, Clone)]
pub struct HttpSessionProvider {
    identities: IdentityPool,
    accept_language: String,
}

impl HttpSessionProvider {
    pub fn new(identities: IdentityPool, accept_language: impl Into<String>) -> Self {
        Self {
            identities,
            accept_language: accept_language.into(),
        }
    }

    pub fn from_config(config: &CrawlingConfig) -> Result<Self, NavigationError> {
        let identities = IdentityPool::new(config.user_agents.iter().cloned())?;
        Ok(Self::new(identities, config.accept_language.clone()))
    }

    fn build_client(&self, identity: &str) -> Result<Client, NavigationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        if let Ok(language) = HeaderValue::from_str(&self.accept_language) {
            headers.insert(header::ACCEPT_LANGUAGE, language);
        }

        ClientBuilder::new()
            .user_agent(identity)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| NavigationError::session(format!("failed to build HTTP client: {e}")))
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn acquire(&self) -> Result<Box<dyn BrowserSession>, NavigationError> {
        let identity = self.identities.pick().to_string();
        let client = self.build_client(&identity)?;
        trace!(identity = %identity, "Session acquired");
        Ok(Box::new(HttpSession { client, identity }))
    }

    async fn release(&self, session: Box<dyn BrowserSession>) {
        trace!(identity = %session.identity(), "Session released");
        drop(session);
    }
}

/// A client with its own cookie store, bound to one identity
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    identity: String,
}

#[async_trait]
impl BrowserSession for HttpSession {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Document, NavigationError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| transport_error(url, timeout, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(NavigationError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let final_url = response.url().to_string();
            let html = response
                .text()
                .await
                .map_err(|e| transport_error(url, timeout, e))?;
            debug!(url = %url, bytes = html.len(), "Page loaded");
            Ok::<_, NavigationError>(Document::new(final_url, html))
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| NavigationError::timeout(url, timeout))?
    }
}

fn transport_error(url: &str, timeout: Duration, source: reqwest::Error) -> NavigationError {
    if source.is_timeout() {
        NavigationError::timeout(url, timeout)
    } else {
        NavigationError::Transport {
            url: url.to_string(),
            source,
        }
    }
}
