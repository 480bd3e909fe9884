//! Listing discovery over paginated search results
//!
//! Pages are visited in order until one yields no listing links, a page
//! fails to load, or the page cap is reached.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use scraper::{Html, Selector};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::ListingId;
use crate::infrastructure::config::DiscoveryConfig;
use crate::infrastructure::page_fetcher::PageFetcher;
use crate::infrastructure::parsing::{ParsingConfig, ParsingError, compile_selector};
use crate::infrastructure::record_store::StoreError;
use crate::infrastructure::session::{NavigationError, SessionProvider};

const PAGE_PLACEHOLDER: &str = "{page}";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Discovery is misconfigured: {0}")]
    Parsing(#[from] ParsingError),

    #[error("Failed to persist discovered links: {0}")]
    Store(#[from] StoreError),
}

/// Links found by one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub new_links: Vec<ListingId>,
    pub pages_visited: u32,
}

pub struct LinkDiscovery {
    sessions: Arc<dyn SessionProvider>,
    fetcher: PageFetcher,
    config: DiscoveryConfig,
    link_selector: Selector,
}

impl LinkDiscovery {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        fetcher: PageFetcher,
        config: DiscoveryConfig,
        parsing: &ParsingConfig,
    ) -> Result<Self, DiscoveryError> {
        let link_selector = compile_selector(&parsing.selectors.listing_link)?;
        Ok(Self {
            sessions,
            fetcher,
            config,
            link_selector,
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        self.config
            .search_url_template
            .replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    /// Whether `href` points at a vehicle listing
    pub fn is_listing_link(&self, href: &str) -> bool {
        href.contains("/lot/")
            && self
                .config
                .category_slugs
                .iter()
                .any(|slug| href.contains(slug.as_str()))
    }

    /// Every listing-looking `href` on a result page, in document order
    pub fn extract_links(&self, html: &str) -> Vec<String> {
        Html::parse_document(html)
            .select(&self.link_selector)
            .filter_map(|anchor| anchor.value().attr("href"))
            .map(str::to_string)
            .collect()
    }

    /// Walk the result pages and return links not already in `existing`
    pub async fn discover(&self, existing: &[ListingId]) -> DiscoveryReport {
        let known: HashSet<&str> = existing.iter().map(ListingId::as_str).collect();
        let mut seen = HashSet::new();
        let mut report = DiscoveryReport::default();

        for page in 1..=self.config.max_pages {
            if page > 1 {
                sleep(self.config.page_delay.sample()).await;
            }

            let url = self.page_url(page);
            let links = match self.fetch_page(&url).await {
                Ok(links) => links,
                Err(e) => {
                    warn!(page, error = %e, "Result page failed to load, stopping discovery");
                    break;
                }
            };
            report.pages_visited = page;

            if links.is_empty() {
                info!(page, "No more listing links, stopping discovery");
                break;
            }

            let before = report.new_links.len();
            for href in links {
                if self.is_listing_link(&href) && !known.contains(href.as_str()) && seen.insert(href.clone()) {
                    report.new_links.push(ListingId::from(href));
                }
            }
            debug!(page, found = report.new_links.len() - before, "Scanned result page");
        }

        info!(
            new_links = report.new_links.len(),
            pages = report.pages_visited,
            "Discovery finished"
        );
        report
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<String>, NavigationError> {
        let session = self.sessions.acquire().await?;
        let fetched = self.fetcher.fetch(session.as_ref(), url).await;
        self.sessions.release(session).await;
        Ok(self.extract_links(fetched?.html()))
    }

    /// Sorted union of `existing` and `discovered`, keeping listing links only
    pub fn merge_pending(&self, existing: &[ListingId], discovered: &[ListingId]) -> Vec<ListingId> {
        existing
            .iter()
            .chain(discovered)
            .filter(|id| self.is_listing_link(id.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
