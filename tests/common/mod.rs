//! Shared fixtures for pipeline tests: canned listing pages and a scripted,
//! network-free session provider.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sold_car_tracker::application::{BatchCoordinator, RetryOrchestrator};
use sold_car_tracker::domain::{Document, ListingId};
use sold_car_tracker::infrastructure::record_store::CheckpointStore;
use sold_car_tracker::infrastructure::{
    BrowserSession, DelayRange, DetailExtractor, NavigationError, PageFetcher, ParsingConfig,
    SessionProvider, StateClassifier,
};
use url::Url;

pub const BASE_URL: &str = "https://www.grays.com";

/// Canned reply to one navigation
#[derive(Debug, Clone)]
pub enum Reply {
    Page(String),
    Timeout,
    Status(u16),
}

/// Serves scripted replies per URL.
///
/// Each navigation consumes the next reply for its URL; the last reply
/// repeats once the script runs out. Unscripted URLs time out.
#[derive(Default)]
pub struct ScriptedSessions {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    navigations: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, url: impl Into<String>, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.into(), replies.into_iter().collect());
    }

    /// Script a listing by identifier, resolved against [`BASE_URL`]
    pub fn script_listing(&self, id: &str, replies: impl IntoIterator<Item = Reply>) {
        self.script(listing_url(id), replies);
    }

    /// Hold every navigation open for `latency` before replying
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Most navigations ever in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| seen.as_str() == url)
            .count()
    }

    fn next_reply(&self, url: &str) -> Reply {
        self.navigations.lock().unwrap().push(url.to_string());
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Timeout),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Timeout),
            None => Reply::Timeout,
        }
    }
}

struct ScriptedSession {
    site: Arc<ScriptedSessions>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    fn identity(&self) -> &str {
        "scripted-agent"
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Document, NavigationError> {
        let current = self.site.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let latency = *self.site.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.site.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.site.next_reply(url) {
            Reply::Page(html) => Ok(Document::new(url, html)),
            Reply::Timeout => Err(NavigationError::timeout(url, timeout)),
            Reply::Status(status) => Err(NavigationError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Handle used as the `SessionProvider` so the script stays observable
#[derive(Clone)]
pub struct ScriptedProvider(pub Arc<ScriptedSessions>);

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn acquire(&self) -> Result<Box<dyn BrowserSession>, NavigationError> {
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            site: Arc::clone(&self.0),
        }))
    }

    async fn release(&self, _session: Box<dyn BrowserSession>) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn listing_url(id: &str) -> String {
    ListingId::from(id).navigation_url(&base_url())
}

pub fn base_url() -> Url {
    Url::parse(BASE_URL).unwrap()
}

/// Resolver over the scripted sessions with the given delays
pub fn resolver(
    sessions: &Arc<ScriptedSessions>,
    attempt_delay: DelayRange,
    navigation_delay: DelayRange,
) -> RetryOrchestrator {
    RetryOrchestrator::new(
        Arc::new(ScriptedProvider(Arc::clone(sessions))),
        PageFetcher::new(navigation_delay, Duration::from_secs(5)),
        StateClassifier::new(&ParsingConfig::default()).unwrap(),
        attempt_delay,
        base_url(),
    )
}

pub fn coordinator(
    sessions: &Arc<ScriptedSessions>,
    store: Arc<dyn CheckpointStore>,
    batch_size: usize,
    max_attempts: u32,
) -> BatchCoordinator {
    let parsing = ParsingConfig::default();
    let resolver = resolver(sessions, DelayRange::ZERO, DelayRange::ZERO);
    BatchCoordinator::new(
        resolver,
        DetailExtractor::new(&parsing).unwrap(),
        store,
        batch_size,
        max_attempts,
    )
}

/// A concluded listing page: sold for `price` (or referred when `price` is
/// `None`), with the given VIN and close date.
pub fn concluded_page(title: &str, vin: &str, close: &str, price: Option<&str>) -> String {
    let status = match price {
        Some(price) => format!(
            r#"<div class="dls-heading-3 currentbid_price">Sold for <span itemprop="price">{price}</span></div>"#
        ),
        None => r#"<div class="dls-heading-3">Referred to vendor</div>"#.to_string(),
    };
    format!(
        r#"<html><head><title>{title} | Grays</title></head><body>
        {status}
        <h1 class="dls-heading-3 lotPageTitle">{title}</h1>
        <div class="dls-text-medium position-relative">Winning bid <a>17 bids</a></div>
        <abbr class="endtime text-decoration-none" title="{close}T19:05:00">closed</abbr>
        <table><tr><td>Location</td><td>Some Suburb, NSW, Australia</td></tr></table>
        <div class="sanitised-markup"><ul>
            <li><strong>VIN:</strong> {vin}</li>
            <li><strong>Fuel Type:</strong> Petrol</li>
            <li><strong>Key No:</strong> 7</li>
        </ul></div>
        </body></html>"#
    )
}

pub fn sold_toyota() -> String {
    concluded_page("2019 Toyota Corolla Ascent", "?", "2024-05-12", Some("$12,345"))
}

pub fn running_page() -> String {
    r#"<html><head><title>Lot</title></head><body>
       <div class="dls-text-medium position-relative">Current Bid $4,100 <a>9 bids</a></div>
       </body></html>"#
        .to_string()
}

pub fn cancelled_page() -> String {
    r#"<html><head><title>Cancelled Lot</title></head><body>
       <div class="salepagetitle"><h1>This lot has been cancelled</h1></div>
       </body></html>"#
        .to_string()
}

pub fn blank_page() -> String {
    "<html><head><title>Loading</title></head><body><div id=app></div></body></html>".to_string()
}
