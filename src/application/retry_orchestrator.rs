//! Per-listing retry loop
//!
//! Each listing walks `Pending -> Attempting(n) -> ... -> Resolved`. Every
//! attempt waits a jittered delay, fetches through a fresh session and
//! classifies the page. Running, cancelled, referred and sold end the loop;
//! navigation failures and undetermined pages use up an attempt.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{Classification, FetchOutcome, ListingId};
use crate::infrastructure::config::DelayRange;
use crate::infrastructure::page_fetcher::PageFetcher;
use crate::infrastructure::parsing::StateClassifier;
use crate::infrastructure::session::{NavigationError, SessionProvider};

/// What one attempt produced
#[derive(Debug)]
pub enum AttemptReport {
    NavigationFailed(NavigationError),
    Classified(FetchOutcome),
}

/// Resolution progress of a single listing
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionState {
    Pending,
    Attempting { attempt: u32 },
    Resolved(FetchOutcome),
}

impl ResolutionState {
    /// Leave `Pending`; with no attempts allowed the listing is resolved as `Error` at once
    #[must_use]
    pub fn begin(self, max_attempts: u32) -> Self {
        match self {
            Self::Pending if max_attempts == 0 => Self::Resolved(FetchOutcome::Error),
            Self::Pending => Self::Attempting { attempt: 1 },
            other => other,
        }
    }

    /// Fold the report of the current attempt into the next state
    #[must_use]
    pub fn on_attempt(self, report: AttemptReport, max_attempts: u32) -> Self {
        let Self::Attempting { attempt } = self else {
            return self;
        };

        match report {
            AttemptReport::Classified(outcome) if outcome.is_terminal() => Self::Resolved(outcome),
            _ if attempt >= max_attempts => Self::Resolved(FetchOutcome::Error),
            _ => Self::Attempting {
                attempt: attempt + 1,
            },
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

pub struct RetryOrchestrator {
    sessions: Arc<dyn SessionProvider>,
    fetcher: PageFetcher,
    classifier: StateClassifier,
    attempt_delay: DelayRange,
    base_url: Url,
}

impl RetryOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        fetcher: PageFetcher,
        classifier: StateClassifier,
        attempt_delay: DelayRange,
        base_url: Url,
    ) -> Self {
        Self {
            sessions,
            fetcher,
            classifier,
            attempt_delay,
            base_url,
        }
    }

    /// Resolve `id` within `max_attempts` attempts.
    ///
    /// Returns `FetchOutcome::Error` when every attempt failed to load the
    /// page or left it undetermined.
    pub async fn resolve(&self, id: &ListingId, max_attempts: u32) -> FetchOutcome {
        let url = id.navigation_url(&self.base_url);
        let mut state = ResolutionState::Pending.begin(max_attempts);

        while let ResolutionState::Attempting { attempt } = state {
            let report = self.attempt(&url, attempt, max_attempts).await;
            state = state.on_attempt(report, max_attempts);
        }

        match state {
            ResolutionState::Resolved(outcome) => outcome,
            _ => FetchOutcome::Error,
        }
    }

    async fn attempt(&self, url: &str, attempt: u32, max_attempts: u32) -> AttemptReport {
        sleep(self.attempt_delay.sample()).await;

        let session = match self.sessions.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!(url = %url, attempt, max_attempts, error = %e, "Could not open session");
                return AttemptReport::NavigationFailed(e);
            }
        };
        let identity = session.identity().to_string();
        let fetched = self.fetcher.fetch(session.as_ref(), url).await;
        self.sessions.release(session).await;

        match fetched {
            Ok(document) => {
                let classification = self.classifier.classify_document(&document);
                if classification == Classification::Undetermined {
                    warn!(url = %url, attempt, max_attempts, "Listing state undetermined");
                } else {
                    debug!(url = %url, attempt, identity = %identity, ?classification, "Listing classified");
                }
                AttemptReport::Classified(FetchOutcome::from_classification(classification, document))
            }
            Err(e) => {
                warn!(url = %url, attempt, max_attempts, identity = %identity, error = %e, "Request failed");
                AttemptReport::NavigationFailed(e)
            }
        }
    }
}
