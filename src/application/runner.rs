//! Wiring of configuration, sessions, storage and the pipeline stages

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::batch_coordinator::{BatchCoordinator, RunSummary, progress_bar};
use crate::application::retry_orchestrator::RetryOrchestrator;
use crate::infrastructure::chrome_session::ChromeSessionProvider;
use crate::infrastructure::config::{AppConfig, SessionBackend};
use crate::infrastructure::discovery::{DiscoveryReport, LinkDiscovery};
use crate::infrastructure::page_fetcher::PageFetcher;
use crate::infrastructure::parsing::{DetailExtractor, StateClassifier};
use crate::infrastructure::record_store::{CheckpointStore, FileRecordStore};
use crate::infrastructure::session::{HttpSessionProvider, SessionProvider};

/// Everything a command needs, built once from [`AppConfig`]
pub struct Pipeline {
    config: AppConfig,
    sessions: Arc<dyn SessionProvider>,
    store: FileRecordStore,
}

impl Pipeline {
    /// Live pipeline: sessions from the configured backend, files under the
    /// configured paths
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let sessions: Arc<dyn SessionProvider> = match config.crawling.session_backend {
            SessionBackend::Browser => Arc::new(
                ChromeSessionProvider::launch(&config.crawling)
                    .await
                    .context("Failed to start browser sessions")?,
            ),
            SessionBackend::Http => Arc::new(
                HttpSessionProvider::from_config(&config.crawling)
                    .context("Failed to set up HTTP sessions")?,
            ),
        };
        info!(backend = ?config.crawling.session_backend, "Session provider ready");
        let store = FileRecordStore::new(config.storage.clone());
        Ok(Self::with_parts(config, sessions, store))
    }

    pub fn with_parts(
        config: AppConfig,
        sessions: Arc<dyn SessionProvider>,
        store: FileRecordStore,
    ) -> Self {
        Self {
            config,
            sessions,
            store,
        }
    }

    fn fetcher(&self) -> PageFetcher {
        PageFetcher::from_config(&self.config.crawling)
    }

    fn coordinator(&self) -> Result<BatchCoordinator> {
        let crawling = &self.config.crawling;
        let classifier = StateClassifier::new(&self.config.parsing)?;
        let extractor = DetailExtractor::new(&self.config.parsing)?;
        let resolver = RetryOrchestrator::new(
            Arc::clone(&self.sessions),
            self.fetcher(),
            classifier,
            crawling.attempt_delay,
            crawling.base_url()?,
        );
        let store: Arc<dyn CheckpointStore> = Arc::new(self.store.clone());
        let coordinator = BatchCoordinator::new(
            resolver,
            extractor,
            store,
            crawling.batch_size,
            crawling.max_attempts,
        );
        Ok(if crawling.show_progress {
            coordinator.with_progress(progress_bar())
        } else {
            coordinator
        })
    }

    /// Find new listings and fold them into the persisted pending list
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        let discovery = LinkDiscovery::new(
            Arc::clone(&self.sessions),
            self.fetcher(),
            self.config.discovery.clone(),
            &self.config.parsing,
        )?;

        let existing = self
            .store
            .load_pending()
            .context("Failed to load pending listings")?;
        info!(existing = existing.len(), "Loaded existing listing links");

        let report = discovery.discover(&existing).await;
        if report.new_links.is_empty() {
            info!("No new listing links to add");
            return Ok(report);
        }

        let merged = discovery.merge_pending(&existing, &report.new_links);
        self.store
            .save_pending(&merged)
            .context("Failed to save pending listings")?;
        info!(total = merged.len(), added = report.new_links.len(), "Pending list updated");
        Ok(report)
    }

    /// Resolve the persisted pending list
    pub async fn ingest(&self) -> Result<RunSummary> {
        let mut state = self
            .store
            .load()
            .await
            .context("Failed to load ingestion state")?;

        if state.pending.is_empty() {
            info!("No listings to process");
            return Ok(RunSummary::default());
        }

        self.coordinator()?.run(&mut state).await
    }

    /// Discovery (unless skipped) followed by ingestion
    pub async fn run(&self, skip_discovery: bool) -> Result<RunSummary> {
        if !skip_discovery {
            self.discover().await?;
        }
        self.ingest().await
    }
}
