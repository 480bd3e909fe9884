//! Batch coordination and merge
//!
//! The pending list is cut into fixed-size batches in list order. Listings in
//! a batch are resolved concurrently; the next batch starts only after every
//! listing of the current one has an outcome and the state is checkpointed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::application::retry_orchestrator::RetryOrchestrator;
use crate::domain::vehicle_record::columns;
use crate::domain::{
    Document, FetchOutcome, FieldValue, IngestionState, ListingId, MergeDecision, OutcomeCategory,
    Partition,
};
use crate::infrastructure::parsing::DetailExtractor;
use crate::infrastructure::record_store::CheckpointStore;

/// Counters for one coordinator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub running: usize,
    pub cancelled: usize,
    pub referred: usize,
    pub sold: usize,
    pub undetermined: usize,
    pub errors: usize,
    pub sold_appended: usize,
    pub referred_appended: usize,
    pub duplicates: usize,
    pub extraction_failures: usize,
    pub batches: usize,
}

impl RunSummary {
    fn count(&mut self, category: OutcomeCategory) {
        match category {
            OutcomeCategory::Running => self.running += 1,
            OutcomeCategory::Cancelled => self.cancelled += 1,
            OutcomeCategory::Referred => self.referred += 1,
            OutcomeCategory::Sold => self.sold += 1,
            OutcomeCategory::Undetermined => self.undetermined += 1,
            OutcomeCategory::Error => self.errors += 1,
        }
    }

    /// Listings that left the pending list
    pub fn resolved(&self) -> usize {
        self.cancelled + self.referred + self.sold
    }

    /// Listings dispatched in total
    pub fn processed(&self) -> usize {
        self.resolved() + self.running + self.undetermined + self.errors
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} in {} batches: {} sold (+{} new), {} referred (+{} new), {} cancelled, \
             {} running, {} undetermined, {} failed; {} duplicates, {} extraction failures",
            self.processed(),
            self.batches,
            self.sold,
            self.sold_appended,
            self.referred,
            self.referred_appended,
            self.cancelled,
            self.running,
            self.undetermined,
            self.errors,
            self.duplicates,
            self.extraction_failures,
        )
    }
}

pub struct BatchCoordinator {
    resolver: RetryOrchestrator,
    extractor: DetailExtractor,
    store: Arc<dyn CheckpointStore>,
    batch_size: usize,
    max_attempts: u32,
    progress: Option<ProgressBar>,
}

impl BatchCoordinator {
    pub fn new(
        resolver: RetryOrchestrator,
        extractor: DetailExtractor,
        store: Arc<dyn CheckpointStore>,
        batch_size: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            resolver,
            extractor,
            store,
            batch_size: batch_size.max(1),
            max_attempts,
            progress: None,
        }
    }

    /// Advance `progress` by each batch's size as batches complete
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Resolve every pending listing of `state`, checkpointing after each batch.
    ///
    /// A failed checkpoint aborts the run; per-listing failures never do.
    pub async fn run(&self, state: &mut IngestionState) -> Result<RunSummary> {
        let identifiers = state.pending.clone();
        let total_batches = identifiers.len().div_ceil(self.batch_size);
        let mut summary = RunSummary::default();

        info!(
            listings = identifiers.len(),
            batches = total_batches,
            batch_size = self.batch_size,
            "Starting ingestion"
        );
        if let Some(pb) = &self.progress {
            pb.set_length(identifiers.len() as u64);
            pb.set_position(0);
        }

        for (index, batch) in identifiers.chunks(self.batch_size).enumerate() {
            let outcomes = join_all(batch.iter().map(|id| async move {
                let outcome = self.resolver.resolve(id, self.max_attempts).await;
                (id, outcome)
            }))
            .await;

            for (id, outcome) in outcomes {
                self.apply(state, id, outcome, &mut summary);
            }

            if let Err(e) = self.store.checkpoint(state).await {
                if let Some(pb) = &self.progress {
                    pb.abandon_with_message("checkpoint failed");
                }
                return Err(e).with_context(|| {
                    format!("Checkpoint after batch {} of {total_batches} failed", index + 1)
                });
            }
            summary.batches += 1;
            if let Some(pb) = &self.progress {
                pb.inc(batch.len() as u64);
                pb.set_message(format!("batch {}/{total_batches}", index + 1));
            }

            info!(
                batch = index + 1,
                batches = total_batches,
                pending = state.pending.len(),
                "Batch checkpointed"
            );
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message(summary.to_string());
        }
        info!(%summary, "Ingestion finished");
        Ok(summary)
    }

    fn apply(
        &self,
        state: &mut IngestionState,
        id: &ListingId,
        outcome: FetchOutcome,
        summary: &mut RunSummary,
    ) {
        let category = outcome.category();
        let resolves = outcome.resolves_listing();
        summary.count(category);

        match outcome {
            FetchOutcome::Running => {
                info!(outcome = %category, url = %id, "Still auctioning");
            }
            FetchOutcome::Cancelled => {
                info!(outcome = %category, url = %id, "Auction cancelled");
            }
            FetchOutcome::Referred { document } => {
                info!(outcome = %category, url = %id, "Auction referred");
                self.merge(state, Partition::Referred, id, &document, 0.0, summary);
            }
            FetchOutcome::Sold { document, price } => {
                info!(outcome = %category, url = %id, price = ?price, "Auction sold");
                self.merge(state, Partition::Sold, id, &document, price.unwrap_or(0.0), summary);
            }
            FetchOutcome::Undetermined => {
                warn!(outcome = %category, url = %id, "Status unknown, will retry next run");
            }
            FetchOutcome::Error => {
                error!(outcome = %category, url = %id, attempts = self.max_attempts, "Failed to resolve listing, will retry next run");
            }
        }

        if resolves {
            state.mark_resolved(id, category);
        }
    }

    fn merge(
        &self,
        state: &mut IngestionState,
        partition: Partition,
        id: &ListingId,
        document: &Document,
        price: f64,
        summary: &mut RunSummary,
    ) {
        let record = match self.extractor.extract_document(document) {
            Ok(record) => record
                .with_field(columns::PRICE, FieldValue::Number(price))
                .with_field(columns::URL, FieldValue::text(id.as_str())),
            Err(e) => {
                summary.extraction_failures += 1;
                error!(url = %id, ?partition, error = %e, "Detail extraction failed, record dropped");
                return;
            }
        };

        let key = record.merge_key();
        match state.dataset_mut(partition).merge(record) {
            MergeDecision::Appended => {
                match partition {
                    Partition::Sold => summary.sold_appended += 1,
                    Partition::Referred => summary.referred_appended += 1,
                }
                info!(url = %id, ?partition, vin = %key.vin, date = %key.date, "Record appended");
            }
            MergeDecision::Duplicate => {
                summary.duplicates += 1;
                info!(url = %id, ?partition, vin = %key.vin, date = %key.date, "Duplicate record skipped");
            }
        }
    }
}

/// Per-listing progress on stderr, advanced once per checkpointed batch
pub fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {pos}/{len} listings ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_totals() {
        let mut summary = RunSummary::default();
        for category in [
            OutcomeCategory::Sold,
            OutcomeCategory::Referred,
            OutcomeCategory::Cancelled,
            OutcomeCategory::Running,
            OutcomeCategory::Error,
        ] {
            summary.count(category);
        }

        assert_eq!(summary.resolved(), 3);
        assert_eq!(summary.processed(), 5);
        assert!(summary.to_string().starts_with("processed 5 in 0 batches"));
    }
}
