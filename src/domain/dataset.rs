//! Deduplicating dataset partitions and the mutable ingestion state

use std::collections::HashSet;

use super::listing::{ListingId, OutcomeCategory};
use super::vehicle_record::{MergeKey, VehicleRecord};

/// Output partition a concluded listing lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Sold,
    Referred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    Appended,
    Duplicate,
}

/// Append-only record collection keyed by [`MergeKey`]
#[derive(Debug, Clone)]
pub struct Dataset {
    partition: Partition,
    records: Vec<VehicleRecord>,
    keys: HashSet<MergeKey>,
}

impl Dataset {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            records: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Wrap records loaded from storage; their keys seed the duplicate check
    pub fn from_records(partition: Partition, records: Vec<VehicleRecord>) -> Self {
        let keys = records.iter().map(VehicleRecord::merge_key).collect();
        Self {
            partition,
            records,
            keys,
        }
    }

    /// Append `record` unless a record with the same key is already present
    pub fn merge(&mut self, record: VehicleRecord) -> MergeDecision {
        if self.keys.insert(record.merge_key()) {
            self.records.push(record);
            MergeDecision::Appended
        } else {
            MergeDecision::Duplicate
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn records(&self) -> &[VehicleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One row of the auxiliary link log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLogEntry {
    pub url: ListingId,
    pub outcome: OutcomeCategory,
}

/// Working set of one run: pending identifiers, both partitions and the log.
///
/// Only the batch coordinator mutates it, between batches.
#[derive(Debug, Clone)]
pub struct IngestionState {
    pub pending: Vec<ListingId>,
    pub sold: Dataset,
    pub referred: Dataset,
    pub link_log: Vec<LinkLogEntry>,
}

impl Default for IngestionState {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            sold: Dataset::new(Partition::Sold),
            referred: Dataset::new(Partition::Referred),
            link_log: Vec::new(),
        }
    }
}

impl IngestionState {
    pub fn with_pending(pending: Vec<ListingId>) -> Self {
        Self {
            pending,
            ..Self::default()
        }
    }

    pub fn dataset_mut(&mut self, partition: Partition) -> &mut Dataset {
        match partition {
            Partition::Sold => &mut self.sold,
            Partition::Referred => &mut self.referred,
        }
    }

    /// Drop `id` from the pending set and record how it concluded
    pub fn mark_resolved(&mut self, id: &ListingId, outcome: OutcomeCategory) {
        self.pending.retain(|pending| pending != id);
        self.link_log.push(LinkLogEntry {
            url: id.clone(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vehicle_record::{columns, FieldValue};

    fn record(vin: &str, date: &str) -> VehicleRecord {
        VehicleRecord::from_fields([
            (columns::VIN, FieldValue::text(vin)),
            (columns::DATE, FieldValue::text(date)),
        ])
    }

    #[test]
    fn same_key_is_appended_once() {
        let mut dataset = Dataset::new(Partition::Sold);

        assert_eq!(dataset.merge(record("VIN1", "2024-05-01")), MergeDecision::Appended);
        assert_eq!(dataset.merge(record("VIN1", "2024-05-01")), MergeDecision::Duplicate);
        assert_eq!(dataset.merge(record("VIN1", "2024-06-01")), MergeDecision::Appended);
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn loaded_records_block_duplicates() {
        let mut dataset = Dataset::from_records(Partition::Referred, vec![record("VIN9", "2023-01-02")]);

        assert_eq!(dataset.merge(record("VIN9", "2023-01-02")), MergeDecision::Duplicate);
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn resolving_removes_every_copy_from_pending() {
        let id = ListingId::from("/lot/1");
        let mut state = IngestionState::with_pending(vec![
            id.clone(),
            ListingId::from("/lot/2"),
            id.clone(),
        ]);

        state.mark_resolved(&id, OutcomeCategory::Cancelled);

        assert_eq!(state.pending, vec![ListingId::from("/lot/2")]);
        assert_eq!(state.link_log.len(), 1);
        assert_eq!(state.link_log[0].outcome, OutcomeCategory::Cancelled);
    }
}
