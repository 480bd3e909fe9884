//! Domain module - listing lifecycle and vehicle dataset types
//!
//! Everything here is free of I/O: identifiers, classification outcomes,
//! the fixed record schema and the deduplicating dataset partitions.

pub mod dataset;
pub mod document;
pub mod listing;
pub mod vehicle_record;

// Re-export commonly used items for convenience
pub use dataset::{Dataset, IngestionState, LinkLogEntry, MergeDecision, Partition};
pub use document::Document;
pub use listing::{Classification, FetchOutcome, ListingId, OutcomeCategory};
pub use vehicle_record::{FieldValue, MergeKey, VehicleRecord, COLUMNS, UNKNOWN};
