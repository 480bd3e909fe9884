//! Sold Car Tracker - auction listing classification and incremental ingestion
//!
//! Monitors a set of vehicle auction listings, works out which ones have
//! concluded, extracts vehicle details for sold and referred lots and merges
//! them into deduplicated datasets that are checkpointed after every batch.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

pub use application::{Pipeline, RunSummary};
pub use infrastructure::AppConfig;
