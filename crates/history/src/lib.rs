//! Event history for the score reconciliation system.
//!
//! This crate provides:
//! - Duplicate detection against stored events by aggregate-score fingerprint
//! - Lookup and storage interfaces for the persistence collaborator
//! - A SQLite-backed event store
//! - The ingest pipeline: reconcile, check for duplicates, persist

pub mod detector;
pub mod ingest;
pub mod store;

pub use detector::{DuplicateDetector, EventLookup, EventSink};
pub use ingest::{IngestOutcome, Ingestor};
pub use store::{SqliteEventStore, StoredEvent};
