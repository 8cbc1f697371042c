//! Event ingestion for the score reconciliation system.
//!
//! This crate handles:
//! - Reading events in the extraction collaborator's JSON shape
//! - Team-name normalization
//! - Roster and per-category completeness checks
//! - Building typed `EventRecord`s

pub mod builder;
pub mod extracted;
pub mod normalize;

pub use builder::{EventBuilder, EventLayout};
pub use extracted::ExtractedEvent;
pub use normalize::normalize_team_name;
