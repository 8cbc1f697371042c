//! Core types and configuration for the score reconciliation system.
//!
//! This crate provides shared types used across all other crates:
//! - Event, category and auction round records
//! - Rate quota and reconstructed rate assignments
//! - Configuration structures
//! - Common error and diagnostic types

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod types;

pub use config::Config;
pub use diagnostic::Diagnostic;
pub use error::{Error, Result};
pub use types::*;
