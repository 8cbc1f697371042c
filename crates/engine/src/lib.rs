//! Score reconciliation engine.
//!
//! This crate handles:
//! - Reconstructing per-round auction rates from bids and running totals
//! - Tie handling and the escalation collaborator
//! - Checksum validation against independently recorded totals
//! - Reconciling a whole event round by round

pub mod escalation;
pub mod reconciler;
pub mod reconstructor;
pub mod validator;

pub use escalation::{DeclineEscalation, Escalation, PresetEscalation};
pub use reconciler::{EventReconciler, Reconciliation};
pub use reconstructor::{ConflictGroup, RateReconstructor, RoundReconstruction};
pub use validator::ConsistencyValidator;
