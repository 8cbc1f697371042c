//! Ingest pipeline: reconcile an event, look for a stored duplicate, persist.

use chrono::NaiveDate;
use reconcile_core::{Config, EventId, EventRecord, Result};
use reconcile_engine::{Escalation, EventReconciler, Reconciliation};
use tracing::info;

use crate::detector::{DuplicateDetector, EventLookup, EventSink};

/// What happened to one ingested event.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Newly stored under `event_id`.
    Stored {
        event_id: EventId,
        reconciliation: Reconciliation,
    },
    /// Equivalent to an already stored event; nothing was written.
    Duplicate {
        existing: EventId,
        reconciliation: Reconciliation,
    },
}

impl IngestOutcome {
    pub fn reconciliation(&self) -> &Reconciliation {
        match self {
            IngestOutcome::Stored { reconciliation, .. }
            | IngestOutcome::Duplicate { reconciliation, .. } => reconciliation,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate { .. })
    }
}

/// Runs events through reconciliation and duplicate detection into a store.
pub struct Ingestor<S> {
    reconciler: EventReconciler,
    detector: DuplicateDetector,
    store: S,
}

impl<S: EventLookup + EventSink> Ingestor<S> {
    pub fn new(config: &Config, store: S) -> Self {
        Self {
            reconciler: EventReconciler::new(&config.reconcile),
            detector: DuplicateDetector::new(&config.dedup),
            store,
        }
    }

    /// Widen duplicate search up to `end_date`.
    pub fn with_end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.detector = self.detector.with_end_date(end_date);
        self
    }

    /// Ingest one event. Nothing is stored when reconciliation fails.
    pub fn ingest(
        &mut self,
        event: &EventRecord,
        escalation: &mut dyn Escalation,
    ) -> Result<IngestOutcome> {
        let reconciliation = self.reconciler.reconcile(event, escalation)?;

        if let Some(existing) = self
            .detector
            .find_duplicate(&reconciliation.fingerprint, &self.store)?
        {
            info!(date = %event.date, existing, "event already stored, skipping");
            return Ok(IngestOutcome::Duplicate {
                existing,
                reconciliation,
            });
        }

        let event_id = self.store.store_event(&reconciliation)?;
        info!(date = %event.date, event_id, "event stored");
        Ok(IngestOutcome::Stored {
            event_id,
            reconciliation,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
