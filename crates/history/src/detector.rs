//! Duplicate event detection.
//!
//! The same sheet is often exported more than once. A new event is a duplicate
//! of a stored one when both fall on the same date, list the same team names,
//! and every team's total agrees within an absolute tolerance.

use chrono::NaiveDate;
use reconcile_core::config::DedupConfig;
use reconcile_core::{EventFingerprint, EventId, Result, TeamId};
use reconcile_engine::Reconciliation;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Read side of the persistence collaborator.
pub trait EventLookup {
    /// Stored events dated exactly `date`.
    fn lookup_events_on_date(&self, date: NaiveDate) -> Result<Vec<EventId>>;

    /// Stored events dated within `[start, end]`.
    fn lookup_events_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EventId>>;

    /// Per-team event totals of one stored event.
    fn fetch_event_totals(&self, id: EventId) -> Result<BTreeMap<TeamId, Decimal>>;
}

/// Write side of the persistence collaborator.
pub trait EventSink {
    /// Store a reconciled event atomically and return its id.
    fn store_event(&mut self, reconciliation: &Reconciliation) -> Result<EventId>;
}

/// Finds a stored event equivalent to a candidate fingerprint.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    tolerance: Decimal,
    end_date: Option<NaiveDate>,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

impl DuplicateDetector {
    /// Create a detector from configuration.
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            tolerance: config.total_tolerance.abs(),
            end_date: None,
        }
    }

    /// Search up to `end_date` instead of the candidate's date only.
    pub fn with_end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = end_date;
        self
    }

    /// First stored event matching the candidate, if any.
    pub fn find_duplicate(
        &self,
        candidate: &EventFingerprint,
        history: &dyn EventLookup,
    ) -> Result<Option<EventId>> {
        let ids = match self.end_date {
            Some(end) if end > candidate.date => history.lookup_events_between(candidate.date, end)?,
            _ => history.lookup_events_on_date(candidate.date)?,
        };
        debug!(date = %candidate.date, stored = ids.len(), "checking stored events for duplicates");

        for id in ids {
            let stored = history.fetch_event_totals(id)?;
            if self.matches(candidate, &stored) {
                debug!(event_id = id, "duplicate found");
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Same team names and every total within tolerance.
    pub fn matches(&self, candidate: &EventFingerprint, stored: &BTreeMap<TeamId, Decimal>) -> bool {
        let stored_names: BTreeSet<&str> = stored.keys().map(TeamId::as_str).collect();
        let candidate_names: BTreeSet<&str> = candidate.team_names.iter().map(String::as_str).collect();
        if stored_names != candidate_names {
            return false;
        }

        candidate.per_team_total.iter().all(|(team, total)| {
            stored
                .get(team)
                .is_some_and(|other| (*total - *other).abs() <= self.tolerance)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::Error;
    use rust_decimal_macros::dec;

    /// In-memory history keyed by event id.
    #[derive(Default)]
    struct MemoryHistory {
        events: Vec<(EventId, NaiveDate, BTreeMap<TeamId, Decimal>)>,
    }

    impl MemoryHistory {
        fn add(&mut self, id: EventId, date: NaiveDate, rows: &[(&str, Decimal)]) {
            let totals = rows.iter().map(|(t, v)| (TeamId::from(*t), *v)).collect();
            self.events.push((id, date, totals));
        }
    }

    impl EventLookup for MemoryHistory {
        fn lookup_events_on_date(&self, date: NaiveDate) -> Result<Vec<EventId>> {
            self.lookup_events_between(date, date)
        }

        fn lookup_events_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EventId>> {
            Ok(self
                .events
                .iter()
                .filter(|(_, d, _)| *d >= start && *d <= end)
                .map(|(id, _, _)| *id)
                .collect())
        }

        fn fetch_event_totals(&self, id: EventId) -> Result<BTreeMap<TeamId, Decimal>> {
            self.events
                .iter()
                .find(|(i, _, _)| *i == id)
                .map(|(_, _, t)| t.clone())
                .ok_or_else(|| Error::database(format!("no event {id}")))
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn make_fingerprint(day: u32, rows: &[(&str, Decimal)]) -> EventFingerprint {
        EventFingerprint::new(
            date(day),
            rows.iter().map(|(t, v)| (TeamId::from(*t), *v)).collect(),
        )
    }

    #[test]
    fn test_duplicate_within_tolerance() {
        let mut history = MemoryHistory::default();
        history.add(7, date(15), &[("A", dec!(1200.00)), ("B", dec!(950.50))]);

        let candidate = make_fingerprint(15, &[("A", dec!(1200.01)), ("B", dec!(950.50))]);
        let found = DuplicateDetector::default()
            .find_duplicate(&candidate, &history)
            .unwrap();
        assert_eq!(found, Some(7));
    }

    #[test]
    fn test_total_beyond_tolerance() {
        let mut history = MemoryHistory::default();
        history.add(7, date(15), &[("A", dec!(1200)), ("B", dec!(950))]);

        let candidate = make_fingerprint(15, &[("A", dec!(1200.02)), ("B", dec!(950))]);
        let found = DuplicateDetector::default()
            .find_duplicate(&candidate, &history)
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_team_set_mismatch() {
        let mut history = MemoryHistory::default();
        history.add(7, date(15), &[("A", dec!(1200)), ("B", dec!(950))]);

        let candidate = make_fingerprint(15, &[("A", dec!(1200)), ("C", dec!(950))]);
        assert_eq!(
            DuplicateDetector::default().find_duplicate(&candidate, &history).unwrap(),
            None
        );

        let fewer = make_fingerprint(15, &[("A", dec!(1200))]);
        assert_eq!(
            DuplicateDetector::default().find_duplicate(&fewer, &history).unwrap(),
            None
        );
    }

    #[test]
    fn test_other_date_ignored() {
        let mut history = MemoryHistory::default();
        history.add(7, date(16), &[("A", dec!(1200))]);

        let candidate = make_fingerprint(15, &[("A", dec!(1200))]);
        let detector = DuplicateDetector::default();
        assert_eq!(detector.find_duplicate(&candidate, &history).unwrap(), None);

        let ranged = detector.with_end_date(Some(date(20)));
        assert_eq!(ranged.find_duplicate(&candidate, &history).unwrap(), Some(7));
    }

    #[test]
    fn test_first_match_returned() {
        let mut history = MemoryHistory::default();
        history.add(3, date(15), &[("A", dec!(100))]);
        history.add(4, date(15), &[("A", dec!(500))]);
        history.add(5, date(15), &[("A", dec!(500))]);

        let candidate = make_fingerprint(15, &[("A", dec!(500))]);
        assert_eq!(
            DuplicateDetector::default().find_duplicate(&candidate, &history).unwrap(),
            Some(4)
        );
    }

    #[test]
    fn test_team_order_does_not_matter() {
        let mut history = MemoryHistory::default();
        history.add(9, date(15), &[("B", dec!(950)), ("A", dec!(1200)), ("C", dec!(10))]);

        let detector = DuplicateDetector::default();
        let orders: [[(&str, Decimal); 3]; 3] = [
            [("A", dec!(1200)), ("B", dec!(950)), ("C", dec!(10))],
            [("C", dec!(10)), ("A", dec!(1200)), ("B", dec!(950))],
            [("B", dec!(950)), ("C", dec!(10)), ("A", dec!(1200))],
        ];
        for rows in orders {
            let candidate = make_fingerprint(15, &rows);
            assert_eq!(detector.find_duplicate(&candidate, &history).unwrap(), Some(9));
        }
    }
}
