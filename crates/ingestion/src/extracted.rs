//! The extraction collaborator's plain event record.
//!
//! Category maps are keyed by team name exactly as it appears in the sheet;
//! names are normalized when the record is built into an `EventRecord`.

use chrono::NaiveDate;
use reconcile_core::{AuctionScores, Category, PrefScores, RateQuota, Result, TaskScores};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One event as extracted from a spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEvent {
    pub date: NaiveDate,
    /// Team names in sheet order.
    pub teams: Vec<String>,
    /// Rate quota from the event metadata.
    #[serde(default)]
    pub quota: RateQuota,
    pub vybor: BTreeMap<String, Decimal>,
    pub chisla: BTreeMap<String, TaskScores>,
    pub pref: BTreeMap<String, PrefScores>,
    pub pairs: BTreeMap<String, Decimal>,
    pub razobl: BTreeMap<String, TaskScores>,
    pub auction: BTreeMap<String, AuctionScores>,
    pub mot: BTreeMap<String, TaskScores>,
    /// "Общая таблица" columns per team.
    #[serde(default)]
    pub overall: BTreeMap<String, BTreeMap<Category, Decimal>>,
}

impl ExtractedEvent {
    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_minimal() {
        let json = r#"{
            "date": "2024-03-15",
            "teams": ["A"],
            "vybor": {"A": 10},
            "chisla": {"A": {"tasks": [1, 2, 3, 4, 0], "total": 10}},
            "pref": {"A": {"tasks": [0, 0, 0, 0, 0, 0, 0], "points": 0, "penalty": 0, "bonus": 0, "total": 0}},
            "pairs": {"A": 5},
            "razobl": {"A": {"tasks": [0, 0, 0, 0], "total": 0}},
            "auction": {"A": {"rounds": [{"bid": -200, "points": 500}], "total": 300}},
            "mot": {"A": {"tasks": [0, 0, 0], "total": 0}}
        }"#;
        let event = ExtractedEvent::from_json(json).unwrap();
        assert_eq!(event.teams, vec!["A".to_string()]);
        assert_eq!(event.quota, RateQuota::default());
        assert_eq!(event.auction["A"].rounds[0].bid, dec!(-200));
        assert_eq!(event.auction["A"].rounds[0].rate, None);
        assert!(event.overall.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        let json = r#"{"date": "15.03.2024", "teams": []}"#;
        assert!(ExtractedEvent::from_json(json).is_err());
    }
}
