//! Configuration structures for the score reconciliation system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rate reconstruction and checksum validation.
    pub reconcile: ReconcileConfig,
    /// Duplicate detection.
    pub dedup: DedupConfig,
    /// Event history database.
    pub database: DatabaseConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject values no event could be reconciled with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.reconcile;
        if r.checksum_slack.is_sign_negative() {
            return Err(Error::config("reconcile.checksum_slack must not be negative"));
        }
        if r.base_score_step <= Decimal::ZERO {
            return Err(Error::config("reconcile.base_score_step must be positive"));
        }
        if r.base_score_max < Decimal::ZERO {
            return Err(Error::config("reconcile.base_score_max must not be negative"));
        }
        if r.rate_min <= Decimal::ZERO || r.rate_min > r.rate_max {
            return Err(Error::config(format!(
                "reconcile.rate_min ({}) must be positive and not above rate_max ({})",
                r.rate_min, r.rate_max
            )));
        }
        if self.dedup.total_tolerance.is_sign_negative() {
            return Err(Error::config("dedup.total_tolerance must not be negative"));
        }
        if self.database.path.trim().is_empty() {
            return Err(Error::config("database.path must not be empty"));
        }
        Ok(())
    }
}

/// Which bids win priority in an auction round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidPriority {
    /// Lowest (most negative) bid first.
    #[default]
    Ascending,
    /// Highest bid first.
    Descending,
}

impl BidPriority {
    /// Order two bids so that the winning bid comes first.
    #[inline]
    pub fn compare(self, a: &Decimal, b: &Decimal) -> Ordering {
        match self {
            BidPriority::Ascending => a.cmp(b),
            BidPriority::Descending => b.cmp(a),
        }
    }
}

/// What to do with tied teams inside the escalation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiePolicy {
    /// Every member gets the mean of the slots the group spans.
    #[default]
    Average,
    /// Ask the escalation collaborator for each member's rate.
    Escalate,
    /// Reject the event.
    Reject,
}

/// Reconstruction and validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Bid ordering.
    pub bid_priority: BidPriority,
    /// Tie handling inside the escalation window.
    pub tie_policy: TiePolicy,
    /// Only non-zero checksum delta accepted (either sign).
    pub checksum_slack: Decimal,
    /// Base scores are multiples of this step.
    pub base_score_step: Decimal,
    /// Largest valid base score.
    pub base_score_max: Decimal,
    /// Lowest rate an escalation answer may carry.
    pub rate_min: Decimal,
    /// Highest rate an escalation answer may carry.
    pub rate_max: Decimal,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            bid_priority: BidPriority::Ascending,
            tie_policy: TiePolicy::Average,
            checksum_slack: Decimal::from(5),
            base_score_step: Decimal::from(100),
            base_score_max: Decimal::from(1500),
            rate_min: Decimal::ONE,
            rate_max: Decimal::new(25, 1),
        }
    }
}

/// Duplicate detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Absolute tolerance on per-team totals.
    pub total_tolerance: Decimal,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            total_tolerance: Decimal::new(1, 2),
        }
    }
}

/// Event history database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "score_history.db".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.reconcile.checksum_slack, dec!(5));
        assert_eq!(config.reconcile.rate_max, dec!(2.5));
        assert_eq!(config.dedup.total_tolerance, dec!(0.01));
        assert_eq!(config.reconcile.tie_policy, TiePolicy::Average);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [reconcile]
            bid_priority = "descending"
            tie_policy = "escalate"
            checksum_slack = 10

            [database]
            path = "history.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.reconcile.bid_priority, BidPriority::Descending);
        assert_eq!(config.reconcile.tie_policy, TiePolicy::Escalate);
        assert_eq!(config.reconcile.checksum_slack, dec!(10));
        assert_eq!(config.reconcile.base_score_step, dec!(100));
        assert_eq!(config.database.path, "history.db");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_rate_bounds() {
        let result = Config::from_toml_str(
            r#"
            [reconcile]
            rate_min = "3"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bid_priority_compare() {
        assert_eq!(BidPriority::Ascending.compare(&dec!(-200), &dec!(-100)), Ordering::Less);
        assert_eq!(BidPriority::Descending.compare(&dec!(-200), &dec!(-100)), Ordering::Greater);
    }
}
