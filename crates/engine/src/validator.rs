//! Checksum validation.
//!
//! Compares per-team totals computed from the round data against a total the
//! sheet recorded independently. Equality is required, except that a delta of
//! exactly the configured slack (5 by default, either sign) is accepted: the
//! historical sheets round at the 1.25/2.25 multiplier boundary.

use reconcile_core::config::ReconcileConfig;
use reconcile_core::{Category, Diagnostic, Error, Result, TeamId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;

/// Cross-checks reconstructed totals against recorded checksums.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyValidator {
    slack: Decimal,
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self::new(&ReconcileConfig::default())
    }
}

impl ConsistencyValidator {
    /// Create a validator from configuration.
    pub fn new(config: &ReconcileConfig) -> Self {
        Self::with_slack(config.checksum_slack)
    }

    /// Create a validator with an explicit slack.
    pub fn with_slack(slack: Decimal) -> Self {
        Self { slack: slack.abs() }
    }

    /// Validate auction totals.
    pub fn validate(
        &self,
        reconstructed: &BTreeMap<TeamId, Decimal>,
        checksum: &BTreeMap<TeamId, Decimal>,
    ) -> Result<()> {
        self.validate_category(Category::Auction, reconstructed, checksum)
            .map(|_| ())
    }

    /// Validate one category, returning a diagnostic for every slack match.
    ///
    /// Both maps must list the same teams.
    pub fn validate_category(
        &self,
        category: Category,
        reconstructed: &BTreeMap<TeamId, Decimal>,
        checksum: &BTreeMap<TeamId, Decimal>,
    ) -> Result<Vec<Diagnostic>> {
        if let Some(team) = checksum.keys().find(|t| !reconstructed.contains_key(*t)) {
            return Err(Error::missing_team(team, format!("reconstructed {category} totals")));
        }

        let mut diagnostics = Vec::new();
        for (team, value) in reconstructed {
            let recorded = checksum
                .get(team)
                .copied()
                .ok_or_else(|| Error::missing_team(team, format!("{category} checksum totals")))?;
            let delta = *value - recorded;

            if delta.is_zero() {
                continue;
            }
            if delta.abs() != self.slack {
                return Err(Error::Inconsistency {
                    team: team.clone(),
                    category,
                    reconstructed: *value,
                    checksum: recorded,
                    delta,
                });
            }

            let diag = Diagnostic::ChecksumSlack {
                team: team.clone(),
                category,
                reconstructed: *value,
                checksum: recorded,
                delta,
            };
            warn!("{diag}");
            diagnostics.push(diag);
        }
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_totals(rows: &[(&str, Decimal)]) -> BTreeMap<TeamId, Decimal> {
        rows.iter().map(|(t, v)| (TeamId::from(*t), *v)).collect()
    }

    #[test]
    fn test_exact_match() {
        let totals = make_totals(&[("A", dec!(1200)), ("B", dec!(-300))]);
        assert!(ConsistencyValidator::default().validate(&totals, &totals).is_ok());
    }

    #[test]
    fn test_slack_of_five_accepted() {
        let reconstructed = make_totals(&[("A", dec!(1200)), ("B", dec!(400))]);
        let checksum = make_totals(&[("A", dec!(1205)), ("B", dec!(395))]);

        let validator = ConsistencyValidator::default();
        assert!(validator.validate(&reconstructed, &checksum).is_ok());

        let diags = validator
            .validate_category(Category::Auction, &reconstructed, &checksum)
            .unwrap();
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_delta_of_seven_rejected() {
        let reconstructed = make_totals(&[("A", dec!(1200))]);
        let checksum = make_totals(&[("A", dec!(1207))]);

        match ConsistencyValidator::default().validate(&reconstructed, &checksum) {
            Err(Error::Inconsistency {
                team,
                reconstructed,
                checksum,
                delta,
                ..
            }) => {
                assert_eq!(team, TeamId::from("A"));
                assert_eq!(reconstructed, dec!(1200));
                assert_eq!(checksum, dec!(1207));
                assert_eq!(delta, dec!(-7));
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
    }

    #[test]
    fn test_delta_below_slack_rejected() {
        let reconstructed = make_totals(&[("A", dec!(1203))]);
        let checksum = make_totals(&[("A", dec!(1200))]);
        assert!(matches!(
            ConsistencyValidator::default().validate(&reconstructed, &checksum),
            Err(Error::Inconsistency { .. })
        ));
    }

    #[test]
    fn test_zero_slack() {
        let reconstructed = make_totals(&[("A", dec!(105))]);
        let checksum = make_totals(&[("A", dec!(100))]);
        let validator = ConsistencyValidator::with_slack(Decimal::ZERO);
        assert!(validator.validate(&reconstructed, &checksum).is_err());
    }

    #[test]
    fn test_team_sets_must_match() {
        let reconstructed = make_totals(&[("A", dec!(100))]);
        let checksum = make_totals(&[("A", dec!(100)), ("B", dec!(0))]);
        assert!(matches!(
            ConsistencyValidator::default().validate(&reconstructed, &checksum),
            Err(Error::MissingTeam { .. })
        ));
        assert!(matches!(
            ConsistencyValidator::default().validate(&checksum, &reconstructed),
            Err(Error::MissingTeam { .. })
        ));
    }
}
