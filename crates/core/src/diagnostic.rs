//! Non-fatal findings collected while reconciling an event.
//!
//! Diagnostics travel with the result instead of being logged into shared
//! state, so callers decide where they go.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Category, RoundIndex, TeamId};

/// A data-quality signal for manual review. Never blocks acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// `points / rate` is not a valid base score.
    Reconstruction {
        team: TeamId,
        round: RoundIndex,
        points: Decimal,
        rate: Decimal,
        base_score: Decimal,
    },
    /// Tied teams shared the mean of the slots they spanned.
    TieAveraged {
        round: RoundIndex,
        teams: Vec<TeamId>,
        rate: Decimal,
    },
    /// The sheet recorded a rate the reconstruction disagrees with; the
    /// recorded rate is kept.
    RecordedRate {
        team: TeamId,
        round: RoundIndex,
        recorded: Decimal,
        reconstructed: Decimal,
    },
    /// Checksum matched only after applying the accepted slack.
    ChecksumSlack {
        team: TeamId,
        category: Category,
        reconstructed: Decimal,
        checksum: Decimal,
        delta: Decimal,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Reconstruction {
                team,
                round,
                points,
                rate,
                base_score,
            } => write!(
                f,
                "round {round}, team '{team}': {points} / {rate} = {base_score} is not a valid base score"
            ),
            Diagnostic::TieAveraged { round, teams, rate } => write!(
                f,
                "round {round}: tied teams {} share averaged rate {rate}",
                join_teams(teams)
            ),
            Diagnostic::RecordedRate {
                team,
                round,
                recorded,
                reconstructed,
            } => write!(
                f,
                "round {round}, team '{team}': sheet records rate {recorded}, \
                 reconstruction gives {reconstructed}; recorded rate kept"
            ),
            Diagnostic::ChecksumSlack {
                team,
                category,
                reconstructed,
                checksum,
                delta,
            } => write!(
                f,
                "{category}, team '{team}': reconstructed {reconstructed} vs checksum {checksum} \
                 accepted with slack (delta {delta})"
            ),
        }
    }
}

/// Join team names as `'A', 'B'`.
pub fn join_teams(teams: &[TeamId]) -> String {
    teams
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
