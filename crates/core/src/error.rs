//! Error types for the score reconciliation system.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{Category, RoundIndex, TeamId};

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the score reconciliation system.
///
/// Every variant except `Io`/`Json`/`Toml`/`Database` aborts the whole event:
/// nothing of a failed event is ever persisted.
#[derive(Error, Debug)]
pub enum Error {
    /// A team expected in some part of the event data is absent.
    #[error("Missing team: '{team}' is absent from {context}")]
    MissingTeam { team: TeamId, context: String },

    /// Rate quota outside the validated domain.
    #[error("Quota configuration error: {0}")]
    QuotaConfig(String),

    /// Checksum mismatch beyond the accepted slack.
    #[error(
        "Inconsistency in {category} for team '{team}': reconstructed {reconstructed}, \
         checksum {checksum}, delta {delta}"
    )]
    Inconsistency {
        team: TeamId,
        category: Category,
        reconstructed: Decimal,
        checksum: Decimal,
        delta: Decimal,
    },

    /// Tied teams whose rates could not be resolved.
    #[error("Unresolved conflict in auction round {round}: teams {teams}")]
    UnresolvedConflict { round: RoundIndex, teams: String },

    /// Escalation collaborator failure or out-of-range answer.
    #[error("Escalation error: {0}")]
    Escalation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data error (invalid or malformed data).
    #[error("Data error: {0}")]
    Data(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a missing team error.
    pub fn missing_team(team: &TeamId, context: impl Into<String>) -> Self {
        Error::MissingTeam {
            team: team.clone(),
            context: context.into(),
        }
    }

    /// Create a quota configuration error.
    pub fn quota_config(msg: impl Into<String>) -> Self {
        Error::QuotaConfig(msg.into())
    }

    /// Create an escalation error.
    pub fn escalation(msg: impl Into<String>) -> Self {
        Error::Escalation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Whether this error rejects the event (as opposed to an infrastructure failure).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Error::Io(_) | Error::Json(_) | Error::Toml(_) | Error::Database(_) | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_inconsistency_message_names_everything() {
        let err = Error::Inconsistency {
            team: TeamId::from("Совы"),
            category: Category::Auction,
            reconstructed: dec!(1200),
            checksum: dec!(1207),
            delta: dec!(-7),
        };
        let msg = err.to_string();
        assert!(msg.contains("Совы"));
        assert!(msg.contains("1200"));
        assert!(msg.contains("1207"));
        assert!(msg.contains("-7"));
        assert!(msg.contains("auction"));
    }

    #[test]
    fn test_is_rejection() {
        assert!(Error::quota_config("bad").is_rejection());
        assert!(!Error::database("locked").is_rejection());
    }
}
