//! Core data types for the score reconciliation system.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};

/// Auction round number, 1-based.
pub type RoundIndex = u8;

/// Identifier of a stored event.
pub type EventId = i64;

/// Multiplier awarded to the first `count_at_2_5` slots.
#[inline]
pub fn rate_2_5() -> Decimal {
    Decimal::new(25, 1)
}

/// Multiplier awarded to the next `count_at_2_0` slots.
#[inline]
pub fn rate_2_0() -> Decimal {
    Decimal::new(20, 1)
}

/// Multiplier awarded to the next `count_at_1_5` slots.
#[inline]
pub fn rate_1_5() -> Decimal {
    Decimal::new(15, 1)
}

/// Multiplier for every slot past the elevated quota.
#[inline]
pub fn rate_1_0() -> Decimal {
    Decimal::ONE
}

/// Team name, unique within one event's roster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(String);

impl TeamId {
    /// Create a team id from a name. The name is taken as-is.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TeamId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TeamId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scored categories of one event, in the order they are played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Vybor,
    Chisla,
    Pref,
    Pairs,
    Razobl,
    Auction,
    Mot,
}

impl Category {
    /// All categories in game order.
    pub const ALL: [Category; 7] = [
        Category::Vybor,
        Category::Chisla,
        Category::Pref,
        Category::Pairs,
        Category::Razobl,
        Category::Auction,
        Category::Mot,
    ];

    /// Categories played before the auction; they seed the running totals.
    pub const BEFORE_AUCTION: [Category; 5] = [
        Category::Vybor,
        Category::Chisla,
        Category::Pref,
        Category::Pairs,
        Category::Razobl,
    ];

    /// Short lowercase name, also used as the storage column key.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Vybor => "vybor",
            Category::Chisla => "chisla",
            Category::Pref => "pref",
            Category::Pairs => "pairs",
            Category::Razobl => "razobl",
            Category::Auction => "auction",
            Category::Mot => "mot",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many teams receive each elevated multiplier in one auction round.
///
/// Supplied per event from the event metadata. Slots past the elevated ones
/// are worth 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuota {
    pub count_at_2_5: u8,
    pub count_at_2_0: u8,
    pub count_at_1_5: u8,
    /// Number of leading slots in which a tie is a genuine ambiguity.
    pub escalation_window: u8,
}

impl Default for RateQuota {
    fn default() -> Self {
        Self {
            count_at_2_5: 1,
            count_at_2_0: 1,
            count_at_1_5: 1,
            escalation_window: 3,
        }
    }
}

impl RateQuota {
    /// Check every count is 1 or 2 and the window is 3 or 5.
    pub fn validate(&self) -> Result<()> {
        for (name, count) in [
            ("count_at_2_5", self.count_at_2_5),
            ("count_at_2_0", self.count_at_2_0),
            ("count_at_1_5", self.count_at_1_5),
        ] {
            if !(1..=2).contains(&count) {
                return Err(Error::quota_config(format!(
                    "{name} must be 1 or 2, got {count}"
                )));
            }
        }
        if self.escalation_window != 3 && self.escalation_window != 5 {
            return Err(Error::quota_config(format!(
                "escalation_window must be 3 or 5, got {}",
                self.escalation_window
            )));
        }
        Ok(())
    }

    /// Multiplier of the slot at 0-based position `slot`.
    pub fn slot_rate(&self, slot: usize) -> Decimal {
        let top = usize::from(self.count_at_2_5);
        let second = top + usize::from(self.count_at_2_0);
        let third = second + usize::from(self.count_at_1_5);
        if slot < top {
            rate_2_5()
        } else if slot < second {
            rate_2_0()
        } else if slot < third {
            rate_1_5()
        } else {
            rate_1_0()
        }
    }

    /// Multipliers of `len` consecutive slots starting at `start`.
    pub fn slot_rates(&self, start: usize, len: usize) -> Vec<Decimal> {
        (start..start + len).map(|slot| self.slot_rate(slot)).collect()
    }

    /// Whether the slot at `slot` lies inside the escalation window.
    #[inline]
    pub fn in_window(&self, slot: usize) -> bool {
        slot < usize::from(self.escalation_window)
    }
}

/// One team's observed bid and points in one auction round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundBid {
    pub team: TeamId,
    pub round: RoundIndex,
    /// Amount wagered; more negative is the stronger bid by default.
    pub bid: Decimal,
    /// Score earned in the round, as recorded.
    pub points: Decimal,
}

impl RoundBid {
    /// What the round adds to the team's running total.
    #[inline]
    pub fn contribution(&self) -> Decimal {
        self.bid + self.points
    }
}

/// How a reconstructed rate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Single team in its slot.
    Slot,
    /// Tied group sharing the mean of its slots.
    Averaged,
    /// Answered by the escalation collaborator.
    Escalated,
    /// Read from the sheet, which recorded every rate of the round.
    Recorded,
}

impl RateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RateSource::Slot => "slot",
            RateSource::Averaged => "averaged",
            RateSource::Escalated => "escalated",
            RateSource::Recorded => "recorded",
        }
    }
}

/// Reconstructed multiplier for one team in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateAssignment {
    pub team: TeamId,
    pub round: RoundIndex,
    /// `None` until the reconstructor (or an escalation answer) fills it in.
    pub rate: Option<Decimal>,
    pub source: Option<RateSource>,
}

impl RateAssignment {
    /// Create an unresolved assignment.
    pub fn unresolved(team: TeamId, round: RoundIndex) -> Self {
        Self {
            team,
            round,
            rate: None,
            source: None,
        }
    }

    /// Fill in the rate. A resolved assignment is never overwritten.
    pub fn resolve(&mut self, rate: Decimal, source: RateSource) -> Result<()> {
        if self.rate.is_some() {
            return Err(Error::data(format!(
                "rate for team '{}' in round {} assigned twice",
                self.team, self.round
            )));
        }
        self.rate = Some(rate);
        self.source = Some(source);
        Ok(())
    }

    /// Whether a rate has been assigned.
    pub fn is_resolved(&self) -> bool {
        self.rate.is_some()
    }
}

/// Category made of numbered tasks plus a recorded sum (chisla, razobl, mot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScores {
    pub tasks: Vec<Decimal>,
    /// Recorded `Сумма` column.
    pub total: Decimal,
}

impl TaskScores {
    /// Sum of the task columns.
    pub fn task_sum(&self) -> Decimal {
        self.tasks.iter().copied().sum()
    }
}

/// Preferans: seven tasks plus points, penalty and bonus columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefScores {
    pub tasks: Vec<Decimal>,
    pub points: Decimal,
    pub penalty: Decimal,
    pub bonus: Decimal,
    pub total: Decimal,
}

/// One auction round of one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRound {
    pub bid: Decimal,
    pub points: Decimal,
    /// Recorded multiplier, when the sheet has one.
    #[serde(default)]
    pub rate: Option<Decimal>,
}

/// Auction category: bid/points per round plus the recorded grand total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionScores {
    pub rounds: Vec<AuctionRound>,
    pub total: Decimal,
}

impl AuctionScores {
    /// Sum of bid + points over all rounds.
    pub fn contribution_sum(&self) -> Decimal {
        self.rounds.iter().map(|r| r.bid + r.points).sum()
    }
}

/// Everything recorded for one team in one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSheet {
    pub vybor: Decimal,
    pub chisla: TaskScores,
    pub pref: PrefScores,
    pub pairs: Decimal,
    pub razobl: TaskScores,
    pub auction: AuctionScores,
    pub mot: TaskScores,
}

impl TeamSheet {
    /// Recorded total of one category.
    pub fn category_total(&self, category: Category) -> Decimal {
        match category {
            Category::Vybor => self.vybor,
            Category::Chisla => self.chisla.total,
            Category::Pref => self.pref.total,
            Category::Pairs => self.pairs,
            Category::Razobl => self.razobl.total,
            Category::Auction => self.auction.total,
            Category::Mot => self.mot.total,
        }
    }

    /// Score carried into the first auction round.
    pub fn total_before_auction(&self) -> Decimal {
        Category::BEFORE_AUCTION
            .iter()
            .map(|c| self.category_total(*c))
            .sum()
    }

    /// Sum of all category totals.
    pub fn event_total(&self) -> Decimal {
        Category::ALL.iter().map(|c| self.category_total(*c)).sum()
    }
}

/// One event as supplied by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub date: NaiveDate,
    /// Roster in sheet order, duplicate-free.
    pub teams: Vec<TeamId>,
    pub sheets: BTreeMap<TeamId, TeamSheet>,
    pub quota: RateQuota,
    /// "Общая таблица" per-category columns; empty when the sheet has none.
    #[serde(default)]
    pub overall: BTreeMap<TeamId, BTreeMap<Category, Decimal>>,
}

impl EventRecord {
    /// Sheet of one team.
    pub fn sheet(&self, team: &TeamId) -> Result<&TeamSheet> {
        self.sheets
            .get(team)
            .ok_or_else(|| Error::missing_team(team, "the event sheets"))
    }

    /// Number of auction rounds, taken from the first team on the roster.
    pub fn auction_rounds(&self) -> Result<usize> {
        match self.teams.first() {
            Some(team) => Ok(self.sheet(team)?.auction.rounds.len()),
            None => Ok(0),
        }
    }

    /// Bids of every roster team in one round (1-based), in roster order.
    pub fn round_bids(&self, round: RoundIndex) -> Result<Vec<RoundBid>> {
        let idx = usize::from(round)
            .checked_sub(1)
            .ok_or_else(|| Error::data("auction rounds are numbered from 1"))?;

        self.teams
            .iter()
            .map(|team| {
                let entry = self
                    .sheet(team)?
                    .auction
                    .rounds
                    .get(idx)
                    .ok_or_else(|| Error::missing_team(team, format!("auction round {round}")))?;
                Ok(RoundBid {
                    team: team.clone(),
                    round,
                    bid: entry.bid,
                    points: entry.points,
                })
            })
            .collect()
    }

    /// Per-team recorded totals of one category.
    pub fn category_totals(&self, category: Category) -> Result<BTreeMap<TeamId, Decimal>> {
        self.teams
            .iter()
            .map(|team| Ok((team.clone(), self.sheet(team)?.category_total(category))))
            .collect()
    }
}

/// Derived identity of an event, compared against stored events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFingerprint {
    pub date: NaiveDate,
    pub team_names: BTreeSet<String>,
    pub per_team_total: BTreeMap<TeamId, Decimal>,
}

impl EventFingerprint {
    /// Build from a date and per-team totals.
    pub fn new(date: NaiveDate, per_team_total: BTreeMap<TeamId, Decimal>) -> Self {
        let team_names = per_team_total
            .keys()
            .map(|t| t.as_str().to_string())
            .collect();
        Self {
            date,
            team_names,
            per_team_total,
        }
    }

    /// Fingerprint of a fully known event: each team's total over all categories.
    pub fn from_event(event: &EventRecord) -> Result<Self> {
        let totals = event
            .teams
            .iter()
            .map(|team| Ok((team.clone(), event.sheet(team)?.event_total())))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self::new(event.date, totals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_tasks(tasks: &[Decimal], total: Decimal) -> TaskScores {
        TaskScores {
            tasks: tasks.to_vec(),
            total,
        }
    }

    fn make_sheet(rounds: &[(Decimal, Decimal)]) -> TeamSheet {
        TeamSheet {
            vybor: dec!(10),
            chisla: make_tasks(&[dec!(5), dec!(5)], dec!(10)),
            pref: PrefScores {
                tasks: vec![dec!(0); 7],
                points: dec!(30),
                penalty: dec!(-10),
                bonus: dec!(0),
                total: dec!(20),
            },
            pairs: dec!(15),
            razobl: make_tasks(&[dec!(25)], dec!(25)),
            auction: AuctionScores {
                rounds: rounds
                    .iter()
                    .map(|(bid, points)| AuctionRound {
                        bid: *bid,
                        points: *points,
                        rate: None,
                    })
                    .collect(),
                total: rounds.iter().map(|(b, p)| b + p).sum(),
            },
            mot: make_tasks(&[dec!(100)], dec!(100)),
        }
    }

    #[test]
    fn test_quota_validation() {
        assert!(RateQuota::default().validate().is_ok());

        let bad_count = RateQuota {
            count_at_2_0: 3,
            ..Default::default()
        };
        assert!(matches!(bad_count.validate(), Err(Error::QuotaConfig(_))));

        let bad_window = RateQuota {
            escalation_window: 4,
            ..Default::default()
        };
        assert!(matches!(bad_window.validate(), Err(Error::QuotaConfig(_))));
    }

    #[test]
    fn test_slot_rates() {
        let quota = RateQuota {
            count_at_2_5: 2,
            count_at_2_0: 1,
            count_at_1_5: 2,
            escalation_window: 5,
        };
        assert_eq!(
            quota.slot_rates(0, 7),
            vec![dec!(2.5), dec!(2.5), dec!(2.0), dec!(1.5), dec!(1.5), dec!(1.0), dec!(1.0)]
        );
        assert!(quota.in_window(4));
        assert!(!quota.in_window(5));
    }

    #[test]
    fn test_assignment_resolves_once() {
        let mut assignment = RateAssignment::unresolved(TeamId::from("A"), 1);
        assert!(!assignment.is_resolved());
        assignment.resolve(dec!(2.5), RateSource::Slot).unwrap();
        assert!(assignment.resolve(dec!(1.0), RateSource::Slot).is_err());
        assert_eq!(assignment.rate, Some(dec!(2.5)));
    }

    #[test]
    fn test_sheet_totals() {
        let sheet = make_sheet(&[(dec!(-100), dec!(250)), (dec!(0), dec!(0))]);
        assert_eq!(sheet.total_before_auction(), dec!(80));
        assert_eq!(sheet.auction.contribution_sum(), dec!(150));
        assert_eq!(sheet.event_total(), dec!(330));
    }

    #[test]
    fn test_round_bids_reports_missing_round() {
        let a = TeamId::from("A");
        let b = TeamId::from("B");
        let mut sheets = BTreeMap::new();
        sheets.insert(a.clone(), make_sheet(&[(dec!(-100), dec!(250)), (dec!(0), dec!(0))]));
        sheets.insert(b.clone(), make_sheet(&[(dec!(-50), dec!(0))]));
        let event = EventRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            teams: vec![a, b.clone()],
            sheets,
            quota: RateQuota::default(),
            overall: BTreeMap::new(),
        };

        assert_eq!(event.auction_rounds().unwrap(), 2);
        assert_eq!(event.round_bids(1).unwrap().len(), 2);
        match event.round_bids(2) {
            Err(Error::MissingTeam { team, .. }) => assert_eq!(team, b),
            other => panic!("expected missing team, got {other:?}"),
        }
    }

    #[test]
    fn test_fingerprint_from_event() {
        let a = TeamId::from("A");
        let mut sheets = BTreeMap::new();
        sheets.insert(a.clone(), make_sheet(&[(dec!(-100), dec!(250))]));
        let event = EventRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            teams: vec![a.clone()],
            sheets,
            quota: RateQuota::default(),
            overall: BTreeMap::new(),
        };
        let fp = EventFingerprint::from_event(&event).unwrap();
        assert_eq!(fp.team_names.len(), 1);
        assert_eq!(fp.per_team_total[&a], dec!(330));
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::Razobl.as_str(), "razobl");
        assert_eq!(Category::Auction.to_string(), "auction");
    }
}
