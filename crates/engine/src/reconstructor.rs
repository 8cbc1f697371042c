//! Auction rate reconstruction.
//!
//! The sheet records each team's bid and points per auction round but not the
//! multiplier the team earned. Teams are ranked by bid (winning bid first),
//! then by the score they carried into the round; ranks consume the quota's
//! multiplier slots in order.
//!
//! Teams with identical bid and running total cannot be told apart. Such a
//! group either shares the mean of the slots it spans, is handed to the
//! escalation collaborator, or rejects the event, depending on the tie policy.

use reconcile_core::config::{BidPriority, ReconcileConfig, TiePolicy};
use reconcile_core::diagnostic::join_teams;
use reconcile_core::{
    Diagnostic, Error, RateAssignment, RateQuota, RateSource, Result, RoundBid, RoundIndex,
    TeamId,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::escalation::Escalation;

/// Teams sharing identical bid and running total in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictGroup {
    pub round: RoundIndex,
    pub teams: Vec<TeamId>,
    pub bid: Decimal,
    pub running_total: Decimal,
    /// 0-based slot of the group's first member.
    pub first_slot: usize,
}

impl ConflictGroup {
    /// Number of tied teams.
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Multipliers of the slots the group spans.
    pub fn slot_rates(&self, quota: &RateQuota) -> Vec<Decimal> {
        quota.slot_rates(self.first_slot, self.len())
    }
}

/// Outcome of one round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReconstruction {
    pub round: RoundIndex,
    pub assignments: BTreeMap<TeamId, RateAssignment>,
    /// Tied groups of two or more teams, in rank order.
    pub conflicts: Vec<ConflictGroup>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RoundReconstruction {
    /// Resolved rate of one team.
    pub fn rate(&self, team: &TeamId) -> Option<Decimal> {
        self.assignments.get(team).and_then(|a| a.rate)
    }
}

/// Rebuilds per-team auction multipliers round by round.
#[derive(Debug, Clone)]
pub struct RateReconstructor {
    bid_priority: BidPriority,
    tie_policy: TiePolicy,
    rate_min: Decimal,
    rate_max: Decimal,
    base_score_step: Decimal,
    base_score_max: Decimal,
}

impl Default for RateReconstructor {
    fn default() -> Self {
        Self::new(&ReconcileConfig::default())
    }
}

impl RateReconstructor {
    /// Create a reconstructor from configuration.
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            bid_priority: config.bid_priority,
            tie_policy: config.tie_policy,
            rate_min: config.rate_min,
            rate_max: config.rate_max,
            base_score_step: config.base_score_step,
            base_score_max: config.base_score_max,
        }
    }

    /// Reconstruct the rates of one round.
    ///
    /// `running_totals` holds the score each roster team carries into the
    /// round and must list exactly the teams in `bids`. On success every team's
    /// total is advanced by its bid plus points; on error it is left untouched.
    pub fn reconstruct(
        &self,
        round: RoundIndex,
        bids: &[RoundBid],
        running_totals: &mut BTreeMap<TeamId, Decimal>,
        quota: &RateQuota,
        escalation: &mut dyn Escalation,
    ) -> Result<RoundReconstruction> {
        check_round_roster(round, bids, running_totals)?;

        let groups = self.partition(round, bids, running_totals);
        let mut assignments: BTreeMap<TeamId, RateAssignment> = bids
            .iter()
            .map(|b| (b.team.clone(), RateAssignment::unresolved(b.team.clone(), round)))
            .collect();
        let mut conflicts = Vec::new();
        let mut diagnostics = Vec::new();

        for group in groups {
            let rates = group.slot_rates(quota);
            let uniform = rates.iter().all(|r| *r == rates[0]);

            if group.len() == 1 || uniform {
                for team in &group.teams {
                    assign(&mut assignments, team, rates[0], RateSource::Slot)?;
                }
            } else if quota.in_window(group.first_slot) {
                self.resolve_conflict(&group, &rates, &mut assignments, &mut diagnostics, escalation)?;
            } else {
                let rate = mean(&rates);
                for team in &group.teams {
                    assign(&mut assignments, team, rate, RateSource::Averaged)?;
                }
                diagnostics.push(Diagnostic::TieAveraged {
                    round,
                    teams: group.teams.clone(),
                    rate,
                });
            }

            if group.len() > 1 {
                conflicts.push(group);
            }
        }

        if let Some(unresolved) = assignments.values().find(|a| !a.is_resolved()) {
            return Err(Error::data(format!(
                "team '{}' left without a rate in round {round}",
                unresolved.team
            )));
        }

        for bid in bids {
            let rate = assignments[&bid.team].rate.unwrap_or(Decimal::ONE);
            if let Some(diag) = self.check_base_score(bid, rate)? {
                diagnostics.push(diag);
            }
        }

        for bid in bids {
            if let Some(total) = running_totals.get_mut(&bid.team) {
                *total += bid.contribution();
            }
        }

        for diag in &diagnostics {
            warn!(round, "{diag}");
        }
        debug!(
            round,
            teams = bids.len(),
            conflicts = conflicts.len(),
            "reconstructed auction round"
        );

        Ok(RoundReconstruction {
            round,
            assignments,
            conflicts,
            diagnostics,
        })
    }

    /// Rank teams and split the ranking into groups of identical (bid, total).
    fn partition(
        &self,
        round: RoundIndex,
        bids: &[RoundBid],
        running_totals: &BTreeMap<TeamId, Decimal>,
    ) -> Vec<ConflictGroup> {
        let mut ranked: Vec<(&RoundBid, Decimal)> = bids
            .iter()
            .map(|b| (b, running_totals.get(&b.team).copied().unwrap_or_default()))
            .collect();
        ranked.sort_by(|(a, a_total), (b, b_total)| {
            self.bid_priority
                .compare(&a.bid, &b.bid)
                .then_with(|| a_total.cmp(b_total))
                .then_with(|| a.team.cmp(&b.team))
        });

        let mut groups: Vec<ConflictGroup> = Vec::new();
        for (slot, (bid, total)) in ranked.into_iter().enumerate() {
            let tied = groups
                .last()
                .is_some_and(|g| g.bid == bid.bid && g.running_total == total);
            if let (true, Some(group)) = (tied, groups.last_mut()) {
                group.teams.push(bid.team.clone());
                continue;
            }
            groups.push(ConflictGroup {
                round,
                teams: vec![bid.team.clone()],
                bid: bid.bid,
                running_total: total,
                first_slot: slot,
            });
        }
        groups
    }

    /// Apply the tie policy to a group inside the escalation window.
    fn resolve_conflict(
        &self,
        group: &ConflictGroup,
        rates: &[Decimal],
        assignments: &mut BTreeMap<TeamId, RateAssignment>,
        diagnostics: &mut Vec<Diagnostic>,
        escalation: &mut dyn Escalation,
    ) -> Result<()> {
        match self.tie_policy {
            TiePolicy::Average => {
                let rate = mean(rates);
                for team in &group.teams {
                    assign(assignments, team, rate, RateSource::Averaged)?;
                }
                diagnostics.push(Diagnostic::TieAveraged {
                    round: group.round,
                    teams: group.teams.clone(),
                    rate,
                });
            }
            TiePolicy::Escalate => {
                debug!(
                    round = group.round,
                    teams = %join_teams(&group.teams),
                    "escalating tied group"
                );
                for team in &group.teams {
                    let answer = escalation
                        .resolve(team, group.round, self.rate_min, self.rate_max)?
                        .ok_or_else(|| Error::UnresolvedConflict {
                            round: group.round,
                            teams: join_teams(&group.teams),
                        })?;
                    if answer < self.rate_min || answer > self.rate_max {
                        return Err(Error::escalation(format!(
                            "rate {answer} for team '{team}' in round {} is outside [{}, {}]",
                            group.round, self.rate_min, self.rate_max
                        )));
                    }
                    assign(assignments, team, answer, RateSource::Escalated)?;
                }
            }
            TiePolicy::Reject => {
                return Err(Error::UnresolvedConflict {
                    round: group.round,
                    teams: join_teams(&group.teams),
                });
            }
        }
        Ok(())
    }

    /// Check that `points / rate` is a valid base score.
    pub fn check_base_score(&self, bid: &RoundBid, rate: Decimal) -> Result<Option<Diagnostic>> {
        let base_score = bid
            .points
            .checked_div(rate)
            .ok_or_else(|| Error::data(format!("rate {rate} of team '{}' cannot divide", bid.team)))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        let valid = base_score >= Decimal::ZERO
            && base_score <= self.base_score_max
            && (base_score % self.base_score_step).is_zero();

        if valid {
            Ok(None)
        } else {
            Ok(Some(Diagnostic::Reconstruction {
                team: bid.team.clone(),
                round: bid.round,
                points: bid.points,
                rate,
                base_score,
            }))
        }
    }
}

/// Bids must cover the running-total roster exactly, once per team.
fn check_round_roster(
    round: RoundIndex,
    bids: &[RoundBid],
    running_totals: &BTreeMap<TeamId, Decimal>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for bid in bids {
        if bid.round != round {
            return Err(Error::data(format!(
                "bid of team '{}' belongs to round {}, not {round}",
                bid.team, bid.round
            )));
        }
        if !running_totals.contains_key(&bid.team) {
            return Err(Error::data(format!(
                "round {round} has a bid from team '{}' not on the roster",
                bid.team
            )));
        }
        if !seen.insert(&bid.team) {
            return Err(Error::data(format!(
                "team '{}' bids twice in round {round}",
                bid.team
            )));
        }
    }
    if let Some(missing) = running_totals.keys().find(|t| !seen.contains(t)) {
        return Err(Error::missing_team(missing, format!("auction round {round}")));
    }
    Ok(())
}

fn assign(
    assignments: &mut BTreeMap<TeamId, RateAssignment>,
    team: &TeamId,
    rate: Decimal,
    source: RateSource,
) -> Result<()> {
    assignments
        .get_mut(team)
        .ok_or_else(|| Error::missing_team(team, "the round assignments"))?
        .resolve(rate, source)
}

/// Size-weighted mean of the spanned slots.
fn mean(rates: &[Decimal]) -> Decimal {
    let sum: Decimal = rates.iter().copied().sum();
    (sum / Decimal::from(rates.len())).normalize()
}
