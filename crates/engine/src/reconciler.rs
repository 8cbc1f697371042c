//! Whole-event reconciliation.
//!
//! Runs the checks and the auction reconstruction for one event, in order:
//! quota, category task sums, auction rounds, auction grand total, overall
//! table. Any fatal error aborts the event; warnings come back with the result.

use reconcile_core::config::ReconcileConfig;
use reconcile_core::{
    Category, Diagnostic, Error, EventFingerprint, EventRecord, RateAssignment, RateSource,
    Result, RoundBid, RoundIndex, TeamId,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::escalation::Escalation;
use crate::reconstructor::{RateReconstructor, RoundReconstruction};
use crate::validator::ConsistencyValidator;

/// A reconciled event, ready for duplicate detection and storage.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// The input event with every auction rate filled in.
    pub event: EventRecord,
    pub rounds: Vec<RoundReconstruction>,
    /// Per-team sum of bid + points over all auction rounds.
    pub auction_totals: BTreeMap<TeamId, Decimal>,
    pub fingerprint: EventFingerprint,
    /// All warnings, in the order they were raised.
    pub diagnostics: Vec<Diagnostic>,
}

impl Reconciliation {
    /// Rate of one team in one round (1-based).
    pub fn rate(&self, team: &TeamId, round: RoundIndex) -> Option<Decimal> {
        self.rounds
            .iter()
            .find(|r| r.round == round)
            .and_then(|r| r.rate(team))
    }

    /// Whether anything needs manual review.
    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Reconciles events. Holds no per-event state.
#[derive(Debug, Clone, Default)]
pub struct EventReconciler {
    reconstructor: RateReconstructor,
    validator: ConsistencyValidator,
}

impl EventReconciler {
    /// Create a reconciler from configuration.
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            reconstructor: RateReconstructor::new(config),
            validator: ConsistencyValidator::new(config),
        }
    }

    /// Reconcile one event.
    pub fn reconcile(
        &self,
        event: &EventRecord,
        escalation: &mut dyn Escalation,
    ) -> Result<Reconciliation> {
        event.quota.validate()?;
        if event.teams.is_empty() {
            return Err(Error::data("event has no teams"));
        }

        let mut diagnostics = self.check_task_sums(event)?;

        let mut running_totals = event
            .teams
            .iter()
            .map(|team| Ok((team.clone(), event.sheet(team)?.total_before_auction())))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let mut auction_totals: BTreeMap<TeamId, Decimal> =
            event.teams.iter().map(|t| (t.clone(), Decimal::ZERO)).collect();

        let round_count = event.auction_rounds()?;
        let mut rounds = Vec::with_capacity(round_count);
        for idx in 0..round_count {
            let round = RoundIndex::try_from(idx + 1)
                .map_err(|_| Error::data(format!("too many auction rounds: {round_count}")))?;
            let bids = event.round_bids(round)?;

            let outcome = match self.recorded_round(event, round, &bids, &mut running_totals)? {
                Some(recorded) => recorded,
                None => {
                    let mut outcome = self.reconstructor.reconstruct(
                        round,
                        &bids,
                        &mut running_totals,
                        &event.quota,
                        escalation,
                    )?;
                    self.keep_recorded(event, &bids, &mut outcome)?;
                    outcome
                }
            };

            for bid in &bids {
                if let Some(total) = auction_totals.get_mut(&bid.team) {
                    *total += bid.contribution();
                }
            }
            diagnostics.extend(outcome.diagnostics.iter().cloned());
            rounds.push(outcome);
        }

        let recorded_auction = event.category_totals(Category::Auction)?;
        diagnostics.extend(self.validator.validate_category(
            Category::Auction,
            &auction_totals,
            &recorded_auction,
        )?);

        diagnostics.extend(self.check_overall(event)?);

        let reconciled = fill_rates(event, &rounds)?;
        let fingerprint = EventFingerprint::from_event(&reconciled)?;

        info!(
            date = %event.date,
            teams = event.teams.len(),
            rounds = rounds.len(),
            warnings = diagnostics.len(),
            "event reconciled"
        );

        Ok(Reconciliation {
            event: reconciled,
            rounds,
            auction_totals,
            fingerprint,
            diagnostics,
        })
    }

    /// Task columns of chisla, razobl and mot must add up to the recorded sum.
    fn check_task_sums(&self, event: &EventRecord) -> Result<Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        for category in [Category::Chisla, Category::Razobl, Category::Mot] {
            let mut sums = BTreeMap::new();
            let mut recorded = BTreeMap::new();
            for team in &event.teams {
                let sheet = event.sheet(team)?;
                let scores = match category {
                    Category::Chisla => &sheet.chisla,
                    Category::Razobl => &sheet.razobl,
                    _ => &sheet.mot,
                };
                sums.insert(team.clone(), scores.task_sum());
                recorded.insert(team.clone(), scores.total);
            }
            diagnostics.extend(self.validator.validate_category(category, &sums, &recorded)?);
        }
        Ok(diagnostics)
    }

    /// Each "Общая таблица" column must match the category's recorded total.
    fn check_overall(&self, event: &EventRecord) -> Result<Vec<Diagnostic>> {
        if event.overall.is_empty() {
            return Ok(Vec::new());
        }

        let mut diagnostics = Vec::new();
        for category in Category::ALL {
            let recorded = event.category_totals(category)?;
            let column = event
                .teams
                .iter()
                .map(|team| {
                    let value = event
                        .overall
                        .get(team)
                        .and_then(|row| row.get(&category))
                        .copied()
                        .ok_or_else(|| Error::missing_team(team, "the overall table"))?;
                    Ok((team.clone(), value))
                })
                .collect::<Result<BTreeMap<_, _>>>()?;
            diagnostics.extend(self.validator.validate_category(category, &recorded, &column)?);
        }
        debug!(date = %event.date, "overall table matches category totals");
        Ok(diagnostics)
    }

    /// Use the sheet's own rates when it recorded one for every team.
    fn recorded_round(
        &self,
        event: &EventRecord,
        round: RoundIndex,
        bids: &[RoundBid],
        running_totals: &mut BTreeMap<TeamId, Decimal>,
    ) -> Result<Option<RoundReconstruction>> {
        let idx = usize::from(round) - 1;
        let mut recorded = BTreeMap::new();
        for bid in bids {
            match event.sheet(&bid.team)?.auction.rounds[idx].rate {
                Some(rate) if rate > Decimal::ZERO => {
                    recorded.insert(bid.team.clone(), rate);
                }
                Some(rate) => {
                    return Err(Error::data(format!(
                        "recorded rate {rate} of team '{}' in round {round} is not positive",
                        bid.team
                    )))
                }
                None => return Ok(None),
            }
        }

        let mut assignments = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for bid in bids {
            let rate = recorded[&bid.team];
            let mut assignment = RateAssignment::unresolved(bid.team.clone(), round);
            assignment.resolve(rate, RateSource::Recorded)?;
            assignments.insert(bid.team.clone(), assignment);
            if let Some(diag) = self.reconstructor.check_base_score(bid, rate)? {
                diagnostics.push(diag);
            }
            let total = running_totals
                .get_mut(&bid.team)
                .ok_or_else(|| Error::missing_team(&bid.team, "the running totals"))?;
            *total += bid.contribution();
        }

        debug!(round, "auction round rates read from the sheet");
        Ok(Some(RoundReconstruction {
            round,
            assignments,
            conflicts: Vec::new(),
            diagnostics,
        }))
    }

    /// In a round only partly recorded, keep each rate the sheet has and flag
    /// the ones the reconstruction disagrees with.
    fn keep_recorded(
        &self,
        event: &EventRecord,
        bids: &[RoundBid],
        outcome: &mut RoundReconstruction,
    ) -> Result<()> {
        let round = outcome.round;
        let idx = usize::from(round) - 1;
        for bid in bids {
            let Some(recorded) = event.sheet(&bid.team)?.auction.rounds[idx].rate else {
                continue;
            };
            if recorded <= Decimal::ZERO {
                return Err(Error::data(format!(
                    "recorded rate {recorded} of team '{}' in round {round} is not positive",
                    bid.team
                )));
            }

            let reconstructed = outcome.rate(&bid.team);
            if reconstructed == Some(recorded) {
                continue;
            }
            if let Some(reconstructed) = reconstructed {
                let diag = Diagnostic::RecordedRate {
                    team: bid.team.clone(),
                    round,
                    recorded,
                    reconstructed,
                };
                warn!("{diag}");
                outcome.diagnostics.push(diag);
            }
            outcome.diagnostics.retain(
                |d| !matches!(d, Diagnostic::Reconstruction { team, .. } if *team == bid.team),
            );
            if let Some(diag) = self.reconstructor.check_base_score(bid, recorded)? {
                outcome.diagnostics.push(diag);
            }

            let mut assignment = RateAssignment::unresolved(bid.team.clone(), round);
            assignment.resolve(recorded, RateSource::Recorded)?;
            outcome.assignments.insert(bid.team.clone(), assignment);
        }
        Ok(())
    }
}

/// Copy reconstructed rates into the event's auction records.
fn fill_rates(event: &EventRecord, rounds: &[RoundReconstruction]) -> Result<EventRecord> {
    let mut reconciled = event.clone();
    for outcome in rounds {
        let idx = usize::from(outcome.round) - 1;
        for (team, assignment) in &outcome.assignments {
            let entry = reconciled
                .sheets
                .get_mut(team)
                .and_then(|sheet| sheet.auction.rounds.get_mut(idx))
                .ok_or_else(|| Error::missing_team(team, format!("auction round {}", outcome.round)))?;
            entry.rate = assignment.rate;
        }
    }
    Ok(reconciled)
}
