//! Escalation collaborator for ties no rule can settle.
//!
//! `resolve` is called synchronously and blocks the reconciliation until it
//! answers. Returning `Ok(None)` declines, which rejects the event.

use reconcile_core::{Result, RoundIndex, TeamId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Supplies a rate for one team in one round, within `[min, max]`.
pub trait Escalation {
    fn resolve(
        &mut self,
        team: &TeamId,
        round: RoundIndex,
        min: Decimal,
        max: Decimal,
    ) -> Result<Option<Decimal>>;
}

/// Declines every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineEscalation;

impl Escalation for DeclineEscalation {
    fn resolve(
        &mut self,
        _team: &TeamId,
        _round: RoundIndex,
        _min: Decimal,
        _max: Decimal,
    ) -> Result<Option<Decimal>> {
        Ok(None)
    }
}

/// Answers supplied up front, keyed by team and round.
#[derive(Debug, Clone, Default)]
pub struct PresetEscalation {
    answers: BTreeMap<(TeamId, RoundIndex), Decimal>,
}

impl PresetEscalation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an answer.
    pub fn with_answer(mut self, team: impl Into<TeamId>, round: RoundIndex, rate: Decimal) -> Self {
        self.answers.insert((team.into(), round), rate);
        self
    }
}

impl Escalation for PresetEscalation {
    fn resolve(
        &mut self,
        team: &TeamId,
        round: RoundIndex,
        _min: Decimal,
        _max: Decimal,
    ) -> Result<Option<Decimal>> {
        Ok(self.answers.get(&(team.clone(), round)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decline() {
        let mut escalation = DeclineEscalation;
        let answer = escalation
            .resolve(&TeamId::from("A"), 1, dec!(1.0), dec!(2.5))
            .unwrap();
        assert_eq!(answer, None);
    }

    #[test]
    fn test_preset_answers() {
        let mut escalation = PresetEscalation::new()
            .with_answer("A", 2, dec!(2.5))
            .with_answer("B", 2, dec!(2.0));

        let a = escalation.resolve(&TeamId::from("A"), 2, dec!(1.0), dec!(2.5)).unwrap();
        let c = escalation.resolve(&TeamId::from("A"), 3, dec!(1.0), dec!(2.5)).unwrap();
        assert_eq!(a, Some(dec!(2.5)));
        assert_eq!(c, None);
    }
}
