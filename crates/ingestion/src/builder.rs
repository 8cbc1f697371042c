//! Builds typed event records from extracted events.
//!
//! Every roster team must appear in every category, with the expected number
//! of task columns; anything else is rejected before reconciliation starts.

use reconcile_core::{Category, Error, EventRecord, Result, TeamId, TeamSheet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::extracted::ExtractedEvent;
use crate::normalize::normalize_team_name;

/// Expected column counts of one event sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLayout {
    pub chisla_tasks: usize,
    pub pref_tasks: usize,
    pub razobl_tasks: usize,
    pub auction_rounds: usize,
    pub mot_tasks: usize,
}

impl Default for EventLayout {
    fn default() -> Self {
        Self {
            chisla_tasks: 5,
            pref_tasks: 7,
            razobl_tasks: 4,
            auction_rounds: 4,
            mot_tasks: 3,
        }
    }
}

/// Converts `ExtractedEvent`s into `EventRecord`s.
#[derive(Debug, Clone, Default)]
pub struct EventBuilder {
    layout: EventLayout,
}

impl EventBuilder {
    /// Create a builder for the given layout.
    pub fn new(layout: EventLayout) -> Self {
        Self { layout }
    }

    /// Build a typed record, normalizing every team name.
    pub fn build(&self, extracted: ExtractedEvent) -> Result<EventRecord> {
        let teams = normalize_roster(&extracted.teams)?;

        let vybor = keyed(&teams, Category::Vybor.as_str(), extracted.vybor)?;
        let chisla = keyed(&teams, Category::Chisla.as_str(), extracted.chisla)?;
        let pref = keyed(&teams, Category::Pref.as_str(), extracted.pref)?;
        let pairs = keyed(&teams, Category::Pairs.as_str(), extracted.pairs)?;
        let razobl = keyed(&teams, Category::Razobl.as_str(), extracted.razobl)?;
        let auction = keyed(&teams, Category::Auction.as_str(), extracted.auction)?;
        let mot = keyed(&teams, Category::Mot.as_str(), extracted.mot)?;

        let mut sheets = BTreeMap::new();
        for team in &teams {
            let sheet = TeamSheet {
                vybor: take(&vybor, team)?,
                chisla: take(&chisla, team)?,
                pref: take(&pref, team)?,
                pairs: take(&pairs, team)?,
                razobl: take(&razobl, team)?,
                auction: take(&auction, team)?,
                mot: take(&mot, team)?,
            };
            self.check_layout(team, &sheet)?;
            sheets.insert(team.clone(), sheet);
        }

        let overall = if extracted.overall.is_empty() {
            BTreeMap::new()
        } else {
            let overall = keyed(&teams, "the overall table", extracted.overall)?;
            for (team, row) in &overall {
                if let Some(missing) = Category::ALL.iter().find(|c| !row.contains_key(*c)) {
                    return Err(Error::data(format!(
                        "overall table row of '{team}' lacks the {missing} column"
                    )));
                }
            }
            overall
        };

        debug!(
            date = %extracted.date,
            teams = teams.len(),
            has_overall = !overall.is_empty(),
            "built event record"
        );

        Ok(EventRecord {
            date: extracted.date,
            teams,
            sheets,
            quota: extracted.quota,
            overall,
        })
    }

    /// Check column counts of one team's sheet.
    fn check_layout(&self, team: &TeamId, sheet: &TeamSheet) -> Result<()> {
        let counts = [
            (Category::Chisla, sheet.chisla.tasks.len(), self.layout.chisla_tasks),
            (Category::Pref, sheet.pref.tasks.len(), self.layout.pref_tasks),
            (Category::Razobl, sheet.razobl.tasks.len(), self.layout.razobl_tasks),
            (Category::Mot, sheet.mot.tasks.len(), self.layout.mot_tasks),
        ];
        for (category, got, expected) in counts {
            if got != expected {
                return Err(Error::data(format!(
                    "{category} of '{team}' has {got} task columns, expected {expected}"
                )));
            }
        }

        let rounds = sheet.auction.rounds.len();
        if rounds < self.layout.auction_rounds {
            return Err(Error::missing_team(
                team,
                format!("auction round {}", rounds + 1),
            ));
        }
        if rounds > self.layout.auction_rounds {
            return Err(Error::data(format!(
                "auction of '{team}' has {rounds} rounds, expected {}",
                self.layout.auction_rounds
            )));
        }
        Ok(())
    }
}

/// Normalize the roster and reject empty or repeated names.
fn normalize_roster(raw: &[String]) -> Result<Vec<TeamId>> {
    if raw.is_empty() {
        return Err(Error::data("event has no teams"));
    }

    let mut seen = BTreeSet::new();
    let mut teams = Vec::with_capacity(raw.len());
    for name in raw {
        let normalized = normalize_team_name(name);
        if normalized.is_empty() {
            return Err(Error::data("roster contains an empty team name"));
        }
        if !seen.insert(normalized.clone()) {
            return Err(Error::data(format!("team '{normalized}' appears twice in the roster")));
        }
        teams.push(TeamId::new(normalized));
    }
    Ok(teams)
}

/// Re-key a per-team map by normalized name and check it covers the roster exactly.
fn keyed<T>(roster: &[TeamId], part: &str, raw: BTreeMap<String, T>) -> Result<BTreeMap<TeamId, T>> {
    let mut out = BTreeMap::new();
    for (name, value) in raw {
        let team = TeamId::new(normalize_team_name(&name));
        if !roster.contains(&team) {
            return Err(Error::data(format!("{part} lists unknown team '{team}'")));
        }
        if out.insert(team.clone(), value).is_some() {
            return Err(Error::data(format!("{part} lists team '{team}' twice")));
        }
    }

    if let Some(missing) = roster.iter().find(|t| !out.contains_key(*t)) {
        return Err(Error::missing_team(missing, part));
    }
    Ok(out)
}

fn take<T: Clone>(map: &BTreeMap<TeamId, T>, team: &TeamId) -> Result<T> {
    map.get(team)
        .cloned()
        .ok_or_else(|| Error::missing_team(team, "the event sheets"))
}
