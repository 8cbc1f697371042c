//! SQLite-backed event store.
//!
//! Totals and rates are stored as decimal text so they round-trip exactly.

use chrono::{NaiveDate, Utc};
use reconcile_core::{Category, Error, EventId, Result, TeamId};
use reconcile_engine::Reconciliation;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::detector::{EventLookup, EventSink};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    date        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_date ON events(date);

CREATE TABLE IF NOT EXISTS event_teams (
    event_id    INTEGER NOT NULL REFERENCES events(id),
    team        TEXT NOT NULL,
    position    INTEGER NOT NULL,
    vybor       TEXT NOT NULL,
    chisla      TEXT NOT NULL,
    pref        TEXT NOT NULL,
    pairs       TEXT NOT NULL,
    razobl      TEXT NOT NULL,
    auction     TEXT NOT NULL,
    mot         TEXT NOT NULL,
    total       TEXT NOT NULL,
    PRIMARY KEY (event_id, team)
);

CREATE TABLE IF NOT EXISTS auction_rounds (
    event_id    INTEGER NOT NULL REFERENCES events(id),
    team        TEXT NOT NULL,
    round       INTEGER NOT NULL,
    bid         TEXT NOT NULL,
    points      TEXT NOT NULL,
    rate        TEXT,
    rate_source TEXT,
    PRIMARY KEY (event_id, team, round)
);
";

/// Summary row of a stored event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub date: NaiveDate,
    /// Roster in sheet order.
    pub teams: Vec<TeamId>,
}

/// Event history in a SQLite database.
pub struct SqliteEventStore {
    conn: Connection,
}

fn db(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| Error::database(format!("bad stored date '{raw}': {e}")))
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    raw.parse::<Decimal>()
        .map_err(|e| Error::database(format!("bad stored number '{raw}': {e}")))
}

impl SqliteEventStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(db)?;
        let store = Self { conn };
        store.init_schema()?;
        info!(path = %path.display(), "opened event store");
        Ok(store)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create tables if they do not exist yet.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA).map_err(db)
    }

    /// All stored events, oldest first.
    pub fn list_events(&self) -> Result<Vec<StoredEvent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, date FROM events ORDER BY date, id")
            .map_err(db)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;

        rows.into_iter()
            .map(|(event_id, date)| {
                Ok(StoredEvent {
                    event_id,
                    date: parse_date(&date)?,
                    teams: self.event_teams(event_id)?,
                })
            })
            .collect()
    }

    /// Delete an event and everything stored with it. Returns whether it existed.
    pub fn remove_event(&mut self, id: EventId) -> Result<bool> {
        let tx = self.conn.transaction().map_err(db)?;
        tx.execute("DELETE FROM auction_rounds WHERE event_id = ?1", params![id])
            .map_err(db)?;
        tx.execute("DELETE FROM event_teams WHERE event_id = ?1", params![id])
            .map_err(db)?;
        let removed = tx
            .execute("DELETE FROM events WHERE id = ?1", params![id])
            .map_err(db)?;
        tx.commit().map_err(db)?;

        if removed > 0 {
            info!(event_id = id, "removed event");
        }
        Ok(removed > 0)
    }

    fn event_teams(&self, id: EventId) -> Result<Vec<TeamId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT team FROM event_teams WHERE event_id = ?1 ORDER BY position")
            .map_err(db)?;
        let teams = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .map_err(db)?
            .map(|r| r.map(TeamId::new))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(teams)
    }

    fn ids_between(&self, start: &str, end: &str) -> Result<Vec<EventId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM events WHERE date >= ?1 AND date <= ?2 ORDER BY id")
            .map_err(db)?;
        let ids = stmt
            .query_map(params![start, end], |row| row.get::<_, i64>(0))
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;
        Ok(ids)
    }
}

impl EventLookup for SqliteEventStore {
    fn lookup_events_on_date(&self, date: NaiveDate) -> Result<Vec<EventId>> {
        let day = date.format(DATE_FORMAT).to_string();
        self.ids_between(&day, &day)
    }

    fn lookup_events_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EventId>> {
        self.ids_between(
            &start.format(DATE_FORMAT).to_string(),
            &end.format(DATE_FORMAT).to_string(),
        )
    }

    fn fetch_event_totals(&self, id: EventId) -> Result<BTreeMap<TeamId, Decimal>> {
        let mut stmt = self
            .conn
            .prepare("SELECT team, total FROM event_teams WHERE event_id = ?1")
            .map_err(db)?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db)?;

        rows.into_iter()
            .map(|(team, total)| Ok((TeamId::new(team), parse_decimal(&total)?)))
            .collect()
    }
}

impl EventSink for SqliteEventStore {
    fn store_event(&mut self, reconciliation: &Reconciliation) -> Result<EventId> {
        let event = &reconciliation.event;
        let tx = self.conn.transaction().map_err(db)?;

        tx.execute(
            "INSERT INTO events (date, created_at) VALUES (?1, ?2)",
            params![
                event.date.format(DATE_FORMAT).to_string(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db)?;
        let event_id = tx.last_insert_rowid();

        for (position, team) in event.teams.iter().enumerate() {
            let sheet = event.sheet(team)?;
            let column = |c: Category| sheet.category_total(c).to_string();
            tx.execute(
                "INSERT INTO event_teams
                 (event_id, team, position, vybor, chisla, pref, pairs, razobl, auction, mot, total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    event_id,
                    team.as_str(),
                    position as i64,
                    column(Category::Vybor),
                    column(Category::Chisla),
                    column(Category::Pref),
                    column(Category::Pairs),
                    column(Category::Razobl),
                    column(Category::Auction),
                    column(Category::Mot),
                    sheet.event_total().to_string(),
                ],
            )
            .map_err(db)?;

            for (idx, entry) in sheet.auction.rounds.iter().enumerate() {
                let round = idx + 1;
                let source = reconciliation
                    .rounds
                    .iter()
                    .find(|r| usize::from(r.round) == round)
                    .and_then(|r| r.assignments.get(team))
                    .and_then(|a| a.source)
                    .map(|s| s.as_str());
                tx.execute(
                    "INSERT INTO auction_rounds
                     (event_id, team, round, bid, points, rate, rate_source)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        event_id,
                        team.as_str(),
                        round as i64,
                        entry.bid.to_string(),
                        entry.points.to_string(),
                        entry.rate.map(|r| r.to_string()),
                        source,
                    ],
                )
                .map_err(db)?;
            }
        }

        tx.commit().map_err(db)?;
        debug!(event_id, date = %event.date, teams = event.teams.len(), "stored event");
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::{
        AuctionRound, AuctionScores, EventRecord, PrefScores, RateQuota, TaskScores, TeamSheet,
    };
    use reconcile_engine::{DeclineEscalation, EventReconciler};
    use rust_decimal_macros::dec;

    fn make_tasks(tasks: &[Decimal]) -> TaskScores {
        TaskScores {
            tasks: tasks.to_vec(),
            total: tasks.iter().copied().sum(),
        }
    }

    fn make_sheet(before: Decimal, bid: Decimal, points: Decimal) -> TeamSheet {
        TeamSheet {
            vybor: before,
            chisla: make_tasks(&[dec!(10), dec!(20)]),
            pref: PrefScores {
                tasks: vec![dec!(0); 7],
                points: dec!(0),
                penalty: dec!(0),
                bonus: dec!(0),
                total: dec!(0),
            },
            pairs: dec!(0),
            razobl: make_tasks(&[dec!(0); 4]),
            auction: AuctionScores {
                total: bid + points,
                rounds: vec![AuctionRound {
                    bid,
                    points,
                    rate: None,
                }],
            },
            mot: make_tasks(&[dec!(0); 3]),
        }
    }

    /// Stored (rate, rate_source) of one team in one round.
    fn stored_rate(
        store: &SqliteEventStore,
        id: EventId,
        team: &str,
        round: i64,
    ) -> Option<(String, String)> {
        store
            .conn
            .query_row(
                "SELECT rate, rate_source FROM auction_rounds
                 WHERE event_id = ?1 AND team = ?2 AND round = ?3",
                params![id, team, round],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .ok()
    }

    fn make_reconciliation(day: u32) -> Reconciliation {
        let rows = [
            ("A", make_sheet(dec!(500), dec!(-200), dec!(500))),
            ("B", make_sheet(dec!(400), dec!(-100), dec!(400))),
        ];
        let event = EventRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            teams: rows.iter().map(|(t, _)| TeamId::from(*t)).collect(),
            sheets: rows
                .into_iter()
                .map(|(t, s)| (TeamId::from(t), s))
                .collect(),
            quota: RateQuota::default(),
            overall: BTreeMap::new(),
        };
        EventReconciler::default()
            .reconcile(&event, &mut DeclineEscalation)
            .unwrap()
    }

    #[test]
    fn test_store_and_fetch_totals() {
        let mut store = SqliteEventStore::open_in_memory().unwrap();
        let reconciliation = make_reconciliation(15);
        let id = store.store_event(&reconciliation).unwrap();

        let totals = store.fetch_event_totals(id).unwrap();
        assert_eq!(totals, reconciliation.fingerprint.per_team_total);
        // A: 500 + 30 + (-200 + 500)
        assert_eq!(totals[&TeamId::from("A")], dec!(830));
    }

    #[test]
    fn test_lookup_by_date() {
        let mut store = SqliteEventStore::open_in_memory().unwrap();
        let first = store.store_event(&make_reconciliation(15)).unwrap();
        let second = store.store_event(&make_reconciliation(18)).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(store.lookup_events_on_date(day).unwrap(), vec![first]);

        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            store.lookup_events_between(day, end).unwrap(),
            vec![first, second]
        );
    }

    #[test]
    fn test_rates_stored_with_source() {
        let mut store = SqliteEventStore::open_in_memory().unwrap();
        let id = store.store_event(&make_reconciliation(15)).unwrap();

        // Lowest bid takes the first slot.
        let (rate, source) = stored_rate(&store, id, "A", 1).unwrap();
        assert_eq!(rate.parse::<Decimal>().unwrap(), dec!(2.5));
        assert_eq!(source, "slot");
        assert!(stored_rate(&store, id, "A", 2).is_none());
    }

    #[test]
    fn test_list_and_remove() {
        let mut store = SqliteEventStore::open_in_memory().unwrap();
        let id = store.store_event(&make_reconciliation(15)).unwrap();

        let events = store.list_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, id);
        assert_eq!(events[0].teams, vec![TeamId::from("A"), TeamId::from("B")]);

        assert!(store.remove_event(id).unwrap());
        assert!(!store.remove_event(id).unwrap());
        assert!(store.list_events().unwrap().is_empty());
        assert!(store.fetch_event_totals(id).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_file_keeps_events() {
        let path = std::env::temp_dir().join(format!("reconcile-store-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let id = {
            let mut store = SqliteEventStore::open(&path).unwrap();
            store.store_event(&make_reconciliation(15)).unwrap()
        };
        let store = SqliteEventStore::open(&path).unwrap();
        assert_eq!(store.list_events().unwrap()[0].event_id, id);

        drop(store);
        let _ = std::fs::remove_file(&path);
    }
}
