use anyhow::{Context, Result};
use chrono::NaiveDate;
use reconcile_core::config::TiePolicy;
use reconcile_core::{Config, EventId, EventRecord};
use reconcile_engine::{DeclineEscalation, Escalation, EventReconciler, Reconciliation};
use reconcile_history::{DuplicateDetector, IngestOutcome, Ingestor, SqliteEventStore};
use std::collections::BTreeSet;
use reconcile_ingestion::{EventBuilder, EventLayout, ExtractedEvent};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::prompt::PromptEscalation;

pub struct IngestArgs {
    pub directory: PathBuf,
    pub no_save: bool,
    pub verbose: bool,
    pub non_interactive: bool,
    pub until: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Summary {
    found: usize,
    reconciled: usize,
    stored: usize,
    duplicates: usize,
    failed: usize,
}

/// Hand unresolved ties to the operator instead of averaging them.
pub fn apply_tie_override(mut config: Config, escalate_ties: bool) -> Config {
    if escalate_ties {
        config.reconcile.tie_policy = TiePolicy::Escalate;
    }
    config
}

fn make_escalation(non_interactive: bool) -> Box<dyn Escalation> {
    if non_interactive {
        Box::new(DeclineEscalation)
    } else {
        Box::new(PromptEscalation::stdin())
    }
}

fn load_event(path: &Path) -> Result<EventRecord> {
    let extracted = ExtractedEvent::load(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let event = EventBuilder::new(EventLayout::default())
        .build(extracted)
        .with_context(|| format!("incomplete event in {}", path.display()))?;
    Ok(event)
}

/// Extracted event files in a directory, sorted by name.
fn event_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn ingest(config: &Config, args: IngestArgs) -> Result<()> {
    let files = event_files(&args.directory)?;
    if files.is_empty() {
        println!("No event files found in {}", args.directory.display());
        return Ok(());
    }
    println!("Found {} event file(s) in {}", files.len(), args.directory.display());

    let mut escalation = make_escalation(args.non_interactive);
    let mut summary = Summary {
        found: files.len(),
        ..Summary::default()
    };

    if args.no_save {
        dry_run(config, &args, &files, escalation.as_mut(), &mut summary)?;
    } else {
        let store = SqliteEventStore::open(&config.database.path)?;
        let mut ingestor = Ingestor::new(config, store).with_end_date(args.until);

        for path in &files {
            println!("\nProcessing: {}", path.display());
            let outcome = match load_event(path) {
                Ok(event) => match ingestor.ingest(&event, escalation.as_mut()) {
                    Err(e) if !e.is_rejection() => {
                        return Err(e).with_context(|| format!("aborted at {}", path.display()));
                    }
                    other => other.map_err(anyhow::Error::from),
                },
                Err(e) => Err(e),
            };
            match outcome {
                Ok(IngestOutcome::Stored {
                    event_id,
                    reconciliation,
                }) => {
                    summary.reconciled += 1;
                    summary.stored += 1;
                    report(&reconciliation, args.verbose);
                    println!("Stored as event {event_id}");
                }
                Ok(IngestOutcome::Duplicate {
                    existing,
                    reconciliation,
                }) => {
                    summary.reconciled += 1;
                    summary.duplicates += 1;
                    report(&reconciliation, args.verbose);
                    println!("Duplicate of stored event {existing}, skipped");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(file = %path.display(), "{e:#}");
                    println!("Failed: {e:#}");
                }
            }
        }
    }

    print_summary(&summary, args.no_save);
    Ok(())
}

/// Reconcile and look for duplicates without writing anything.
fn dry_run(
    config: &Config,
    args: &IngestArgs,
    files: &[PathBuf],
    escalation: &mut dyn Escalation,
    summary: &mut Summary,
) -> Result<()> {
    let reconciler = EventReconciler::new(&config.reconcile);
    let detector = DuplicateDetector::new(&config.dedup).with_end_date(args.until);
    let history = if Path::new(&config.database.path).exists() {
        Some(SqliteEventStore::open(&config.database.path)?)
    } else {
        warn!(path = %config.database.path, "no event database, duplicate check skipped");
        None
    };

    for path in files {
        println!("\nProcessing: {}", path.display());
        let result = load_event(path).and_then(|event| {
            reconciler
                .reconcile(&event, &mut *escalation)
                .map_err(anyhow::Error::from)
        });
        let reconciliation = match result {
            Ok(r) => r,
            Err(e) => {
                summary.failed += 1;
                error!(file = %path.display(), "{e:#}");
                println!("Failed: {e:#}");
                continue;
            }
        };

        summary.reconciled += 1;
        report(&reconciliation, args.verbose);
        if let Some(store) = &history {
            if let Some(existing) = detector.find_duplicate(&reconciliation.fingerprint, store)? {
                summary.duplicates += 1;
                println!("Duplicate of stored event {existing}");
            }
        }
    }
    Ok(())
}

pub fn check(config: &Config, file: &Path, non_interactive: bool) -> Result<()> {
    let event = load_event(file)?;
    let mut escalation = make_escalation(non_interactive);
    let reconciliation = EventReconciler::new(&config.reconcile)
        .reconcile(&event, escalation.as_mut())
        .with_context(|| format!("reconciliation failed for {}", file.display()))?;
    report(&reconciliation, true);
    Ok(())
}

fn report(reconciliation: &Reconciliation, verbose: bool) {
    let event = &reconciliation.event;
    println!(
        "Event {}: {} teams, {} auction rounds",
        event.date,
        event.teams.len(),
        reconciliation.rounds.len(),
    );
    if reconciliation.has_warnings() {
        println!("{} warning(s) need review", reconciliation.diagnostics.len());
    }
    if !verbose {
        return;
    }

    println!("Rates (s = slot, a = averaged, e = escalated, r = recorded):");
    print!("{:<30}", "Team");
    for round in &reconciliation.rounds {
        print!("{:>12}", format!("R{}", round.round));
    }
    println!("{:>12}{:>12}", "Auction", "Total");

    for team in &event.teams {
        print!("{:<30}", team.as_str());
        for round in &reconciliation.rounds {
            let cell = round
                .assignments
                .get(team)
                .and_then(|a| a.rate.zip(a.source))
                .map(|(rate, source)| format!("{} {}", rate.normalize(), &source.as_str()[..1]))
                .unwrap_or_else(|| "-".to_string());
            print!("{cell:>12}");
        }
        let auction = reconciliation
            .auction_totals
            .get(team)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let total = reconciliation
            .fingerprint
            .per_team_total
            .get(team)
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!("{auction:>12}{total:>12}");
    }

    for diag in &reconciliation.diagnostics {
        println!("  warning: {diag}");
    }
}

pub fn list(config: &Config) -> Result<()> {
    let store = SqliteEventStore::open(&config.database.path)?;
    let events = store.list_events()?;
    if events.is_empty() {
        println!("No stored events in {}", config.database.path);
        return Ok(());
    }

    println!("{:>6}  {:<10}  Teams", "ID", "Date");
    for event in &events {
        let teams: Vec<&str> = event.teams.iter().map(|t| t.as_str()).collect();
        println!("{:>6}  {:<10}  {}", event.event_id, event.date, teams.join(", "));
    }
    println!("
{} stored event(s)", events.len());
    Ok(())
}

pub fn remove(config: &Config, ids: &[EventId]) -> Result<()> {
    let mut store = SqliteEventStore::open(&config.database.path)?;
    let (removed, missing) = remove_events(&mut store, ids)?;
    println!("Removed: {removed}");
    for id in missing {
        println!("No stored event {id}");
    }
    Ok(())
}

pub fn clear(config: &Config) -> Result<()> {
    let mut store = SqliteEventStore::open(&config.database.path)?;
    let removed = clear_events(&mut store)?;
    if removed == 0 {
        println!("Event database is already empty");
    } else {
        println!("Removed {removed} event(s)");
    }
    Ok(())
}

/// Remove each listed event once. Returns the number removed and the ids that
/// were not stored.
fn remove_events(store: &mut SqliteEventStore, ids: &[EventId]) -> Result<(usize, Vec<EventId>)> {
    let mut removed = 0;
    let mut missing = Vec::new();
    for id in ids.iter().copied().collect::<BTreeSet<_>>() {
        if store.remove_event(id)? {
            removed += 1;
        } else {
            missing.push(id);
        }
    }
    Ok((removed, missing))
}

/// Remove every stored event.
fn clear_events(store: &mut SqliteEventStore) -> Result<usize> {
    let ids: Vec<EventId> = store.list_events()?.iter().map(|e| e.event_id).collect();
    let (removed, _) = remove_events(store, &ids)?;
    let remaining = store.list_events()?.len();
    if remaining > 0 {
        warn!(remaining, "events left after clearing");
    }
    Ok(removed)
}

fn print_summary(summary: &Summary, no_save: bool) {
    println!("\n{}", "=".repeat(60));
    println!("SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Files processed: {}", summary.found);
    println!("Successfully reconciled: {}", summary.reconciled);
    if !no_save {
        println!("Stored: {}", summary.stored);
    }
    println!("Duplicates: {}", summary.duplicates);
    if summary.failed > 0 {
        println!("Failed: {}", summary.failed);
    }
}
