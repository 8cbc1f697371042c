use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use reconcile_core::{Config, EventId};
use std::path::PathBuf;

mod commands;
mod prompt;

use commands::IngestArgs;

#[derive(Parser)]
#[command(name = "score-reconcile")]
#[command(about = "Reconcile and store quiz event score sheets", long_about = None)]
struct Cli {
    /// Config file path (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "SCORE_RECONCILE_CONFIG")]
    config: Option<PathBuf>,

    /// Ask for tied rates instead of averaging them (sets reconcile.tie_policy = "escalate")
    #[arg(long, global = true)]
    escalate_ties: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every extracted event in a directory and store new ones
    Ingest {
        /// Directory containing extracted event JSON files
        directory: PathBuf,
        /// Do not write to the database
        #[arg(long)]
        no_save: bool,
        /// Print rates and warnings for every event
        #[arg(short, long)]
        verbose: bool,
        /// Reject escalated ties instead of prompting; prompts happen only with
        /// --escalate-ties or reconcile.tie_policy = "escalate"
        #[arg(long)]
        non_interactive: bool,
        /// Search for duplicates up to this date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Reconcile one extracted event and print the result
    Check {
        /// Extracted event JSON file
        file: PathBuf,
        /// Reject escalated ties instead of prompting; prompts happen only with
        /// --escalate-ties or reconcile.tie_policy = "escalate"
        #[arg(long)]
        non_interactive: bool,
    },
    /// List stored events
    List,
    /// Remove stored events by id
    Remove {
        /// Event ids as shown by `list`
        #[arg(required = true)]
        ids: Vec<EventId>,
    },
    /// Remove every stored event
    Clear,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let config = commands::apply_tie_override(config, cli.escalate_ties);

    let level = match &cli.command {
        Commands::Ingest { verbose: true, .. } => "debug".to_string(),
        _ => config.logging.level.clone(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ingest {
            directory,
            no_save,
            verbose,
            non_interactive,
            until,
        } => commands::ingest(
            &config,
            IngestArgs {
                directory,
                no_save,
                verbose,
                non_interactive,
                until,
            },
        ),
        Commands::Check {
            file,
            non_interactive,
        } => commands::check(&config, &file, non_interactive),
        Commands::List => commands::list(&config),
        Commands::Remove { ids } => commands::remove(&config, &ids),
        Commands::Clear => commands::clear(&config),
    }
}
