//! # crmsync
//!
//! Command-line entry point for the CRM sync engine.
//!
//! ```text
//! crmsync [--config PATH] sync <integration>
//!         [--start-date D] [--end-date D] [--fetch-all]
//!         [--time-interval "15 minutes"] [--limit N] [--force]
//!         [--object contact|company ...]
//!
//! crmsync [--config PATH] fields <integration> <contact|company>
//! ```
//!
//! ## Exit Codes
//! - `0` - Run finished (stage failures are reported, not fatal)
//! - `255` - Configuration error or invalid run options
//! - `1` - Anything else (database unavailable, unreadable config file)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crmsync_core::validation::WindowRequest;
use crmsync_core::{Feature, ObjectType};
use crmsync_db::{Database, DbConfig};
use crmsync_sync::{LogProgress, RunReport, SyncConfig, SyncError, SyncRunner};

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "crmsync", version, about = "Bidirectional contact/company sync with a remote CRM")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one sync of an integration
    Sync(SyncArgs),

    /// Describe the remote fields of an object type
    Fields {
        /// Integration name
        integration: String,

        /// contact or company
        object: ObjectType,
    },
}

#[derive(Debug, clap::Args)]
struct SyncArgs {
    /// Integration name
    integration: String,

    /// Only records modified at or after this date
    #[arg(long)]
    start_date: Option<String>,

    /// Only records modified at or before this date (default: now)
    #[arg(long)]
    end_date: Option<String>,

    /// Ignore the date window and sync all history
    #[arg(long)]
    fetch_all: bool,

    /// Window size when no start date is given
    #[arg(long)]
    time_interval: Option<String>,

    /// Push page size
    #[arg(long)]
    limit: Option<u32>,

    /// Take over a lease held by another run
    #[arg(long)]
    force: bool,

    /// Restrict the run to these object types
    #[arg(long = "object", value_name = "OBJECT")]
    objects: Vec<ObjectType>,
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            exit_code(&err)
        }
    }
}

/// Initializes the tracing subscriber. Logs go to stderr; the run summary
/// goes to stdout.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=crmsync_sync=trace` - Trace the engine only
/// - Default: INFO, debug for crmsync crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crmsync=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<SyncError>() {
        Some(sync_err) if sync_err.is_configuration_error() => ExitCode::from(255),
        _ => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SyncConfig::load(cli.config)?;

    match cli.command {
        Command::Sync(args) => sync(config, args).await,
        Command::Fields {
            integration,
            object,
        } => fields(config, &integration, object).await,
    }
}

async fn open_database(config: &SyncConfig) -> anyhow::Result<Database> {
    let path = &config.database.path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let db = Database::new(DbConfig::new(path.clone())).await?;
    Ok(db)
}

// =============================================================================
// Commands
// =============================================================================

async fn sync(config: SyncConfig, args: SyncArgs) -> anyhow::Result<()> {
    let request = WindowRequest {
        start_date: args.start_date,
        end_date: args.end_date,
        fetch_all: args.fetch_all,
        time_interval: args
            .time_interval
            .unwrap_or_else(|| config.sync.default_interval.clone()),
        limit: args.limit.unwrap_or(config.sync.default_limit),
        objects: if args.objects.is_empty() {
            ObjectType::ALL.to_vec()
        } else {
            args.objects
        },
    };
    let window = request
        .resolve(chrono::Utc::now())
        .map_err(SyncError::from)?;

    let db = open_database(&config).await?;
    let runner = SyncRunner::new(config, db.clone()).with_progress(Arc::new(LogProgress::new()));

    let report = runner.run(&args.integration, window, args.force).await;
    db.close().await;

    let report = report?;
    print_report(&report);
    info!(run_id = %report.run_id, "Done");
    Ok(())
}

async fn fields(config: SyncConfig, integration: &str, object: ObjectType) -> anyhow::Result<()> {
    let db = open_database(&config).await?;
    let runner = SyncRunner::new(config, db.clone());

    let catalog = runner.describe_fields(integration, object).await;
    db.close().await;
    let catalog = catalog?;

    for (key, descriptor) in &catalog.fields {
        let marker = if descriptor.required { " (required)" } else { "" };
        println!("{:<32} {}{}", key, descriptor.label, marker);
    }
    for alias in &catalog.unresolved_aliases {
        println!("{:<32} {} (unknown alias, add it to custom_field_aliases)", "?", alias);
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Sync {} ({})", report.integration, report.run_id);

    for stage in &report.stages {
        let c = &stage.counters;
        let line = match stage.feature {
            Feature::Pull => format!("{} updated, {} created", c.updated, c.created),
            Feature::Push => c.to_string(),
        };
        println!(
            "  {:<5} {:<8} {}",
            stage.feature.to_string(),
            stage.object_type.as_str(),
            line
        );

        if let Some(ref err) = stage.error {
            println!("        failed: {}", err);
        }
    }
}
