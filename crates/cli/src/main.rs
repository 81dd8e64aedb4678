mod error_presentation;
mod manifest;

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use recordsync_core::{ConnectionConfig, Dialect, SyncAction, SyncOutcome, sync_record_table_schema};
#[cfg(any(feature = "postgres", feature = "sqlite"))]
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error_presentation::{CliResult, render_runtime_error};

#[derive(Debug, Parser)]
#[command(
    name = "recordsync",
    version,
    about = "Synchronize collection record tables with their declared fields and indexes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synchronize record tables in a PostgreSQL database.
    #[cfg(feature = "postgres")]
    Postgres(PostgresArgs),
    /// Synchronize record tables in a SQLite database file.
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Collections manifest to apply (YAML). Read from stdin when omitted.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Manifest the database was last synchronized with.
    #[arg(long, value_name = "PATH")]
    previous: Option<PathBuf>,

    /// Reclaim storage (SQLite) or refresh planner statistics (PostgreSQL) afterwards.
    #[arg(long)]
    vacuum: bool,

    /// Log every migration step to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(feature = "postgres")]
#[derive(Debug, Args)]
struct PostgresArgs {
    #[arg(value_name = "DATABASE")]
    database: String,

    #[arg(short = 'H', long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short = 'U', long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Unix socket directory; takes precedence over --host.
    #[arg(long, value_name = "DIR")]
    socket: Option<String>,

    #[arg(long)]
    application_name: Option<String>,

    #[arg(long, value_name = "SECONDS")]
    connect_timeout: Option<u64>,

    #[command(flatten)]
    sync: SyncArgs,
}

#[cfg(feature = "postgres")]
impl PostgresArgs {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            socket: self.socket.clone(),
            application_name: self.application_name.clone(),
            connect_timeout: self.connect_timeout.map(std::time::Duration::from_secs),
            ..ConnectionConfig::for_database(&self.database)
        }
    }
}

#[cfg(feature = "sqlite")]
#[derive(Debug, Args)]
struct SqliteArgs {
    /// Database file path; created when missing.
    #[arg(value_name = "DATABASE")]
    database: String,

    /// How long a locked database is retried before giving up.
    #[arg(long, value_name = "SECONDS")]
    busy_timeout: Option<u64>,

    #[command(flatten)]
    sync: SyncArgs,
}

#[cfg(feature = "sqlite")]
impl SqliteArgs {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.busy_timeout.map(std::time::Duration::from_secs),
            ..ConnectionConfig::for_database(&self.database)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", render_runtime_error(error));
            ExitCode::FAILURE
        }
    }
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        #[cfg(feature = "postgres")]
        Command::Postgres(args) => {
            init_tracing(args.sync.verbose);
            synchronize(
                &recordsync_dialect_postgres::PostgresDialect,
                &args.connection_config(),
                &args.sync,
            )
        }
        #[cfg(feature = "sqlite")]
        Command::Sqlite(args) => {
            init_tracing(args.sync.verbose);
            synchronize(
                &recordsync_dialect_sqlite::SqliteDialect,
                &args.connection_config(),
                &args.sync,
            )
        }
    }
}

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
fn run(_cli: Cli) -> CliResult<()> {
    init_tracing(false);
    Err(error_presentation::CliError::NoDialectsEnabled)
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
fn synchronize(dialect: &dyn Dialect, config: &ConnectionConfig, args: &SyncArgs) -> CliResult<()> {
    let desired = manifest::read_desired(args.file.as_deref())?;
    let previous = args
        .previous
        .as_deref()
        .map(manifest::read_file)
        .transpose()?
        .unwrap_or_default();

    let adapter = dialect.connect(config)?;
    info!(
        dialect = dialect.name(),
        collections = desired.collections.len(),
        "synchronizing record tables"
    );

    for entry in &desired.collections {
        let old = previous.previous_of(entry);
        let outcome = sync_record_table_schema(adapter.as_ref(), &entry.collection, old)?;
        println!("{}", describe_outcome(&entry.collection.name, &outcome));
    }

    if args.vacuum {
        adapter.vacuum()?;
        println!("vacuum: done");
    }

    Ok(())
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
fn describe_outcome(name: &str, outcome: &SyncOutcome) -> String {
    let action = match outcome.action {
        SyncAction::Skipped => return format!("{name}: skipped (view)"),
        SyncAction::Created => "created",
        SyncAction::Updated => "updated",
    };

    let mut details = Vec::new();
    if outcome.indexes_rebuilt {
        details.push("indexes rebuilt".to_string());
    }
    if outcome.normalized_fields > 0 {
        details.push(format!("{} field(s) normalized", outcome.normalized_fields));
    }
    if outcome.gin.created > 0 {
        details.push(format!("{} gin index(es) created", outcome.gin.created));
    }
    if outcome.gin.failed > 0 {
        details.push(format!("{} gin index(es) failed", outcome.gin.failed));
    }
    if !outcome.invalid_indexes.is_empty() {
        let positions = outcome
            .invalid_indexes
            .positions()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        details.push(format!("skipped invalid indexes at {positions}"));
    }

    if details.is_empty() {
        format!("{name}: {action}")
    } else {
        format!("{name}: {action} ({})", details.join("; "))
    }
}
