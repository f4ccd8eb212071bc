// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! `tradepost`: ops CLI for the storefront. Database chores, daily
//! closes, ads drafts, webhook rehearsal, and config checks, without
//! going through the HTTP surface.

mod actions;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tradepost_core::{ExitCode, ENV_TRADEPOST_LOG_LEVEL};
use tradepost_store::{StoreError, StoreErrorCode};

#[derive(Clone, Copy)]
pub(crate) struct OutputMode {
    pub json: bool,
    pub quiet: bool,
}

pub(crate) struct CliError {
    pub code: ExitCode,
    pub message: String,
}

impl CliError {
    pub(crate) fn new(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Usage, message)
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Validation, message)
    }

    pub(crate) fn dependency(message: impl Into<String>) -> Self {
        Self::new(ExitCode::DependencyFailure, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ExitCode::Internal, message)
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let code = match err.code {
            StoreErrorCode::NotFound | StoreErrorCode::Conflict | StoreErrorCode::Constraint => {
                ExitCode::Validation
            }
            _ => ExitCode::Internal,
        };
        Self::new(code, err.to_string())
    }
}

impl From<tradepost_close::CloseError> for CliError {
    fn from(err: tradepost_close::CloseError) -> Self {
        use tradepost_close::CloseErrorCode;
        let code = match err.code {
            CloseErrorCode::Options | CloseErrorCode::AlreadyClosed => ExitCode::Validation,
            CloseErrorCode::Gateway => ExitCode::DependencyFailure,
            _ => ExitCode::Internal,
        };
        Self::new(code, err.to_string())
    }
}

impl From<tradepost_close::DraftError> for CliError {
    fn from(err: tradepost_close::DraftError) -> Self {
        use tradepost_close::DraftErrorCode;
        let code = match err.code {
            DraftErrorCode::Validation | DraftErrorCode::NotFound => ExitCode::Validation,
            DraftErrorCode::Gateway | DraftErrorCode::Decode => ExitCode::DependencyFailure,
            _ => ExitCode::Internal,
        };
        Self::new(code, err.to_string())
    }
}

#[derive(Parser)]
#[command(name = "tradepost", version)]
#[command(about = "Tradepost operations CLI")]
struct Cli {
    /// Machine-readable json on stdout.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    /// Suppress everything except errors.
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database chores: schema, demo data, row counts.
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Daily close runs.
    Close {
        #[command(subcommand)]
        command: CloseCommand,
    },
    /// Ads drafts without the admin API.
    Ads {
        #[command(subcommand)]
        command: AdsCommand,
    },
    /// Webhook integration rehearsal.
    Webhook {
        #[command(subcommand)]
        command: WebhookCommand,
    },
    /// Configuration checks.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum DbCommand {
    /// Create the database and apply the schema.
    Init {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Load a small demo catalog.
    Seed {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Row counts and schema version.
    Inspect {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CloseCommand {
    /// Close one business day.
    Run {
        #[arg(long)]
        date: String,
        /// Supersede an existing run for the date.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Rehearse against the fake gateway: orders-only totals, no
        /// real charges pulled.
        #[arg(long, default_value_t = false)]
        offline: bool,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Live runs, newest first.
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// One run with its discrepancies.
    Show {
        #[arg(long)]
        date: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AdsCommand {
    /// Generate a draft for one product.
    Draft {
        #[arg(long)]
        slug: String,
        /// google or meta.
        #[arg(long)]
        channel: String,
        #[arg(long)]
        tone: Option<String>,
        /// Template copy from the catalog row instead of the model.
        #[arg(long, default_value_t = false)]
        offline: bool,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// All drafts, newest first.
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum WebhookCommand {
    /// Print a signature header the webhook route accepts.
    Sign {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        body_file: PathBuf,
        /// Unix seconds; defaults to now.
        #[arg(long)]
        timestamp: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Run the startup contract against the current environment.
    Check,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_TRADEPOST_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    // Diagnostics to stderr; stdout stays parseable under --json.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("tokio runtime: {e}")))
}

fn dispatch(command: Commands, output: OutputMode) -> Result<(), CliError> {
    match command {
        Commands::Db { command } => match command {
            DbCommand::Init { db } => actions::db_init(db, output),
            DbCommand::Seed { db } => actions::db_seed(db, output),
            DbCommand::Inspect { db } => actions::db_inspect(db, output),
        },
        Commands::Close { command } => match command {
            CloseCommand::Run {
                date,
                force,
                offline,
                db,
            } => runtime()?.block_on(actions::close_run(db, &date, force, offline, output)),
            CloseCommand::List { db } => actions::close_list(db, output),
            CloseCommand::Show { date, db } => actions::close_show(db, &date, output),
        },
        Commands::Ads { command } => match command {
            AdsCommand::Draft {
                slug,
                channel,
                tone,
                offline,
                db,
            } => runtime()?.block_on(actions::ads_draft(
                db,
                &slug,
                &channel,
                tone.as_deref(),
                offline,
                output,
            )),
            AdsCommand::List { db } => actions::ads_list(db, output),
        },
        Commands::Webhook { command } => match command {
            WebhookCommand::Sign {
                secret,
                body_file,
                timestamp,
            } => actions::webhook_sign(&secret, &body_file, timestamp, output),
        },
        Commands::Config { command } => match command {
            ConfigCommand::Check => actions::config_check(output),
        },
    }
}

fn main() -> ProcessExitCode {
    init_tracing();
    let cli = Cli::parse();
    let output = OutputMode {
        json: cli.json,
        quiet: cli.quiet,
    };
    match dispatch(cli.command, output) {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(err) => {
            eprintln!("{}", err.message);
            ProcessExitCode::from(err.code as u8)
        }
    }
}
