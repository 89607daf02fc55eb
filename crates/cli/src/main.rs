// casebook - reconcile case, daily and cumulative sources and publish the derived artifacts

mod exit_codes;
mod http;
mod notify;
mod previous;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use casebook_io::StoreError;
use casebook_recon::ReconError;

use exit_codes::{recon_exit_code, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "casebook")]
#[command(about = "Reconcile per-case, daily and cumulative case data and publish the results")]
#[command(version)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline: load, reconcile, publish changed artifacts, notify
    #[command(after_help = "\
Examples:
  casebook run --config casebook.toml
  casebook run --config casebook.toml --dry-run --json
  casebook run --config casebook.toml --today 2024-03-06 --as-of '2024/03/06 21:00'")]
    Run {
        /// Pipeline config (TOML). Relative paths inside resolve against its directory.
        #[arg(long)]
        config: PathBuf,

        /// Date the case series runs through (YYYY-MM-DD). Defaults to today in the config's offset.
        #[arg(long)]
        today: Option<String>,

        /// Pin every published timestamp ('YYYY/MM/DD HH:MM')
        #[arg(long)]
        as_of: Option<String>,

        /// Compute and validate, but write nothing and send no notification
        #[arg(long)]
        dry_run: bool,

        /// Print a JSON run report to stdout
        #[arg(long)]
        json: bool,

        /// Read previous artifacts and findings from this directory instead
        #[arg(long)]
        previous_dir: Option<PathBuf>,

        /// Webhook that receives the outcome message
        #[arg(long, env = "CASEBOOK_WEBHOOK_URL")]
        webhook_url: Option<String>,
    },

    /// Parse and validate a config and check its schema directory
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "casebook=debug" } else { "casebook=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            today,
            as_of,
            dry_run,
            json,
            previous_dir,
            webhook_url,
        } => run::cmd_run(run::RunArgs {
            config,
            today,
            as_of,
            dry_run,
            json,
            previous_dir,
            webhook_url,
        }),
        Commands::CheckConfig { config } => run::cmd_check_config(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            error!(code, "{message}");
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::MissingColumn { .. } => {
                Some("check the column names under [sources.*.columns]".to_string())
            }
            ReconError::SchemaViolation { .. } => {
                Some("no artifacts were written; the previous publication is unchanged".to_string())
            }
            ReconError::EmptySource(_) => {
                Some("the cumulative source needs at least one snapshot row".to_string())
            }
            _ => None,
        };
        Self {
            code: recon_exit_code(&err),
            message: err.to_string(),
            hint,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        Self::io(err.to_string())
    }
}
