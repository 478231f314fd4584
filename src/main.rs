//! CLI entry point for the `ssm` tool.
//!
//! Lists, reads, writes and removes AWS SSM Parameter Store parameters.

use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ssm_cli::config::{Settings, init_logging};
use ssm_cli::directory::SsmDirectory;
use ssm_cli::listing::{self, ListingRequest};
use ssm_cli::output::{self, OutputFormat};
use ssm_cli::{CancellationToken, ExitStatus, SsmError, ops};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "ssm", version)]
#[command(about = "Simple SSM Parameter Store interface", long_about = None)]
struct Cli {
    /// AWS profile to use. Defaults to AWS_PROFILE
    #[arg(short, long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List parameter names. ex: ssm ls myapp, ssm ls --secrets myapp
    Ls {
        /// Only list names containing this substring
        #[arg(value_name = "SUBSTRING")]
        filter: Option<String>,

        /// Print parameter values in plaintext
        #[arg(long)]
        secrets: bool,

        /// Serialize output to CSV
        #[arg(long)]
        csv: bool,

        /// Print names in alphabetical order without timestamps (good for diffs)
        #[arg(long)]
        hide_ts: bool,

        /// Strip the path prefix from names (also good for diffs)
        #[arg(long)]
        strip_prefix: bool,

        /// Print every previous version next to each value
        #[arg(long, requires = "secrets")]
        show_history: bool,
    },
    /// Print a plaintext value. ex: ssm get /app/prod/my-key
    Get {
        #[arg(value_name = "KEY")]
        key: String,

        /// Do not print a trailing newline
        #[arg(short = 'n')]
        no_newline: bool,
    },
    /// Set a key to a value, overwriting. ex: ssm set /app/prod/version 27
    Set {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// Remove a parameter. ex: ssm rm /app/prod/param
    Rm {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::load(cli.profile);

    let _log_guard = match init_logging(&settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e:#}");
            return ExitCode::from(ExitStatus::GeneralError.code());
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = tokio::select! {
        result = run(cli.command, &settings, &cancel) => result,
        _ = cancel.cancelled() => Err(SsmError::Cancelled.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(ExitStatus::from_error(&err).code())
        }
    }
}

async fn run(command: Commands, settings: &Settings, cancel: &CancellationToken) -> Result<()> {
    let sdk_config = settings.sdk_config().await;
    let directory = Arc::new(SsmDirectory::new(&sdk_config));
    debug!(profile = ?settings.profile, "AWS configuration loaded");

    match command {
        Commands::Ls {
            filter,
            secrets,
            csv,
            hide_ts,
            strip_prefix,
            show_history,
        } => {
            let request = ListingRequest::new(filter.unwrap_or_default())
                .with_values(secrets)
                .with_history(show_history)
                .sort_by_timestamp(!hide_ts)
                .with_stripped_names(strip_prefix);

            info!("Fetching ssm keys");
            let rows = listing::list(directory, &request, cancel)
                .await
                .context("listing parameters failed")?;

            let format = if csv {
                OutputFormat::Csv
            } else {
                OutputFormat::Tsv
            };
            let stdout = std::io::stdout();
            let columns = stdout.is_terminal().then(output::terminal_width);
            let mut out = stdout.lock();
            output::render(&mut out, &rows, format, columns)?;
            out.flush()?;
        }
        Commands::Get { key, no_newline } => {
            let value = ops::get(directory.as_ref(), &key)
                .await
                .with_context(|| format!("error retrieving key {key}"))?;

            let mut out = std::io::stdout().lock();
            if no_newline {
                write!(out, "{value}")?;
            } else {
                writeln!(out, "{value}")?;
            }
            out.flush()?;
        }
        Commands::Set { key, value } => {
            ops::set(directory.as_ref(), &key, &value)
                .await
                .with_context(|| format!("error setting key {key}"))?;
        }
        Commands::Rm { key } => {
            ops::delete(directory.as_ref(), &key)
                .await
                .with_context(|| format!("error removing key {key}"))?;
        }
    }

    Ok(())
}
