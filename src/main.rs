use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{self, ExitCode};
use tracing::{info, warn};

use license_calc::config::{set_config, Config};
use license_calc::display::DisplayManager;
use license_calc::logging::init_logging;
use license_calc::models::LicenseReport;
use license_calc::pipeline::{inspect_header, Pipeline, RunObserver, RunOptions, RunOutcome};
use license_calc::progress::{CancelFlag, ProgressSnapshot};

#[derive(Parser)]
#[command(name = "license-calc")]
#[command(about = "Count the licenses an application needs from an inventory CSV export")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an inventory file and print the number of licenses needed
    Count {
        /// Inventory CSV file
        path: PathBuf,
        /// Application id to count (overrides configuration)
        #[arg(long)]
        app_id: Option<i64>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Include a per-user breakdown
        #[arg(long)]
        per_user: bool,
        /// Do not print progress while scanning
        #[arg(long, short)]
        quiet: bool,
    },
    /// Validate an inventory file and show which column holds the application id
    Check {
        /// Inventory CSV file
        path: PathBuf,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Prints progress on stderr, overwriting the previous status line.
struct CliObserver {
    show_progress: bool,
    progress_shown: bool,
}

impl CliObserver {
    fn clear_status(&mut self) {
        if self.progress_shown {
            eprint!("\r\x1b[2K");
            let _ = io::stderr().flush();
            self.progress_shown = false;
        }
    }
}

impl RunObserver for CliObserver {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        if self.show_progress {
            eprint!("\r{}", DisplayManager::progress_line(snapshot));
            let _ = io::stderr().flush();
            self.progress_shown = true;
        }
    }

    fn on_complete(&mut self, _report: &LicenseReport) {
        self.clear_status();
    }

    fn on_error(&mut self, _message: &str) {
        self.clear_status();
    }

    fn on_cancelled(&mut self) {
        self.clear_status();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    let json_pretty = config.output.json_pretty;
    let per_user_default = config.output.per_user;
    let scan = config.scan.clone();
    set_config(config);

    // Dropped when main returns, after the outcome is printed, so the file
    // appender is flushed on failing runs too.
    let _log_guard = init_logging();
    if let Some(path) = Config::locate() {
        info!(config_file = %path.display(), "Loaded configuration from file");
    }

    let code = match cli.command {
        Commands::Count {
            path,
            app_id,
            json,
            per_user,
            quiet,
        } => {
            let mut options = RunOptions::from_scan_config(&scan);
            if let Some(app_id) = app_id {
                options.target_app_id = app_id;
            }
            options.per_user = per_user || per_user_default;

            let display = DisplayManager::new(json, json_pretty);
            run_count(&display, options, path, !quiet && !json).await
        }
        Commands::Check { path, json } => {
            let options = RunOptions::from_scan_config(&scan);
            let display = DisplayManager::new(json, json_pretty);
            run_check(&display, &options, path, json)
        }
    };

    Ok(code)
}

async fn run_count(
    display: &DisplayManager,
    options: RunOptions,
    path: PathBuf,
    show_progress: bool,
) -> ExitCode {
    let handle = match Pipeline::new(options).start(&path) {
        Ok(handle) => handle,
        Err(e) => return fail(display, &e.to_string()),
    };

    let cancel = handle.cancel_flag();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, cancel).await {
            eprintln!("\nInterrupted again, exiting");
            process::exit(130);
        }
    });

    let mut observer = CliObserver {
        show_progress,
        progress_shown: false,
    };

    match handle.drive(&mut observer).await {
        RunOutcome::Completed(report) => {
            print!("{}", display.render_report(&report));
            if display.is_json() {
                println!();
            }
            ExitCode::SUCCESS
        }
        RunOutcome::Failed(message) => fail(display, &message),
        RunOutcome::Cancelled => fail(display, "Run cancelled"),
    }
}

fn run_check(display: &DisplayManager, options: &RunOptions, path: PathBuf, json: bool) -> ExitCode {
    let column = match inspect_header(&path, options) {
        Ok(column) => column,
        Err(e) => return fail(display, &e.to_string()),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string(),
                "appIdColumn": column.index,
                "headerFallback": column.fallback,
            })
        );
    } else if column.fallback {
        println!(
            "⚠️  No '{}' column in header, column {} will be used",
            options.app_id_column, column.index
        );
    } else {
        println!("✅ Application id column: {}", column.index);
    }
    ExitCode::SUCCESS
}

/// Cancels the run on the first interrupt. Returns `true` once a second
/// interrupt arrives, for a scan stuck in a blocking read that never polls
/// the flag again.
async fn watch_interrupts<F, Fut>(mut interrupt: F, cancel: CancelFlag) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    cancel.cancel();
    warn!("Interrupt received, cancelling run");
    eprintln!("\nCancelling, press Ctrl+C again to exit immediately");

    interrupt().await.is_ok()
}

fn fail(display: &DisplayManager, message: &str) -> ExitCode {
    eprintln!("{}", display.render_error(message));
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future;

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let cancel = CancelFlag::new();
        let mut calls = 0;

        let force = watch_interrupts(
            || {
                calls += 1;
                future::ready(Ok(()))
            },
            cancel.clone(),
        )
        .await;

        assert!(force);
        assert!(cancel.is_cancelled());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_unavailable_signal_handler_leaves_run_alone() {
        let cancel = CancelFlag::new();

        let force = watch_interrupts(
            || future::ready(Err(io::Error::new(io::ErrorKind::Other, "no handler"))),
            cancel.clone(),
        )
        .await;

        assert!(!force);
        assert!(!cancel.is_cancelled());
    }
}
