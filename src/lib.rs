//! License Calculator Library
//!
//! Computes how many licenses an application needs from a software inventory
//! export. Each row of the export describes one installation: which machine,
//! which user, what kind of machine, and which application.
//!
//! ## Licensing Rule
//!
//! A license covers one desktop install plus, where a user has more laptops
//! than desktops, one laptop. Laptops beyond that share licenses two to one,
//! rounding up. Totals are computed per user and summed.
//!
//! ## Architecture Overview
//!
//! - [`header`] - Locates the application id column in the header line
//! - [`parser`] - Turns one data line into an [`InstallRecord`]
//! - [`collector`] - Streams, filters and deduplicates install records
//! - [`calculator`] - Applies the licensing rule per user
//! - [`pipeline`] - Background runs with progress, cancellation and outcome
//! - [`display`] - Terminal and JSON rendering of results
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use license_calc::pipeline::{Pipeline, RunOptions};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let handle = Pipeline::new(RunOptions::default()).start(Path::new("inventory.csv"))?;
//! let outcome = handle.wait().await;
//! println!("{:?}", outcome.total_licenses());
//! # Ok(())
//! # }
//! ```

pub mod calculator;
pub mod collector;
pub mod config;
pub mod display;
pub mod error;
pub mod header;
pub mod logging;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod progress;

pub use error::{PipelineError, PipelineResult};
pub use models::*;
pub use pipeline::{Pipeline, RunEvent, RunHandle, RunObserver, RunOptions, RunOutcome, RunState};
