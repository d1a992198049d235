//! Run Orchestration
//!
//! A [`Pipeline`] turns an inventory source into a [`LicenseReport`] on a
//! background task and hands the caller a [`RunHandle`] straight away.
//!
//! ## Run Lifecycle
//!
//! ```text
//! Idle -> Running -> Completed | Failed | Cancelled
//! ```
//!
//! - The scan (header resolution, collection, calculation) runs on a blocking
//!   worker and owns the input handle; the handle is closed before the run
//!   reports its outcome.
//! - A ticker on the async side sends a [`ProgressSnapshot`] every
//!   `progress_interval` while the scan is running. It shares nothing with the
//!   scan except the start instant, a line counter and the cancel flag.
//! - Exactly one terminal [`RunEvent`] is delivered, after which the ticker is
//!   gone. A cancelled run never yields a partial count.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use license_calc::pipeline::{Pipeline, RunOptions, RunOutcome};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = Pipeline::new(RunOptions::default());
//! let handle = pipeline.start(Path::new("inventory.csv"))?;
//!
//! if let RunOutcome::Completed(report) = handle.wait().await {
//!     println!("Total license needed: {}", report.total_licenses);
//! }
//! # Ok(())
//! # }
//! ```

use crate::calculator;
use crate::collector::collect_installs;
use crate::config::ScanConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::header::{resolve_app_id_column, ColumnResolution};
use crate::logging::new_run_id;
use crate::models::LicenseReport;
use crate::parser::RowParser;
use crate::progress::{CancelFlag, LineCounter, ProgressSnapshot};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};

const EVENT_CHANNEL_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    Progress(ProgressSnapshot),
    Completed(LicenseReport),
    /// Human-readable reason, the I/O message verbatim where there is one.
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(LicenseReport),
    Failed(String),
    Cancelled,
}

impl RunOutcome {
    pub fn total_licenses(&self) -> Option<u64> {
        match self {
            RunOutcome::Completed(report) => Some(report.total_licenses),
            _ => None,
        }
    }
}

/// Caller-side hooks for a run. Progress arrives roughly once per
/// `progress_interval`; exactly one of the other methods is called last.
pub trait RunObserver {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot);
    fn on_complete(&mut self, report: &LicenseReport);
    fn on_error(&mut self, message: &str);
    fn on_cancelled(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target_app_id: i64,
    pub app_id_column: String,
    pub delimiter: char,
    pub fallback_column: usize,
    pub progress_interval: Duration,
    pub cancel_check_lines: usize,
    pub buffer_size: usize,
    pub per_user: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_scan_config(&ScanConfig::default())
    }
}

impl RunOptions {
    pub fn from_scan_config(scan: &ScanConfig) -> Self {
        Self {
            target_app_id: scan.target_app_id,
            app_id_column: scan.app_id_column.clone(),
            delimiter: scan.delimiter_char(),
            fallback_column: scan.fallback_column,
            progress_interval: Duration::from_millis(scan.progress_interval_ms.max(1)),
            cancel_check_lines: scan.cancel_check_lines.max(1),
            buffer_size: scan.buffer_size_kb.max(1) * 1024,
            per_user: false,
        }
    }
}

/// Check that `path` names an existing regular file.
pub fn select_input(path: &Path) -> PipelineResult<PathBuf> {
    if !path.exists() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(PipelineError::NotAFile(path.to_path_buf()));
    }

    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        warn!(path = %path.display(), "Input does not have a .csv extension");
    }

    Ok(path.to_path_buf())
}

/// Validate `path` and resolve its application id column without scanning
/// the data rows.
pub fn inspect_header(path: &Path, options: &RunOptions) -> PipelineResult<ColumnResolution> {
    let path = select_input(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    read_header(&mut reader, options)
}

fn read_header<R: BufRead>(reader: &mut R, options: &RunOptions) -> PipelineResult<ColumnResolution> {
    let mut header = Vec::new();
    if reader.read_until(b'\n', &mut header)? == 0 {
        return Err(PipelineError::EmptyInput);
    }
    let header = String::from_utf8_lossy(&header);

    Ok(resolve_app_id_column(
        header.trim_end_matches(['\n', '\r']),
        options.delimiter,
        &options.app_id_column,
        options.fallback_column,
    ))
}

pub struct Pipeline {
    options: RunOptions,
}

impl Pipeline {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Validate `path` and start scanning it. A missing path fails here and
    /// the run never enters `Running`. Must be called inside a tokio runtime.
    pub fn start(&self, path: &Path) -> PipelineResult<RunHandle> {
        let path = select_input(path)?;
        Ok(self.launch(move || File::open(path)))
    }

    /// Start a run over an already opened source.
    pub fn start_reader<R>(&self, reader: R) -> RunHandle
    where
        R: Read + Send + 'static,
    {
        self.launch(move || Ok(reader))
    }

    fn launch<R, F>(&self, open: F) -> RunHandle
    where
        R: Read + 'static,
        F: FnOnce() -> io::Result<R> + Send + 'static,
    {
        let options = self.options.clone();
        let run_id = new_run_id();
        let span = crate::run_span!(run_id, target_app_id = options.target_app_id);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        let cancel = CancelFlag::new();
        let counter = LineCounter::new();
        let started = Instant::now();

        state_tx.send_replace(RunState::Running);

        let scan = {
            let span = span.clone();
            let options = options.clone();
            let cancel = cancel.clone();
            let counter = counter.clone();
            tokio::task::spawn_blocking(move || {
                let _enter = span.enter();
                info!("Starting inventory scan");
                scan_source(open, &options, &cancel, &counter, started)
            })
        };

        let interval = options.progress_interval;
        let ticker_counter = counter.clone();
        tokio::spawn(
            async move {
                let mut scan = scan;
                let mut ticker =
                    tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                let joined = loop {
                    tokio::select! {
                        biased;
                        joined = &mut scan => break joined,
                        _ = ticker.tick() => {
                            let snapshot = ProgressSnapshot {
                                elapsed: started.elapsed(),
                                lines_scanned: ticker_counter.get(),
                            };
                            // A slow consumer loses ticks, never the outcome.
                            let _ = event_tx.try_send(RunEvent::Progress(snapshot));
                        }
                    }
                };

                let (state, event) = match joined {
                    Ok(Ok(report)) => (RunState::Completed, RunEvent::Completed(report)),
                    Ok(Err(PipelineError::Cancelled)) => {
                        info!("Run cancelled, partial results discarded");
                        (RunState::Cancelled, RunEvent::Cancelled)
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "Run failed");
                        (RunState::Failed, RunEvent::Failed(e.to_string()))
                    }
                    Err(join_err) => {
                        let e = PipelineError::Task(join_err.to_string());
                        error!(error = %e, "Run failed");
                        (RunState::Failed, RunEvent::Failed(e.to_string()))
                    }
                };

                state_tx.send_replace(state);
                if event_tx.send(event).await.is_err() {
                    debug!("Run handle dropped before the outcome was delivered");
                }
            }
            .instrument(span),
        );

        RunHandle {
            run_id,
            events: event_rx,
            state: state_rx,
            cancel,
            counter,
            started,
        }
    }
}

fn scan_source<R, F>(
    open: F,
    options: &RunOptions,
    cancel: &CancelFlag,
    counter: &LineCounter,
    started: Instant,
) -> PipelineResult<LicenseReport>
where
    R: Read,
    F: FnOnce() -> io::Result<R>,
{
    let mut reader = BufReader::with_capacity(options.buffer_size, open()?);
    let column = read_header(&mut reader, options)?;

    if column.fallback {
        warn!(
            column_name = %options.app_id_column,
            fallback_column = column.index,
            "Application id column not found in header, using fallback column"
        );
    } else {
        debug!(app_id_column = column.index, "Resolved application id column");
    }

    let parser = RowParser::new(column.index, options.target_app_id, options.delimiter);
    // The reader moves into the collector and is closed when it returns.
    let collection = collect_installs(
        reader,
        parser,
        cancel,
        counter,
        options.cancel_check_lines,
    )?;

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let records = &collection.records;
    let total_licenses = calculator::calculate(records);
    let users = records.iter().map(|r| r.user_id).collect::<HashSet<_>>().len();
    let per_user = options.per_user.then(|| calculator::breakdown(records));

    let report = LicenseReport {
        target_app_id: options.target_app_id,
        total_licenses,
        users,
        records: records.len(),
        lines_scanned: collection.stats.lines_scanned,
        rows_skipped: collection.stats.rows_skipped,
        duplicates: collection.stats.duplicates,
        app_id_column: column.index,
        header_fallback: column.fallback,
        elapsed: started.elapsed(),
        per_user,
    };

    info!(
        total_licenses = report.total_licenses,
        users = report.users,
        records = report.records,
        lines_scanned = report.lines_scanned,
        rows_skipped = report.rows_skipped,
        duplicates = report.duplicates,
        "Scan complete"
    );

    Ok(report)
}

/// Caller's grip on a running scan. Dropping it requests cancellation.
pub struct RunHandle {
    run_id: String,
    events: mpsc::Receiver<RunEvent>,
    state: watch::Receiver<RunState>,
    cancel: CancelFlag,
    counter: LineCounter,
    started: Instant,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Ask the scan to stop. The run ends `Cancelled` unless it had already
    /// finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Flag that cancels this run, for use from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            elapsed: self.started.elapsed(),
            lines_scanned: self.counter.get(),
        }
    }

    /// Next progress or terminal event; `None` once the run is over.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    pub async fn wait(self) -> RunOutcome {
        self.drive(&mut ()).await
    }

    pub async fn drive<O: RunObserver>(mut self, observer: &mut O) -> RunOutcome {
        while let Some(event) = self.events.recv().await {
            match event {
                RunEvent::Progress(snapshot) => observer.on_progress(&snapshot),
                RunEvent::Completed(report) => {
                    observer.on_complete(&report);
                    return RunOutcome::Completed(report);
                }
                RunEvent::Failed(message) => {
                    observer.on_error(&message);
                    return RunOutcome::Failed(message);
                }
                RunEvent::Cancelled => {
                    observer.on_cancelled();
                    return RunOutcome::Cancelled;
                }
            }
        }

        let message = PipelineError::Task("run ended without an outcome".to_string()).to_string();
        observer.on_error(&message);
        RunOutcome::Failed(message)
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            debug!(run_id = %self.run_id, "Run handle dropped, cancelling");
            self.cancel.cancel();
        }
    }
}

/// Observer that ignores everything; used by [`RunHandle::wait`].
impl RunObserver for () {
    fn on_progress(&mut self, _snapshot: &ProgressSnapshot) {}
    fn on_complete(&mut self, _report: &LicenseReport) {}
    fn on_error(&mut self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn options() -> RunOptions {
        RunOptions {
            progress_interval: Duration::from_millis(10),
            ..RunOptions::default()
        }
    }

    fn scan(data: &str) -> PipelineResult<LicenseReport> {
        scan_source(
            || Ok(Cursor::new(data.as_bytes().to_vec())),
            &options(),
            &CancelFlag::new(),
            &LineCounter::new(),
            Instant::now(),
        )
    }

    #[test]
    fn test_scan_reports_totals() {
        let report = scan(
            "computerid,userid,dept,type,applicationid\n\
             1,1,a,computer,374\n\
             2,1,a,laptop,374\n\
             3,1,a,laptop,374\n\
             4,1,a,laptop,374\n\
             5,2,b,laptop,374\n\
             6,3,b,laptop,999\n",
        )
        .unwrap();
        assert_eq!(report.total_licenses, 3);
        assert_eq!(report.users, 2);
        assert_eq!(report.records, 5);
        assert_eq!(report.lines_scanned, 6);
        assert_eq!(report.app_id_column, 4);
        assert!(!report.header_fallback);
        assert!(report.per_user.is_none());
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(scan(""), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn test_header_only() {
        let report = scan("computerid,userid,dept,type,applicationid\n").unwrap();
        assert_eq!(report.total_licenses, 0);
        assert_eq!(report.users, 0);
    }

    #[test]
    fn test_open_failure_is_io() {
        let err = scan_source(
            || -> io::Result<Cursor<Vec<u8>>> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "Access denied"))
            },
            &options(),
            &CancelFlag::new(),
            &LineCounter::new(),
            Instant::now(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Access denied");
    }

    #[test]
    fn test_state_terminal() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
    }

    #[tokio::test]
    async fn test_start_reader_completes() {
        let data = "computerid,userid,x,type,applicationid\n1,10,,computer,374\n2,10,,laptop,374\n";
        let handle = Pipeline::new(options()).start_reader(Cursor::new(data.as_bytes().to_vec()));
        let outcome = handle.wait().await;
        assert_eq!(outcome.total_licenses(), Some(1));
    }

    #[tokio::test]
    async fn test_missing_path_never_runs() {
        let err = Pipeline::new(options())
            .start(Path::new("/definitely/not/here.csv"))
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InputNotFound(_)));
    }
}
