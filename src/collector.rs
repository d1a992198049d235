//! Install Collection
//!
//! Streams the data lines of an inventory file through a [`RowParser`] and
//! keeps every distinct install of the target application.
//!
//! ## Processing Pipeline
//!
//! 1. **Reading**: one line at a time into a reused buffer; invalid UTF-8 is
//!    replaced rather than rejected
//! 2. **Parsing**: rows for other applications are dropped, malformed target
//!    rows are counted and skipped
//! 3. **Deduplication**: records are keyed by all three fields in a hash set,
//!    first occurrence wins
//!
//! I/O errors end the scan and are returned as-is. Row problems never do.

use crate::error::{PipelineError, PipelineResult};
use crate::models::InstallRecord;
use crate::parser::{RowOutcome, RowParser};
use crate::progress::{CancelFlag, LineCounter};
use std::collections::HashSet;
use std::io::BufRead;

/// Counters gathered during one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub lines_scanned: u64,
    pub rows_skipped: u64,
    pub duplicates: u64,
}

/// Distinct installs in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub records: Vec<InstallRecord>,
    pub stats: CollectStats,
}

pub struct InstallCollector {
    parser: RowParser,
    seen: HashSet<InstallRecord>,
    records: Vec<InstallRecord>,
    stats: CollectStats,
}

impl InstallCollector {
    pub fn new(parser: RowParser) -> Self {
        Self {
            parser,
            seen: HashSet::new(),
            records: Vec::new(),
            stats: CollectStats::default(),
        }
    }

    pub fn process_line(&mut self, line: &str) {
        self.stats.lines_scanned += 1;

        if line.trim().is_empty() {
            return;
        }

        match self.parser.classify_line(line) {
            RowOutcome::Install(record) => {
                if self.seen.contains(&record) {
                    self.stats.duplicates += 1;
                } else {
                    self.seen.insert(record.clone());
                    self.records.push(record);
                }
            }
            RowOutcome::Malformed => {
                self.stats.rows_skipped += 1;
                tracing::trace!(
                    line_number = self.stats.lines_scanned + 1,
                    "Skipping malformed row"
                );
            }
            RowOutcome::NotTarget => {}
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> Collection {
        Collection {
            records: self.records,
            stats: self.stats,
        }
    }
}

/// Read every remaining line of `reader`; the header must already be
/// consumed. `cancel` is polled every `check_every` lines.
pub fn collect_installs<R: BufRead>(
    mut reader: R,
    parser: RowParser,
    cancel: &CancelFlag,
    counter: &LineCounter,
    check_every: usize,
) -> PipelineResult<Collection> {
    let check_every = check_every.max(1) as u64;
    let mut collector = InstallCollector::new(parser);
    let mut buf = Vec::with_capacity(256);
    let mut read = 0u64;

    loop {
        if read % check_every == 0 && cancel.is_cancelled() {
            tracing::debug!(lines_scanned = read, "Scan cancelled");
            return Err(PipelineError::Cancelled);
        }

        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        read += 1;
        counter.increment();

        let line = String::from_utf8_lossy(&buf);
        collector.process_line(line.trim_end_matches(['\n', '\r']));
    }

    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    fn parser() -> RowParser {
        RowParser::new(4, 374, ',')
    }

    fn collect(data: &str) -> PipelineResult<Collection> {
        collect_installs(
            Cursor::new(data.as_bytes().to_vec()),
            parser(),
            &CancelFlag::new(),
            &LineCounter::new(),
            16,
        )
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let result = collect("1,10,,computer,374\n1,10,,Computer,374\n2,10,,laptop,374\n").unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.stats.duplicates, 1);
        assert_eq!(result.stats.lines_scanned, 3);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let result = collect("5,1,,laptop,374\n3,1,,computer,374\n5,1,,laptop,374\n").unwrap();
        let ids: Vec<i64> = result.records.iter().map(|r| r.computer_id).collect();
        assert_eq!(ids, vec![5, 3]);
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let result = collect("1,10,,computer,1\n2,10,,laptop,2\n").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.stats.rows_skipped, 0);
    }

    #[test]
    fn test_malformed_rows_are_counted() {
        let result = collect("bad,10,,laptop,374\n1,10,,laptop,374\n\n1,10\n").unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.stats.rows_skipped, 1);
    }

    #[test]
    fn test_last_line_without_newline() {
        let result = collect("1,10,,computer,374\r\n2,10,,laptop,374").unwrap();
        assert_eq!(result.records.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_does_not_abort() {
        let mut data = b"1,10,,comp\xffuter,374\n".to_vec();
        data.extend_from_slice(b"2,10,,laptop,374\n");
        let result = collect_installs(
            Cursor::new(data),
            parser(),
            &CancelFlag::new(),
            &LineCounter::new(),
            16,
        )
        .unwrap();
        assert_eq!(result.records.len(), 2);
    }

    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.data.read(buf)?;
            if n == 0 {
                Err(io::Error::new(io::ErrorKind::Other, "device unplugged"))
            } else {
                Ok(n)
            }
        }
    }

    #[test]
    fn test_io_error_is_propagated() {
        let reader = io::BufReader::new(FailingReader {
            data: Cursor::new(b"1,10,,computer,374\n".to_vec()),
        });
        let err = collect_installs(reader, parser(), &CancelFlag::new(), &LineCounter::new(), 16)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(err.to_string(), "device unplugged");
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = collect_installs(
            Cursor::new(b"1,10,,computer,374\n".to_vec()),
            parser(),
            &cancel,
            &LineCounter::new(),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[test]
    fn test_counter_tracks_lines() {
        let counter = LineCounter::new();
        collect_installs(
            Cursor::new(b"a\nb\nc\n".to_vec()),
            parser(),
            &CancelFlag::new(),
            &counter,
            16,
        )
        .unwrap();
        assert_eq!(counter.get(), 3);
    }
}
