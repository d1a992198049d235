use std::path::PathBuf;
use thiserror::Error;

/// Terminal failures of a license run.
///
/// Row-level problems never show up here; they are counted and skipped by
/// the collector.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("File does not exist: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("Input is empty: no header line found")]
    EmptyInput,
    /// Passes the underlying message through unchanged.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("Run was cancelled")]
    Cancelled,
    #[error("Background task failed: {0}")]
    Task(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_message_is_verbatim() {
        let err = PipelineError::from(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn test_not_found_names_path() {
        let err = PipelineError::InputNotFound(PathBuf::from("/tmp/missing.csv"));
        assert_eq!(err.to_string(), "File does not exist: /tmp/missing.csv");
    }
}
