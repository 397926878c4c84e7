//! Error types for engine operations

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a run
///
/// Per-task failures never show up here; they are captured in
/// [`forge_domain::Outcome::Failure`] and the run continues.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration (rejected before any task is dispatched)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file does not exist
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Filesystem error on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was performed on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Input stream could not be read
    #[error("Failed to read input at line {line}: {source}")]
    Input {
        /// 1-based line number
        line: u64,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Checkpoint could not be persisted
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Result sink could not write a record
    #[error("Result sink error: {0}")]
    Sink(String),

    /// A worker task panicked instead of producing a result
    #[error("Worker error: {0}")]
    Worker(String),
}

impl EngineError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Sink(format!("JSON encoding failed: {}", e))
    }
}
