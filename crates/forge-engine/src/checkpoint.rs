//! Durable checkpoint persistence
//!
//! The checkpoint file is replaced wholesale on every flush: the new
//! snapshot is written to a temporary file in the same directory, fsynced,
//! then renamed over the old one. A reader therefore sees either the
//! previous snapshot or the new one, never a partial write.

use crate::sink::RecoveredIds;
use crate::EngineError;
use forge_domain::{CheckpointState, RunStats, TaskId, CHECKPOINT_SCHEMA_VERSION};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Owner of the checkpoint file for one run
///
/// Only the pool's collector mutates the store, so it needs no locking.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
    unflushed: u64,
}

impl CheckpointStore {
    /// Open a store, loading any existing snapshot (resume)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load(&path);
        Self {
            path,
            state,
            unflushed: 0,
        }
    }

    /// Open a store that ignores any existing snapshot (fresh run)
    pub fn fresh(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: CheckpointState::new(),
            unflushed: 0,
        }
    }

    /// Read a snapshot from disk
    ///
    /// A missing, unreadable or incompatible file yields an empty state.
    /// This never fails: the worst case is reprocessing work.
    pub fn load(path: impl AsRef<Path>) -> CheckpointState {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No checkpoint found, starting empty");
                return CheckpointState::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint unreadable, starting empty");
                return CheckpointState::new();
            }
        };

        match serde_json::from_str::<CheckpointState>(&content) {
            Ok(state) if state.schema_version == CHECKPOINT_SCHEMA_VERSION => {
                info!(
                    path = %path.display(),
                    completed = state.len(),
                    "Loaded checkpoint"
                );
                state
            }
            Ok(state) => {
                warn!(
                    path = %path.display(),
                    found = state.schema_version,
                    expected = CHECKPOINT_SCHEMA_VERSION,
                    "Checkpoint schema mismatch, starting empty"
                );
                CheckpointState::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint corrupt, starting empty");
                CheckpointState::new()
            }
        }
    }

    /// Record a processed task in memory
    ///
    /// Must only be called after the task's outcome is in the result sink.
    /// Returns `false` if the id was already recorded.
    pub fn record(&mut self, id: TaskId, success: bool) -> bool {
        let added = self.state.mark_completed(id, success);
        if added {
            self.unflushed += 1;
        }
        added
    }

    /// Adopt ids that reached the result files but not the checkpoint
    ///
    /// Covers a crash between appending an outcome and the next flush.
    /// Returns how many ids were adopted.
    pub fn reconcile(&mut self, recovered: &RecoveredIds) -> u64 {
        let mut adopted = 0;
        for id in &recovered.succeeded {
            if self.record(id.clone(), true) {
                adopted += 1;
            }
        }
        for id in &recovered.failed {
            if self.record(id.clone(), false) {
                adopted += 1;
            }
        }
        if adopted > 0 {
            info!(adopted, "Adopted results written after the last checkpoint");
        }
        adopted
    }

    /// Persist the current state atomically
    pub fn flush(&mut self) -> Result<(), EngineError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;

        self.state.updated_at = unix_now();
        let json = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| EngineError::Checkpoint(format!("Failed to encode checkpoint: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| EngineError::io(&dir, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| EngineError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| EngineError::io(&self.path, e.error))?;

        debug!(
            path = %self.path.display(),
            completed = self.state.len(),
            "Checkpoint flushed"
        );
        self.unflushed = 0;
        Ok(())
    }

    /// Delete the checkpoint file and reset the in-memory state
    pub fn clear(&mut self) -> Result<(), EngineError> {
        Self::remove(&self.path)?;
        self.state = CheckpointState::new();
        self.unflushed = 0;
        Ok(())
    }

    /// Delete a checkpoint file if it exists
    ///
    /// Returns whether a file was removed.
    pub fn remove(path: impl AsRef<Path>) -> Result<bool, EngineError> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "Checkpoint cleared");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::io(path, e)),
        }
    }

    /// Records since the last flush
    pub fn unflushed(&self) -> u64 {
        self.unflushed
    }

    /// Current in-memory state
    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Aggregate counters
    pub fn stats(&self) -> RunStats {
        self.state.stats
    }

    /// Checkpoint file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tasks left out of `total`
    pub fn remaining(&self, total: u64) -> u64 {
        total.saturating_sub(self.state.len() as u64)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
