//! Checkpoint state - durable snapshot of run progress
//!
//! The state is a plain value; persisting it is the job of the engine's
//! checkpoint store. Snapshots are replaced wholesale on every flush, never
//! edited in place.

use crate::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Schema version written into every checkpoint file
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Aggregate counters for a (possibly resumed) run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Tasks with a durable Outcome
    pub processed_count: u64,

    /// Tasks that ended in Success
    pub success_count: u64,

    /// Tasks that ended in Failure
    pub failure_count: u64,
}

impl RunStats {
    /// Count one processed task
    pub fn record(&mut self, success: bool) {
        self.processed_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    /// Fraction of processed tasks that succeeded (1.0 when nothing processed)
    pub fn success_rate(&self) -> f64 {
        if self.processed_count == 0 {
            1.0
        } else {
            self.success_count as f64 / self.processed_count as f64
        }
    }
}

/// Persisted snapshot of which tasks are done
///
/// Invariant: `completed_ids` only ever grows during a run, and an id is
/// only added after its Outcome has been durably written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Format version of this snapshot
    pub schema_version: u32,

    /// Ids of fully processed tasks
    pub completed_ids: BTreeSet<TaskId>,

    /// Aggregate counters
    pub stats: RunStats,

    /// Unix timestamp (seconds) of the last flush
    #[serde(default)]
    pub updated_at: u64,
}

impl CheckpointState {
    /// Empty state for a fresh run
    pub fn new() -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            completed_ids: BTreeSet::new(),
            stats: RunStats::default(),
            updated_at: 0,
        }
    }

    /// Whether the given task is already done
    pub fn is_completed(&self, id: &TaskId) -> bool {
        self.completed_ids.contains(id)
    }

    /// Mark a task as done and update stats
    ///
    /// Returns `false` (and changes nothing) if the id was already recorded.
    pub fn mark_completed(&mut self, id: TaskId, success: bool) -> bool {
        if !self.completed_ids.insert(id) {
            return false;
        }
        self.stats.record(success);
        true
    }

    /// Number of completed tasks
    pub fn len(&self) -> usize {
        self.completed_ids.len()
    }

    /// Whether no task has completed yet
    pub fn is_empty(&self) -> bool {
        self.completed_ids.is_empty()
    }
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}
