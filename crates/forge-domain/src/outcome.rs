//! Outcome module - the result of processing one task

use crate::{ErrorKind, Payload, TaskId};

/// Result of processing a [`crate::Task`]
///
/// Immutable once produced. Both variants mark the task as processed: a
/// Failure is recorded in the checkpoint just like a Success so it is not
/// retried automatically on resume.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The transformer produced a result
    Success {
        /// Task this outcome belongs to
        task_id: TaskId,
        /// Transformed record
        transformed_payload: Payload,
    },

    /// The task gave up (terminal error or retries exhausted)
    Failure {
        /// Task this outcome belongs to
        task_id: TaskId,
        /// Last observed error classification
        error_kind: ErrorKind,
        /// Number of attempts made before giving up
        attempts_made: u32,
        /// Detail of the last error
        message: String,
    },
}

impl Outcome {
    /// Id of the task this outcome belongs to
    pub fn task_id(&self) -> &TaskId {
        match self {
            Outcome::Success { task_id, .. } | Outcome::Failure { task_id, .. } => task_id,
        }
    }

    /// Whether this is a Success
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}
