//! Task module - the unit of work handed to workers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Record fields needed to build one external request
pub type Payload = serde_json::Value;

/// Stable identifier of a task
///
/// Derived either from the record's position in the input stream (1-based
/// line number) or from an id field carried by the record itself. The same
/// input always produces the same ids, which is what makes resume idempotent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a TaskId from any string-like value
    ///
    /// # Examples
    ///
    /// ```
    /// use forge_domain::TaskId;
    ///
    /// let id = TaskId::new("record-42");
    /// assert_eq!(id.as_str(), "record-42");
    /// ```
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a TaskId from a 1-based input position
    ///
    /// # Examples
    ///
    /// ```
    /// use forge_domain::TaskId;
    ///
    /// assert_eq!(TaskId::from_position(7).as_str(), "7");
    /// ```
    pub fn from_position(position: u64) -> Self {
        Self(position.to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One unit of transformation work
///
/// Tasks are never mutated once created. A retry is described by a new
/// attempt context (see [`Task::next_attempt`]), the identity and payload
/// stay the same.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Stable identifier
    pub id: TaskId,

    /// Record fields needed to build the external request
    pub payload: Payload,

    /// Number of attempts already made for this task in the current run
    pub attempt_count: u32,
}

impl Task {
    /// Create a fresh task with no attempts made
    pub fn new(id: TaskId, payload: Payload) -> Self {
        Self {
            id,
            payload,
            attempt_count: 0,
        }
    }

    /// Attempt context for the next try of this task
    pub fn next_attempt(&self) -> Self {
        Self {
            id: self.id.clone(),
            payload: self.payload.clone(),
            attempt_count: self.attempt_count + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_id_ordering() {
        let a = TaskId::new("a");
        let b = TaskId::new("b");
        assert!(a < b);
    }

    #[test]
    fn test_task_id_serializes_as_plain_string() {
        let id = TaskId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let task = Task::new(TaskId::from_position(3), json!({"english": "hi"}));
        let retry = task.next_attempt();

        assert_eq!(task.attempt_count, 0);
        assert_eq!(retry.attempt_count, 1);
        assert_eq!(retry.id, task.id);
        assert_eq!(retry.payload, task.payload);
    }
}
