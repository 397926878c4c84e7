//! Task enumeration over a JSON-lines input file

use crate::EngineError;
use forge_domain::{Payload, Task, TaskId};
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// How a record's [`TaskId`] is derived
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// 1-based line number in the input file
    #[default]
    Position,
    /// Value of a top-level field of the record
    ///
    /// Records missing the field fall back to `line-{n}`.
    Field(String),
}

impl IdStrategy {
    /// Strategy for an optional id field name
    pub fn from_field(field: Option<&str>) -> Self {
        match field {
            Some(name) => IdStrategy::Field(name.to_string()),
            None => IdStrategy::Position,
        }
    }

    fn derive(&self, line: u64, record: Option<&Payload>) -> TaskId {
        let IdStrategy::Field(name) = self else {
            return TaskId::from_position(line);
        };
        match record.and_then(|r| r.get(name)) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => TaskId::new(s.as_str()),
            Some(serde_json::Value::Number(n)) => TaskId::new(n.to_string()),
            _ => TaskId::new(format!("line-{}", line)),
        }
    }
}

/// Errors produced while enumerating tasks
#[derive(Error, Debug)]
pub enum SourceError {
    /// The record could not be parsed; it becomes a Failure outcome
    #[error("Malformed record {id}: {reason}")]
    Malformed {
        /// Id the record would have had
        id: TaskId,
        /// Parse error detail
        reason: String,
    },

    /// The file itself could not be read; aborts the run
    #[error("Failed to read input at line {line}: {source}")]
    Read {
        /// 1-based line number
        line: u64,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Read { line, source } => EngineError::Input { line, source },
            SourceError::Malformed { id, reason } => EngineError::Input {
                line: 0,
                source: io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", id, reason)),
            },
        }
    }
}

/// Lazy iterator over the tasks that still need processing
///
/// Yields tasks in input order, skipping blank lines, ids already in the
/// completed set and later duplicates of an id seen earlier in the file.
/// Opening the same file against the same completed set always yields the
/// same sequence.
pub struct TaskSource {
    lines: io::Split<BufReader<File>>,
    strategy: IdStrategy,
    completed: BTreeSet<TaskId>,
    seen: HashSet<TaskId>,
    line: u64,
    skipped: u64,
    duplicates: u64,
}

impl TaskSource {
    /// Open an input file
    pub fn open(
        path: impl AsRef<Path>,
        strategy: IdStrategy,
        completed: BTreeSet<TaskId>,
    ) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EngineError::InputNotFound(path.to_path_buf()),
            _ => EngineError::io(path, e),
        })?;

        debug!(path = %path.display(), completed = completed.len(), "Opened task source");

        Ok(Self {
            lines: BufReader::new(file).split(b'\n'),
            strategy,
            completed,
            seen: HashSet::new(),
            line: 0,
            skipped: 0,
            duplicates: 0,
        })
    }

    /// Records skipped because they were already completed
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Records skipped because their id appeared earlier in the input
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Returns `true` the first time an id is seen
    fn first_sighting(&mut self, id: &TaskId) -> bool {
        if self.seen.insert(id.clone()) {
            return true;
        }
        self.duplicates += 1;
        warn!(task_id = %id, line = self.line, "Duplicate task id in input, skipping");
        false
    }
}

impl Iterator for TaskSource {
    type Item = Result<Task, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let bytes = match self.lines.next()? {
                Ok(bytes) => bytes,
                Err(source) => {
                    return Some(Err(SourceError::Read {
                        line: self.line + 1,
                        source,
                    }))
                }
            };
            self.line += 1;

            let bytes = bytes.strip_suffix(b"\r").unwrap_or(&bytes[..]);
            let parsed = match std::str::from_utf8(bytes) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => serde_json::from_str::<Payload>(text).map_err(|e| e.to_string()),
                Err(e) => Err(format!("invalid UTF-8: {}", e)),
            };
            let id = self.strategy.derive(self.line, parsed.as_ref().ok());

            if !self.first_sighting(&id) {
                continue;
            }
            if self.completed.contains(&id) {
                self.skipped += 1;
                continue;
            }

            return Some(match parsed {
                Ok(payload) => Ok(Task::new(id, payload)),
                Err(reason) => Err(SourceError::Malformed { id, reason }),
            });
        }
    }
}

/// Count the tasks an input would yield against a completed set
///
/// Malformed records are counted; they still produce an Outcome.
pub fn count_pending(
    path: impl AsRef<Path>,
    strategy: &IdStrategy,
    completed: &BTreeSet<TaskId>,
) -> Result<u64, EngineError> {
    let mut count = 0;
    for item in TaskSource::open(path, strategy.clone(), completed.clone())? {
        match item {
            Ok(_) | Err(SourceError::Malformed { .. }) => count += 1,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(count)
}
