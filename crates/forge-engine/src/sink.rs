//! Result sink: the output and error log files
//!
//! Every outcome becomes exactly one JSON line. Successes go to the output
//! file as `{"id": ..., "output": ...}`; failures go to the error log with
//! their classification and attempt count.

use crate::EngineError;
use forge_domain::{ErrorKind, Outcome, Payload, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Line written to the output file for a Success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Task id
    pub id: TaskId,
    /// Transformed payload
    pub output: Payload,
}

/// Line written to the error log for a Failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Task id
    pub task_id: TaskId,
    /// Last observed classification
    pub error_kind: ErrorKind,
    /// Attempts made before giving up
    pub attempts_made: u32,
    /// Last error detail
    pub message: String,
    /// Unix timestamp (seconds) when the failure was recorded
    pub timestamp: u64,
}

/// Ids found in existing result files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveredIds {
    /// Ids with a line in the output file
    pub succeeded: BTreeSet<TaskId>,
    /// Ids with a line in the error log
    pub failed: BTreeSet<TaskId>,
}

impl RecoveredIds {
    /// Total number of distinct ids recovered
    pub fn len(&self) -> usize {
        self.succeeded.union(&self.failed).count()
    }

    /// Whether nothing was recovered
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }
}

struct SinkFiles {
    output: BufWriter<File>,
    errors: BufWriter<File>,
}

/// Append-only writer for outcomes
///
/// Writers are serialized through a mutex; each outcome is encoded fully
/// before the lock is taken and written as one line.
pub struct ResultSink {
    output_path: PathBuf,
    error_path: PathBuf,
    files: Mutex<SinkFiles>,
}

impl ResultSink {
    /// Create both files, truncating any previous content (fresh run)
    pub fn create(output: impl Into<PathBuf>, error_log: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let output_path = output.into();
        let error_path = error_log.into();
        let open = |path: &Path| -> Result<File, EngineError> {
            ensure_parent(path)?;
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .map_err(|e| EngineError::io(path, e))
        };
        let files = SinkFiles {
            output: BufWriter::new(open(&output_path)?),
            errors: BufWriter::new(open(&error_path)?),
        };
        Ok(Self {
            output_path,
            error_path,
            files: Mutex::new(files),
        })
    }

    /// Open both files for appending (resume)
    ///
    /// A torn trailing line left by a crash mid-write is truncated first.
    pub fn open_append(
        output: impl Into<PathBuf>,
        error_log: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        let output_path = output.into();
        let error_path = error_log.into();
        let open = |path: &Path| -> Result<File, EngineError> {
            ensure_parent(path)?;
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)
                .map_err(|e| EngineError::io(path, e))?;
            let removed = repair_tail(&file).map_err(|e| EngineError::io(path, e))?;
            if removed > 0 {
                warn!(path = %path.display(), bytes = removed, "Truncated torn trailing record");
            }
            Ok(file)
        };
        let files = SinkFiles {
            output: BufWriter::new(open(&output_path)?),
            errors: BufWriter::new(open(&error_path)?),
        };
        Ok(Self {
            output_path,
            error_path,
            files: Mutex::new(files),
        })
    }

    /// Write one outcome as a single line
    pub fn append(&self, outcome: &Outcome) -> Result<(), EngineError> {
        match outcome {
            Outcome::Success {
                task_id,
                transformed_payload,
            } => {
                let line = encode_line(&OutputRecord {
                    id: task_id.clone(),
                    output: transformed_payload.clone(),
                })?;
                let mut files = self.lock();
                write_line(&mut files.output, &line).map_err(|e| EngineError::io(&self.output_path, e))
            }
            Outcome::Failure {
                task_id,
                error_kind,
                attempts_made,
                message,
            } => {
                let line = encode_line(&ErrorRecord {
                    task_id: task_id.clone(),
                    error_kind: *error_kind,
                    attempts_made: *attempts_made,
                    message: message.clone(),
                    timestamp: unix_now(),
                })?;
                let mut files = self.lock();
                write_line(&mut files.errors, &line).map_err(|e| EngineError::io(&self.error_path, e))
            }
        }
    }

    /// Flush buffers and fsync both files
    pub fn sync(&self) -> Result<(), EngineError> {
        let mut files = self.lock();
        files
            .output
            .flush()
            .and_then(|_| files.output.get_ref().sync_data())
            .map_err(|e| EngineError::io(&self.output_path, e))?;
        files
            .errors
            .flush()
            .and_then(|_| files.errors.get_ref().sync_data())
            .map_err(|e| EngineError::io(&self.error_path, e))?;
        Ok(())
    }

    /// Scan both files for ids that already have an outcome
    pub fn recover_ids(&self) -> Result<RecoveredIds, EngineError> {
        // Pending buffered writes must be visible to the scan
        {
            let mut files = self.lock();
            files.output.flush().map_err(|e| EngineError::io(&self.output_path, e))?;
            files.errors.flush().map_err(|e| EngineError::io(&self.error_path, e))?;
        }

        let succeeded = scan_ids::<OutputRecord>(&self.output_path, |r| r.id)?;
        let failed = scan_ids::<ErrorRecord>(&self.error_path, |r| r.task_id)?;
        debug!(
            succeeded = succeeded.len(),
            failed = failed.len(),
            "Recovered ids from result files"
        );
        Ok(RecoveredIds { succeeded, failed })
    }

    /// Output file location
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Error log location
    pub fn error_log_path(&self) -> &Path {
        &self.error_path
    }

    fn lock(&self) -> MutexGuard<'_, SinkFiles> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_parent(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn encode_line<T: Serialize>(record: &T) -> Result<Vec<u8>, EngineError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

fn write_line(writer: &mut BufWriter<File>, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    writer.flush()
}

/// Cut the file back to just after its last newline
///
/// Returns the number of bytes removed.
fn repair_tail(mut file: &File) -> io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    const CHUNK: u64 = 4096;
    let mut end = len;
    let mut buf = vec![0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let n = (end - start) as usize;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf[..n])?;
        if let Some(pos) = buf[..n].iter().rposition(|&b| b == b'\n') {
            let keep = start + pos as u64 + 1;
            if keep < len {
                file.set_len(keep)?;
            }
            return Ok(len - keep);
        }
        end = start;
    }

    // No newline at all: the whole file is one torn record
    file.set_len(0)?;
    Ok(len)
}

fn scan_ids<T: for<'de> Deserialize<'de>>(
    path: &Path,
    id_of: impl Fn(T) -> TaskId,
) -> Result<BTreeSet<TaskId>, EngineError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(EngineError::io(path, e)),
    };

    let mut ids = BTreeSet::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| EngineError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => {
                ids.insert(id_of(record));
            }
            Err(e) => {
                warn!(path = %path.display(), line = index + 1, error = %e, "Skipping unreadable result line");
            }
        }
    }
    Ok(ids)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
