//! Per-task worker: rate limiting, timeout, classification and retry
//!
//! A task moves through an explicit state machine:
//!
//! ```text
//! Pending -> Attempting -> Succeeded
//!                |
//!                +-> Retrying(delay) -> Attempting ...
//!                |
//!                +-> Failed
//! ```
//!
//! Every attempt takes one rate-limit permit. A cancelled worker never
//! starts another attempt; the task is reported as abandoned and is picked
//! up again on resume.

use crate::{RateLimiter, RetryDecision, RetryPolicy};
use forge_domain::{ErrorKind, Outcome, Payload, Task, TaskId, TransformError, Transformer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a worker hands back to the pool
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResult {
    /// The task reached a final Outcome
    Completed(Outcome),
    /// Cancellation stopped the task before it finished
    Abandoned {
        /// Task that was abandoned
        task_id: TaskId,
        /// Attempts finished before cancellation
        attempts_made: u32,
    },
}

impl WorkerResult {
    /// Id of the task this result belongs to
    pub fn task_id(&self) -> &TaskId {
        match self {
            WorkerResult::Completed(outcome) => outcome.task_id(),
            WorkerResult::Abandoned { task_id, .. } => task_id,
        }
    }
}

enum TaskState {
    Pending(Task),
    Attempting(Task),
    Retrying {
        task: Task,
        delay: Duration,
        error: TransformError,
    },
    Succeeded {
        task: Task,
        output: Payload,
    },
    Failed {
        task: Task,
        error: TransformError,
    },
}

/// Processes single tasks against the transformer
///
/// Shared by all pool slots; holds only shared handles.
pub struct Worker {
    transformer: Arc<dyn Transformer>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl Worker {
    /// Create a worker
    pub fn new(
        transformer: Arc<dyn Transformer>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        call_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transformer,
            limiter,
            policy,
            call_timeout,
            cancel,
        }
    }

    /// Cancellation token observed by this worker
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Drive one task to an Outcome (or abandonment)
    ///
    /// Never fails: every error the transformer reports ends up in the
    /// returned Outcome.
    pub async fn process(&self, task: Task) -> WorkerResult {
        let mut state = TaskState::Pending(task);
        loop {
            state = match state {
                TaskState::Pending(task) => TaskState::Attempting(task.next_attempt()),

                TaskState::Attempting(task) => {
                    if !self.acquire_permit().await {
                        return abandon(task.id, task.attempt_count - 1);
                    }
                    match self.call(&task.payload).await {
                        Ok(output) => TaskState::Succeeded { task, output },
                        Err(error) => match self.policy.decide(error.kind, task.attempt_count) {
                            RetryDecision::Retry(delay) => TaskState::Retrying { task, delay, error },
                            RetryDecision::GiveUp => TaskState::Failed { task, error },
                        },
                    }
                }

                TaskState::Retrying { task, delay, error } => {
                    debug!(
                        task_id = %task.id,
                        attempt = task.attempt_count,
                        kind = %error.kind,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return abandon(task.id, task.attempt_count),
                        _ = tokio::time::sleep(delay) => TaskState::Attempting(task.next_attempt()),
                    }
                }

                TaskState::Succeeded { task, output } => {
                    debug!(task_id = %task.id, attempts = task.attempt_count, "Task succeeded");
                    return WorkerResult::Completed(Outcome::Success {
                        task_id: task.id,
                        transformed_payload: output,
                    });
                }

                TaskState::Failed { task, error } => {
                    warn!(
                        task_id = %task.id,
                        attempts = task.attempt_count,
                        kind = %error.kind,
                        error = %error.message,
                        "Task failed"
                    );
                    return WorkerResult::Completed(Outcome::Failure {
                        task_id: task.id,
                        error_kind: error.kind,
                        attempts_made: task.attempt_count,
                        message: error.message,
                    });
                }
            };
        }
    }

    /// Wait for a rate-limit permit; `false` if cancelled first
    async fn acquire_permit(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.limiter.acquire() => true,
        }
    }

    /// One transformer call under the per-call timeout
    async fn call(&self, payload: &Payload) -> Result<Payload, TransformError> {
        match tokio::time::timeout(self.call_timeout, self.transformer.transform(payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransformError::new(
                ErrorKind::Timeout,
                format!("call exceeded {}s", self.call_timeout.as_secs_f64()),
            )),
        }
    }
}

fn abandon(task_id: TaskId, attempts_made: u32) -> WorkerResult {
    debug!(task_id = %task_id, attempts_made, "Task abandoned on cancellation");
    WorkerResult::Abandoned {
        task_id,
        attempts_made,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails with a fixed sequence of kinds, then echoes the payload
    struct Flaky {
        failures: Mutex<Vec<ErrorKind>>,
        calls: Mutex<Vec<Instant>>,
        hang: bool,
    }

    impl Flaky {
        fn new(failures: Vec<ErrorKind>) -> Self {
            Self {
                failures: Mutex::new(failures.into_iter().rev().collect()),
                calls: Mutex::new(Vec::new()),
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::new(Vec::new())
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transformer for Flaky {
        async fn transform(&self, payload: &Payload) -> Result<Payload, TransformError> {
            self.calls.lock().unwrap().push(Instant::now());
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            match self.failures.lock().unwrap().pop() {
                Some(kind) => Err(TransformError::new(kind, "scripted failure")),
                None => Ok(payload.clone()),
            }
        }
    }

    fn worker(transformer: Arc<Flaky>, max_attempts: u32, cancel: CancellationToken) -> Worker {
        Worker::new(
            transformer,
            Arc::new(RateLimiter::new(100.0, 100).unwrap()),
            RetryPolicy::new(
                max_attempts,
                Duration::from_millis(100),
                Duration::from_millis(400),
                0.0,
            ),
            Duration::from_secs(5),
            cancel,
        )
    }

    fn task(id: &str) -> Task {
        Task::new(TaskId::from(id), json!({"text": id}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let flaky = Arc::new(Flaky::new(vec![]));
        let w = worker(flaky.clone(), 3, CancellationToken::new());

        let result = w.process(task("a")).await;
        assert_eq!(
            result,
            WorkerResult::Completed(Outcome::Success {
                task_id: TaskId::from("a"),
                transformed_payload: json!({"text": "a"}),
            })
        );
        assert_eq!(flaky.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let flaky = Arc::new(Flaky::new(vec![ErrorKind::RateLimited, ErrorKind::ServerError]));
        let w = worker(flaky.clone(), 5, CancellationToken::new());

        let result = w.process(task("a")).await;
        assert!(matches!(result, WorkerResult::Completed(Outcome::Success { .. })));
        assert_eq!(flaky.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_last_kind() {
        let flaky = Arc::new(Flaky::new(vec![
            ErrorKind::ServerError,
            ErrorKind::Connection,
            ErrorKind::Timeout,
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
        ]));
        let w = worker(flaky.clone(), 5, CancellationToken::new());

        match w.process(task("a")).await {
            WorkerResult::Completed(Outcome::Failure {
                error_kind,
                attempts_made,
                ..
            }) => {
                assert_eq!(error_kind, ErrorKind::RateLimited);
                assert_eq!(attempts_made, 5);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let calls = flaky.calls();
        assert_eq!(calls.len(), 5);
        let gaps: Vec<_> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in gaps.windows(2) {
            assert!(pair[0] <= pair[1], "backoff must not shrink: {:?}", gaps);
        }
        assert!(gaps[0] >= Duration::from_millis(100));
        assert!(*gaps.last().unwrap() < Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_not_retried() {
        let flaky = Arc::new(Flaky::new(vec![ErrorKind::Authentication]));
        let w = worker(flaky.clone(), 5, CancellationToken::new());

        match w.process(task("a")).await {
            WorkerResult::Completed(Outcome::Failure {
                error_kind,
                attempts_made,
                ..
            }) => {
                assert_eq!(error_kind, ErrorKind::Authentication);
                assert_eq!(attempts_made, 1);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(flaky.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_classified() {
        let flaky = Arc::new(Flaky::hanging());
        let w = worker(flaky.clone(), 2, CancellationToken::new());

        match w.process(task("slow")).await {
            WorkerResult::Completed(Outcome::Failure {
                error_kind,
                attempts_made,
                ..
            }) => {
                assert_eq!(error_kind, ErrorKind::Timeout);
                assert_eq!(attempts_made, 2);
            }
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_is_abandoned() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let flaky = Arc::new(Flaky::new(vec![]));
        let w = worker(flaky.clone(), 3, cancel);

        let result = w.process(task("a")).await;
        assert_eq!(
            result,
            WorkerResult::Abandoned {
                task_id: TaskId::from("a"),
                attempts_made: 0,
            }
        );
        assert!(flaky.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_abandons() {
        let cancel = CancellationToken::new();
        let flaky = Arc::new(Flaky::new(vec![ErrorKind::ServerError; 10]));
        let w = worker(flaky.clone(), 10, cancel.clone());

        let handle = tokio::spawn(async move { w.process(task("a")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert_eq!(
            result,
            WorkerResult::Abandoned {
                task_id: TaskId::from("a"),
                attempts_made: 1,
            }
        );
        assert_eq!(flaky.calls().len(), 1);
    }
}
