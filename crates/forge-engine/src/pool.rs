//! Bounded worker pool and the single outcome collector

use crate::{CheckpointStore, EngineError, ResultSink, SourceError, Worker, WorkerResult};
use forge_domain::{ErrorKind, Outcome, Task};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for one pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Tasks handed to a worker
    pub dispatched: u64,
    /// Outcomes recorded as Success
    pub succeeded: u64,
    /// Outcomes recorded as Failure (including malformed records)
    pub failed: u64,
    /// Tasks stopped by cancellation or lost to a worker panic
    pub abandoned: u64,
    /// Whether cancellation left tasks without an Outcome
    pub interrupted: bool,
}

impl PoolSummary {
    fn record(&mut self, outcome: &Outcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Sole consumer of outcomes
///
/// Appends each outcome to the sink before recording it in the checkpoint,
/// and flushes the checkpoint every `interval` recorded tasks.
pub struct Collector<'a> {
    sink: &'a ResultSink,
    checkpoint: &'a mut CheckpointStore,
    interval: u64,
    total: u64,
    processed: u64,
    succeeded: u64,
    started: Instant,
}

impl<'a> Collector<'a> {
    /// Create a collector; `total` is the number of tasks expected this run
    pub fn new(
        sink: &'a ResultSink,
        checkpoint: &'a mut CheckpointStore,
        interval: u64,
        total: u64,
    ) -> Self {
        Self {
            sink,
            checkpoint,
            interval: interval.max(1),
            total,
            processed: 0,
            succeeded: 0,
            started: Instant::now(),
        }
    }

    /// Persist one outcome
    pub fn accept(&mut self, outcome: &Outcome) -> Result<(), EngineError> {
        self.sink.append(outcome)?;
        if !self.checkpoint.record(outcome.task_id().clone(), outcome.is_success()) {
            debug!(task_id = %outcome.task_id(), "Outcome already recorded");
        }

        self.processed += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        }

        if self.checkpoint.unflushed() >= self.interval {
            self.flush()?;
            self.log_progress();
        }
        Ok(())
    }

    /// Make every accepted outcome durable, then persist the checkpoint
    ///
    /// On a multi-thread runtime the fsyncs run via `block_in_place`, so
    /// other workers keep making progress meanwhile.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        blocking_io(|| {
            self.sink.sync()?;
            self.checkpoint.flush()
        })
    }

    /// Outcomes accepted so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn log_progress(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            self.processed as f64 / elapsed
        } else {
            0.0
        };
        let success_rate = if self.processed > 0 {
            self.succeeded as f64 / self.processed as f64 * 100.0
        } else {
            100.0
        };
        info!(
            processed = self.processed,
            pending = self.total.saturating_sub(self.processed),
            success_rate = format!("{:.1}%", success_rate),
            throughput = format!("{:.2}/s", throughput),
            "Progress"
        );
    }
}

fn blocking_io<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Runs up to `max_workers` tasks concurrently
pub struct WorkerPool {
    worker: Arc<Worker>,
    max_workers: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool; the worker must observe the same cancellation token
    pub fn new(worker: Worker, max_workers: usize) -> Self {
        let cancel = worker.cancel_token().clone();
        Self {
            worker: Arc::new(worker),
            max_workers: max_workers.max(1),
            cancel,
        }
    }

    /// Process every task from `source`
    ///
    /// Dispatch stops as soon as the token is cancelled; tasks already in
    /// flight are drained. A read error on the source, a failure to persist
    /// an outcome or a panicking worker cancels the run and is returned
    /// after draining.
    pub async fn run<I>(
        &self,
        source: I,
        collector: &mut Collector<'_>,
    ) -> Result<PoolSummary, EngineError>
    where
        I: IntoIterator<Item = Result<Task, SourceError>>,
    {
        let mut source = source.into_iter();
        let mut in_flight = JoinSet::new();
        let mut summary = PoolSummary::default();
        let mut exhausted = false;
        let mut fatal: Option<EngineError> = None;

        loop {
            while !exhausted
                && fatal.is_none()
                && !self.cancel.is_cancelled()
                && in_flight.len() < self.max_workers
            {
                match source.next() {
                    None => exhausted = true,
                    Some(Ok(task)) => {
                        summary.dispatched += 1;
                        let worker = Arc::clone(&self.worker);
                        in_flight.spawn(async move { worker.process(task).await });
                    }
                    Some(Err(SourceError::Malformed { id, reason })) => {
                        warn!(task_id = %id, error = %reason, "Malformed input record");
                        let outcome = Outcome::Failure {
                            task_id: id,
                            error_kind: ErrorKind::MalformedRequest,
                            attempts_made: 0,
                            message: reason,
                        };
                        self.collect(&outcome, collector, &mut summary, &mut fatal);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Input stream failed, stopping dispatch");
                        fatal = Some(e.into());
                        self.cancel.cancel();
                    }
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok(WorkerResult::Completed(outcome)) => {
                    self.collect(&outcome, collector, &mut summary, &mut fatal);
                }
                Ok(WorkerResult::Abandoned { .. }) => summary.abandoned += 1,
                Err(e) => {
                    error!(error = %e, "Worker task aborted");
                    summary.abandoned += 1;
                    if fatal.is_none() {
                        fatal = Some(EngineError::Worker(e.to_string()));
                        self.cancel.cancel();
                    }
                }
            }
        }

        summary.interrupted = self.cancel.is_cancelled() && (!exhausted || summary.abandoned > 0);
        if let Some(e) = fatal {
            return Err(e);
        }
        if summary.interrupted {
            info!(
                dispatched = summary.dispatched,
                abandoned = summary.abandoned,
                "Pool drained after cancellation"
            );
        }
        Ok(summary)
    }

    fn collect(
        &self,
        outcome: &Outcome,
        collector: &mut Collector<'_>,
        summary: &mut PoolSummary,
        fatal: &mut Option<EngineError>,
    ) {
        // After a persistence failure nothing more is recorded; the
        // remaining tasks are picked up again on resume
        if fatal.is_some() {
            summary.abandoned += 1;
            return;
        }
        match collector.accept(outcome) {
            Ok(()) => summary.record(outcome),
            Err(e) => {
                error!(task_id = %outcome.task_id(), error = %e, "Failed to persist outcome");
                summary.abandoned += 1;
                *fatal = Some(e);
                self.cancel.cancel();
            }
        }
    }
}
