//! Pipeline runner: wires the components together for one run

use crate::source::count_pending;
use crate::{
    CheckpointStore, Collector, EngineError, IdStrategy, PipelineConfig, RateLimiter,
    ResultSink, RetryPolicy, RunReport, TaskSource, Worker, WorkerPool,
};
use forge_domain::Transformer;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle of a run
///
/// `Idle -> Loading -> Running -> (Draining) -> Finalizing -> Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Not started
    Idle,
    /// Validating configuration, loading the checkpoint, opening files
    Loading,
    /// Dispatching tasks
    Running,
    /// Cancelled; waiting for in-flight tasks
    Draining,
    /// Flushing the sink and the final checkpoint
    Finalizing,
    /// Finished (successfully or not)
    Done,
}

/// Everything Loading produces
struct Prepared {
    limiter: Arc<RateLimiter>,
    checkpoint: CheckpointStore,
    sink: ResultSink,
    source: TaskSource,
    total: u64,
    previously_completed: u64,
}

/// Runs one batch end to end
///
/// # Examples
///
/// ```no_run
/// use forge_engine::{PipelineConfig, PipelineRunner};
/// use forge_llm::{LlmTransformer, ScriptedProvider};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), forge_engine::EngineError> {
/// let config = PipelineConfig {
///     input: "records.jsonl".into(),
///     ..PipelineConfig::default()
/// };
/// let provider = ScriptedProvider::new(r#"{"text": "done"}"#);
/// let transformer = Arc::new(LlmTransformer::new(provider, "Clean the record."));
///
/// let runner = PipelineRunner::new(config, transformer);
/// let report = runner.run(CancellationToken::new()).await?;
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
pub struct PipelineRunner {
    config: PipelineConfig,
    transformer: Arc<dyn Transformer>,
    phase: Arc<watch::Sender<RunPhase>>,
}

impl PipelineRunner {
    /// Create a runner
    pub fn new(config: PipelineConfig, transformer: Arc<dyn Transformer>) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            config,
            transformer,
            phase: Arc::new(phase),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Execute the run
    ///
    /// Fatal problems (invalid configuration, missing input, unwritable
    /// paths) are reported before any task is dispatched. Cancelling
    /// `cancel` stops dispatch, drains in-flight tasks and still writes the
    /// final checkpoint.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport, EngineError> {
        let started = Instant::now();

        self.set_phase(RunPhase::Loading);
        let prepared = match self.load() {
            Ok(prepared) => prepared,
            Err(e) => {
                self.set_phase(RunPhase::Done);
                return Err(e);
            }
        };
        let Prepared {
            limiter,
            mut checkpoint,
            sink,
            source,
            total,
            previously_completed,
        } = prepared;

        info!(
            pending = total,
            previously_completed,
            workers = self.config.max_workers,
            rate_limit = self.config.rate_limit,
            transformer = self.transformer.name(),
            "Starting run"
        );

        let run_token = cancel.child_token();
        let pool = WorkerPool::new(
            Worker::new(
                Arc::clone(&self.transformer),
                limiter,
                RetryPolicy::from_config(&self.config),
                self.config.call_timeout(),
                run_token.clone(),
            ),
            self.config.max_workers,
        );

        self.set_phase(RunPhase::Running);
        let watcher = {
            let phase = Arc::clone(&self.phase);
            let token = run_token.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                phase.send_if_modified(|p| {
                    if *p == RunPhase::Running {
                        *p = RunPhase::Draining;
                        true
                    } else {
                        false
                    }
                });
                info!("Cancellation requested, draining in-flight tasks");
            })
        };

        let (pooled, processed, flushed) = {
            let mut collector =
                Collector::new(&sink, &mut checkpoint, self.config.checkpoint_interval, total);
            let pooled = pool.run(source, &mut collector).await;
            self.set_phase(RunPhase::Finalizing);
            let flushed = collector.flush();
            (pooled, collector.processed(), flushed)
        };
        watcher.abort();

        let finished = pooled.and_then(|summary| flushed.map(|_| summary));
        let summary = match finished {
            Ok(summary) => summary,
            Err(e) => {
                self.set_phase(RunPhase::Done);
                return Err(e);
            }
        };

        let report = RunReport {
            dispatched: summary.dispatched,
            succeeded: summary.succeeded,
            failed: summary.failed,
            abandoned: summary.abandoned,
            pending: total.saturating_sub(processed),
            previously_completed,
            totals: checkpoint.stats(),
            elapsed: started.elapsed(),
            interrupted: summary.interrupted,
            output: self.config.output.clone(),
            error_log: self.config.error_log.clone(),
        };

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            pending = report.pending,
            interrupted = report.interrupted,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Run finished"
        );
        self.set_phase(RunPhase::Done);
        Ok(report)
    }

    fn load(&self) -> Result<Prepared, EngineError> {
        let config = &self.config;
        config.validate().map_err(EngineError::Config)?;
        if !config.input.is_file() {
            return Err(EngineError::InputNotFound(config.input.clone()));
        }

        let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.bucket_capacity())?);

        if config.clear_checkpoint {
            CheckpointStore::remove(&config.checkpoint)?;
            if config.resume {
                info!("Checkpoint cleared, starting over instead of resuming");
            }
        }

        // Clearing starts every record over, so earlier results are not adopted
        let (mut checkpoint, sink) = if config.resume && !config.clear_checkpoint {
            let mut checkpoint = CheckpointStore::open(&config.checkpoint);
            let sink = ResultSink::open_append(&config.output, &config.error_log)?;
            checkpoint.reconcile(&sink.recover_ids()?);
            (checkpoint, sink)
        } else {
            if config.checkpoint.exists() {
                warn!(
                    path = %config.checkpoint.display(),
                    "Existing checkpoint replaced; enable resume to continue from it"
                );
            }
            let sink = ResultSink::create(&config.output, &config.error_log)?;
            (CheckpointStore::fresh(&config.checkpoint), sink)
        };

        // Writes the starting point before any dispatch, so a stale
        // checkpoint can never outlive a truncated output
        checkpoint.flush()?;

        let strategy = IdStrategy::from_field(config.id_field.as_deref());
        let completed = checkpoint.state().completed_ids.clone();
        let previously_completed = completed.len() as u64;
        let total = count_pending(&config.input, &strategy, &completed)?;
        let source = TaskSource::open(&config.input, strategy, completed)?;

        Ok(Prepared {
            limiter,
            checkpoint,
            sink,
            source,
            total,
            previously_completed,
        })
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.send_replace(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forge_domain::{ErrorKind, Payload, TransformError};
    use std::fs;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl Transformer for Echo {
        async fn transform(&self, payload: &Payload) -> Result<Payload, TransformError> {
            Ok(payload.clone())
        }
    }

    /// Rejects every call until opened
    #[derive(Default)]
    struct Gate {
        open: AtomicBool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for Gate {
        async fn transform(&self, payload: &Payload) -> Result<Payload, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.open.load(Ordering::SeqCst) {
                Ok(payload.clone())
            } else {
                Err(TransformError::new(ErrorKind::Authentication, "invalid api key"))
            }
        }
    }

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            input: dir.path().join("in.jsonl"),
            output: dir.path().join("out.jsonl"),
            error_log: dir.path().join("err.jsonl"),
            checkpoint: dir.path().join("cp/checkpoint.json"),
            max_workers: 3,
            rate_limit: 1_000.0,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_phases_end_in_done() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        fs::write(&config.input, "{\"n\":1}\n{\"n\":2}\n").unwrap();

        let runner = PipelineRunner::new(config, Arc::new(Echo));
        assert_eq!(runner.phase(), RunPhase::Idle);

        let report = runner.run(CancellationToken::new()).await.unwrap();
        assert_eq!(runner.phase(), RunPhase::Done);
        assert_eq!(report.succeeded, 2);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_in_loading() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        fs::write(&config.input, "{\"n\":1}\n").unwrap();
        config.max_workers = 0;

        let runner = PipelineRunner::new(config.clone(), Arc::new(Echo));
        let result = runner.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::Config(_))));
        assert!(!config.output.exists());
    }

    #[tokio::test]
    async fn test_fresh_run_replaces_stale_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        fs::write(&config.input, "{\"n\":1}\n").unwrap();

        let mut stale = CheckpointStore::fresh(&config.checkpoint);
        stale.record("1".into(), true);
        stale.record("99".into(), true);
        stale.flush().unwrap();

        let runner = PipelineRunner::new(config.clone(), Arc::new(Echo));
        let report = runner.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.previously_completed, 0);
        assert_eq!(report.succeeded, 1);

        let state = CheckpointStore::load(&config.checkpoint);
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_checkpoint_with_resume_starts_over() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        fs::write(&config.input, "{\"n\":1}\n{\"n\":2}\n").unwrap();

        let gate = Arc::new(Gate::default());
        let first = PipelineRunner::new(config.clone(), gate.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.failed, 2);

        // Credentials fixed; results from the first run stay on disk
        gate.open.store(true, Ordering::SeqCst);
        config.resume = true;
        config.clear_checkpoint = true;

        let report = PipelineRunner::new(config.clone(), gate.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.previously_completed, 0);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(gate.calls.load(Ordering::SeqCst), 4);

        let output = fs::read_to_string(&config.output).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(fs::read_to_string(&config.error_log).unwrap().is_empty());
        assert_eq!(CheckpointStore::load(&config.checkpoint).len(), 2);
    }
}
