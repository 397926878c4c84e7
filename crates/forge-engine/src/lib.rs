//! Forge Engine
//!
//! Resumable, concurrent batch processing of JSON-lines records against a
//! slow, rate-limited external transformation.
//!
//! # Overview
//!
//! A run enumerates the input ([`TaskSource`]), skips everything already in
//! the checkpoint, and hands the rest to a bounded pool of workers
//! ([`WorkerPool`]). Every outbound call takes a permit from a shared token
//! bucket ([`RateLimiter`]); transient failures are retried with
//! exponential backoff ([`RetryPolicy`]). A single collector appends each
//! outcome to the result files ([`ResultSink`]) and only then records it in
//! the checkpoint ([`CheckpointStore`]), which is replaced atomically every
//! `checkpoint_interval` tasks.
//!
//! # Guarantees
//!
//! - Every task id is dispatched at most once per run
//! - A checkpointed id always has its outcome in the output or error log
//! - An interrupted run resumes without losing or duplicating records
//!
//! # Architecture
//!
//! ```text
//! TaskSource -> WorkerPool --(Worker: RateLimiter, Transformer, RetryPolicy)
//!                  |
//!                  v
//!              Collector -> ResultSink (append) -> CheckpointStore (record, flush)
//! ```
//!
//! [`PipelineRunner`] wires these together and drives the run lifecycle.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod pool;
pub mod rate_limiter;
pub mod report;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod source;
pub mod worker;

pub use checkpoint::CheckpointStore;
pub use config::PipelineConfig;
pub use error::EngineError;
pub use pool::{Collector, PoolSummary, WorkerPool};
pub use rate_limiter::RateLimiter;
pub use report::RunReport;
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{PipelineRunner, RunPhase};
pub use sink::{ErrorRecord, OutputRecord, RecoveredIds, ResultSink};
pub use source::{count_pending, IdStrategy, SourceError, TaskSource};
pub use worker::{Worker, WorkerResult};
