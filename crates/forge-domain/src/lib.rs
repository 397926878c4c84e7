//! Forge Domain Layer
//!
//! Core vocabulary of the batch transformation engine. Everything the engine,
//! the provider layer and the CLI exchange is defined here, together with the
//! trait boundary to the external transformation service.
//!
//! ## Key Concepts
//!
//! - **Task**: One unit of work with a stable identity and a JSON payload
//! - **Outcome**: The Success/Failure result of processing one Task
//! - **ErrorKind**: Closed classification of external-call failures
//!   (retryable vs terminal)
//! - **CheckpointState**: Durable snapshot of completed task ids and run stats
//! - **Transformer**: The external call, `payload -> transformed payload`
//!
//! ## Architecture
//!
//! - Pure data and business rules only, no I/O
//! - Infrastructure implementations live in other crates
//! - Trait definitions for all external interactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod error_kind;
pub mod outcome;
pub mod task;
pub mod traits;

// Re-exports for convenience
pub use checkpoint::{CheckpointState, RunStats, CHECKPOINT_SCHEMA_VERSION};
pub use error_kind::{ErrorKind, TransformError};
pub use outcome::Outcome;
pub use task::{Payload, Task, TaskId};
pub use traits::Transformer;
