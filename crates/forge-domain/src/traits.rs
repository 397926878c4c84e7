//! Trait definitions for external interactions
//!
//! These traits define the boundaries between engine logic and infrastructure.
//! Infrastructure implementations live in other crates.

use crate::{Payload, TransformError};
use async_trait::async_trait;

/// The external transformation call
///
/// One request, one response. Implementations must classify every failure
/// into a [`TransformError`] before returning it.
///
/// Implemented by the infrastructure layer (forge-llm)
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transform one payload
    async fn transform(&self, payload: &Payload) -> Result<Payload, TransformError>;

    /// Short name used in logs and reports
    fn name(&self) -> &str {
        "transformer"
    }
}
