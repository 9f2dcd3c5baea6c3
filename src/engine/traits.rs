//! TargetExecutor trait definition
//!
//! The seam between the fan-out logic and the wire driver. The SQL Server
//! driver implements it for real servers; tests substitute scripted executors.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::error::EngineResult;
use crate::engine::types::TargetOutcome;

/// Runs one query against one database over a dedicated connection.
///
/// Return contract:
/// - `Ok(outcome)` with `outcome.result` set on success;
/// - `Ok(outcome)` with `outcome.error` set for soft failures (query errors,
///   login failures, no result set, cancellation through `cancel`);
/// - `Err(_)` for fatal failures the caller must handle or propagate.
///
/// Implementations open and release their own connection on every call.
#[async_trait]
pub trait TargetExecutor: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        database: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<TargetOutcome>;
}
