// SPDX-License-Identifier: Apache-2.0

//! Fan-out execution across discovered datasources.
//!
//! Targets run through an ordered buffer: up to `max_concurrent` queries are
//! in flight, but outcomes are folded in discovery order by this task alone.
//! That keeps the merged rows grouped per target and makes the reported
//! columns those of the last target (in discovery order) that returned a
//! result set.

use std::time::Instant;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::engine::error::EngineResult;
use crate::engine::traits::TargetExecutor;
use crate::engine::types::{ColumnDescriptor, QueryResult, Row, TargetOutcome, NO_DATA_MESSAGE};

use super::enumerator::list_targets;

/// Prefix of the error reported when every target failed fatally.
pub const ALL_TARGETS_FAILED_MESSAGE: &str = "Query failed on every datasource";

/// Where the targets come from and how many may run at once.
#[derive(Debug, Clone, Copy)]
pub struct FanOutPlan<'a> {
    pub datasources_query: &'a str,
    pub master_database: &'a str,
    pub max_concurrent: usize,
}

/// Merged outcome of one fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    /// `None` when no target produced a result set.
    pub result: Option<QueryResult>,
    /// Soft error of the last target that returned. A later success clears it.
    /// When every target failed fatally it names the failed targets instead.
    pub error: Option<String>,
    /// Targets skipped after a fatal failure, in discovery order.
    pub failed_targets: Vec<String>,
}

#[derive(Default)]
struct Accumulator {
    columns: Option<Vec<ColumnDescriptor>>,
    rows: Vec<Row>,
    error: Option<String>,
    failed_targets: Vec<String>,
}

impl Accumulator {
    /// Folds one target's outcome in.
    ///
    /// The column schema is replaced, not merged. The error slot is
    /// overwritten by every target that returned, so a later success clears
    /// an earlier soft error.
    fn absorb(&mut self, target: &str, outcome: EngineResult<TargetOutcome>) {
        match outcome {
            Ok(TargetOutcome { result, error }) => {
                if let Some(result) = result {
                    self.rows.extend(result.rows);
                    self.columns = Some(result.columns);
                }
                if let Some(ref message) = error {
                    warn!(datasource = target, error = %message, "Datasource returned an error");
                }
                self.error = error;
            }
            Err(e) => {
                error!(datasource = target, error = %e, "Query failed on datasource, skipping");
                self.failed_targets.push(target.to_string());
            }
        }
    }

    fn finish(self) -> AggregatedResult {
        let result = self.columns.map(|columns| QueryResult {
            columns,
            rows: self.rows,
        });
        let error = match (&result, self.error) {
            (None, None) if !self.failed_targets.is_empty() => Some(format!(
                "{}: {}",
                ALL_TARGETS_FAILED_MESSAGE,
                self.failed_targets.join(", ")
            )),
            (None, None) => Some(NO_DATA_MESSAGE.to_string()),
            (_, error) => error,
        };
        AggregatedResult {
            result,
            error,
            failed_targets: self.failed_targets,
        }
    }
}

/// Runs `query` on every datasource and merges the results.
///
/// Discovery failures propagate; per-target fatal failures are logged and
/// skipped.
#[instrument(skip(executor, plan, query, cancel), fields(query_len = query.len()))]
pub async fn run_across_targets(
    executor: &dyn TargetExecutor,
    plan: FanOutPlan<'_>,
    query: &str,
    cancel: &CancellationToken,
) -> EngineResult<AggregatedResult> {
    let start = Instant::now();
    let targets = list_targets(
        executor,
        plan.datasources_query,
        plan.master_database,
        cancel,
    )
    .await?;

    let outcomes = stream::iter(targets.iter())
        .map(|target| async move { (target, executor.execute(query, target, cancel).await) })
        .buffered(plan.max_concurrent.max(1));
    tokio::pin!(outcomes);

    let mut acc = Accumulator::default();
    while let Some((target, outcome)) = outcomes.next().await {
        acc.absorb(target, outcome);
    }

    let aggregated = acc.finish();
    info!(
        targets = targets.len(),
        failed = aggregated.failed_targets.len(),
        rows = aggregated.result.as_ref().map_or(0, |r| r.rows.len()),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Fan-out query finished"
    );
    Ok(aggregated)
}
