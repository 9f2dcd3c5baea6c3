// SPDX-License-Identifier: Apache-2.0

//! Datasource discovery.
//!
//! Runs the configured datasources query on the master database and turns
//! its `datasource` column into the list of target databases.

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::TargetExecutor;

/// Column of the datasources query holding a target database name.
pub const DATASOURCE_COLUMN: &str = "datasource";

/// Lists target databases in the order the datasources query returns them.
///
/// Any error, soft or fatal, aborts discovery.
#[instrument(skip(executor, discovery_query, cancel))]
pub async fn list_targets(
    executor: &dyn TargetExecutor,
    discovery_query: &str,
    master_database: &str,
    cancel: &CancellationToken,
) -> EngineResult<Vec<String>> {
    let result = executor
        .execute(discovery_query, master_database, cancel)
        .await?
        .into_result()
        .map_err(EngineError::discovery)?;

    if !result.columns.iter().any(|c| c.name == DATASOURCE_COLUMN) {
        return Err(EngineError::discovery(format!(
            "datasources query must return a `{}` column",
            DATASOURCE_COLUMN
        )));
    }

    let targets: Vec<String> = result
        .rows
        .iter()
        .filter_map(|row| {
            let target = row.get(DATASOURCE_COLUMN).and_then(|v| v.to_text());
            if target.is_none() {
                warn!("Skipping NULL datasource row");
            }
            target
        })
        .collect();

    debug!(count = targets.len(), "Discovered datasources");
    Ok(targets)
}
