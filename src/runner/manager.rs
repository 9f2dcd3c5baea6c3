// SPDX-License-Identifier: Apache-2.0

//! Query runner entrypoints invoked by the host job runner.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::engine::config::RunnerConfig;
use crate::engine::drivers::SqlServerExecutor;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::TargetExecutor;
use crate::engine::types::TableSchemaEntry;

use super::aggregator::{run_across_targets, FanOutPlan};
use super::introspector::describe_schema;

/// Identifier the host registers this runner under.
pub const RUNNER_TYPE: &str = "mssql_all_datasources";

/// Human-readable runner name.
pub const RUNNER_NAME: &str = "Microsoft SQL Server - Multiple Datasources";

/// Statement used to check connectivity.
pub const NOOP_QUERY: &str = "SELECT 1";

/// Serialized result and soft error of one `run_query` call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    /// JSON text of the merged result set.
    pub data: Option<String>,
    pub error: Option<String>,
    /// Datasources skipped after a fatal failure.
    pub failed_targets: Vec<String>,
}

pub struct MultiSourceRunner {
    config: RunnerConfig,
    executor: Arc<dyn TargetExecutor>,
}

impl MultiSourceRunner {
    /// Runner backed by the SQL Server driver.
    pub fn new(config: RunnerConfig) -> Self {
        let executor = Arc::new(SqlServerExecutor::new(config.clone()));
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: RunnerConfig, executor: Arc<dyn TargetExecutor>) -> Self {
        Self { config, executor }
    }

    /// Builds a runner from the host's JSON configuration object.
    pub fn from_json(value: serde_json::Value) -> EngineResult<Self> {
        Ok(Self::new(RunnerConfig::from_json(value)?))
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs `query` on every datasource and returns the merged result as JSON.
    #[instrument(skip(self, query, cancel), fields(runner = RUNNER_TYPE))]
    pub async fn run_query(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<QueryOutput> {
        // Same text and charset for every target: reject it before discovery.
        self.config.charset.encode(query)?;

        let plan = FanOutPlan {
            datasources_query: &self.config.datasources_query,
            master_database: &self.config.master_db,
            max_concurrent: self.config.max_concurrent_targets,
        };
        let aggregated = run_across_targets(self.executor.as_ref(), plan, query, cancel).await?;

        let data = aggregated
            .result
            .as_ref()
            .map(|result| result.to_json())
            .transpose()?;

        Ok(QueryOutput {
            data,
            error: aggregated.error,
            failed_targets: aggregated.failed_targets,
        })
    }

    /// Tables and columns of the configured default database.
    pub async fn get_schema(
        &self,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<TableSchemaEntry>> {
        describe_schema(
            self.executor.as_ref(),
            &self.config.db,
            &self.config.excluded_schemas,
            cancel,
        )
        .await
    }

    /// Runs [`NOOP_QUERY`] against the master database.
    pub async fn test_connection(&self) -> EngineResult<()> {
        let outcome = self
            .executor
            .execute(NOOP_QUERY, &self.config.master_db, &CancellationToken::new())
            .await?;

        match outcome.into_result() {
            Ok(_) => {
                info!(server = %self.config.server_address(), "Connection test succeeded");
                Ok(())
            }
            Err(message) => Err(EngineError::connection_failed(message)),
        }
    }
}
