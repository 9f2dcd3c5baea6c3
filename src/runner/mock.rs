//! Scripted executor for runner tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::TargetExecutor;
use crate::engine::types::{build_columns, PortableType, QueryResult, TargetOutcome, Value};

#[derive(Clone)]
pub enum Script {
    Rows {
        columns: Vec<&'static str>,
        records: Vec<Vec<Value>>,
    },
    Soft(&'static str),
    Fatal(&'static str),
}

impl Script {
    pub fn rows(columns: Vec<&'static str>, records: Vec<Vec<Value>>) -> Self {
        Script::Rows { columns, records }
    }
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Answers each database with its script and records the call order.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, database: &str, script: Script) -> Self {
        self.scripts.insert(database.to_string(), script);
        self
    }

    pub fn delay(mut self, database: &str, delay: Duration) -> Self {
        self.delays.insert(database.to_string(), delay);
        self
    }

    /// Discovery script listing `targets` under the `datasource` column.
    pub fn with_targets(self, master: &str, targets: &[&str]) -> Self {
        let records = targets.iter().map(|t| vec![text(t)]).collect();
        self.on(master, Script::rows(vec!["datasource"], records))
    }

    pub fn databases_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(db, _)| db.clone())
            .collect()
    }

    pub fn queries_for(&self, database: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(db, _)| db == database)
            .map(|(_, q)| q.clone())
            .collect()
    }
}

#[async_trait]
impl TargetExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        query: &str,
        database: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<TargetOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((database.to_string(), query.to_string()));

        if let Some(delay) = self.delays.get(database) {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(TargetOutcome::cancelled()),
                _ = tokio::time::sleep(*delay) => {}
            }
        }

        match self.scripts.get(database) {
            Some(Script::Rows { columns, records }) => {
                let columns = build_columns(
                    columns
                        .iter()
                        .map(|name| (name.to_string(), PortableType::String)),
                );
                Ok(TargetOutcome::success(QueryResult::from_records(
                    columns,
                    records.clone(),
                )))
            }
            Some(Script::Soft(message)) => Ok(TargetOutcome::soft_error(*message)),
            Some(Script::Fatal(message)) => Err(EngineError::driver(
                "executing query",
                tiberius::error::Error::Protocol((*message).into()),
            )),
            None => Err(EngineError::connection_failed(format!(
                "no script for {database}"
            ))),
        }
    }
}
