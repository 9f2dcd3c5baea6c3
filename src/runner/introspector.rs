// SPDX-License-Identifier: Apache-2.0

//! Schema browsing for the default database.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::TargetExecutor;
use crate::engine::types::{Row, TableSchemaEntry};

/// INFORMATION_SCHEMA.COLUMNS query skipping the `excluded` namespaces.
pub fn schema_query(excluded: &[String]) -> String {
    let mut sql = String::from(
        "SELECT table_schema, table_name, column_name FROM INFORMATION_SCHEMA.COLUMNS",
    );
    if !excluded.is_empty() {
        let list = excluded
            .iter()
            .map(|s| format!("'{}'", s.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(&format!(" WHERE table_schema NOT IN ({list})"));
    }
    sql.push(';');
    sql
}

/// `table` inside the default database's own namespace, `namespace.table` elsewhere.
pub fn qualified_name(namespace: &str, table: &str, default_database: &str) -> String {
    if namespace != default_database {
        format!("{}.{}", namespace, table)
    } else {
        table.to_string()
    }
}

/// Folds `(namespace, table, column)` rows into table entries.
///
/// Entries keep first-seen order and columns keep row order, duplicates
/// included.
pub fn fold_columns<'a, I>(rows: I, default_database: &str, excluded: &[String]) -> Vec<TableSchemaEntry>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut entries: Vec<TableSchemaEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let mut cells = row.values().iter().map(|v| v.to_text());
        let (Some(Some(namespace)), Some(Some(table)), Some(Some(column))) =
            (cells.next(), cells.next(), cells.next())
        else {
            continue;
        };
        // The server filters these too; collation may make its comparison looser.
        if excluded.contains(&namespace) {
            continue;
        }

        let name = qualified_name(&namespace, &table, default_database);
        let slot = *index.entry(name.clone()).or_insert_with(|| {
            entries.push(TableSchemaEntry {
                name,
                columns: Vec::new(),
            });
            entries.len() - 1
        });
        entries[slot].columns.push(column);
    }

    entries
}

/// Describes every user table of `default_database`.
///
/// Any error from the metadata query is fatal.
#[instrument(skip(executor, excluded, cancel))]
pub async fn describe_schema(
    executor: &dyn TargetExecutor,
    default_database: &str,
    excluded: &[String],
    cancel: &CancellationToken,
) -> EngineResult<Vec<TableSchemaEntry>> {
    let result = executor
        .execute(&schema_query(excluded), default_database, cancel)
        .await?
        .into_result()
        .map_err(EngineError::schema)?;

    let entries = fold_columns(&result.rows, default_database, excluded);
    debug!(tables = entries.len(), "Schema loaded");
    Ok(entries)
}
