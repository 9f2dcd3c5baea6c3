// SPDX-License-Identifier: Apache-2.0

//! Multi-datasource query runner.
//!
//! discover targets → fan the query out → merge rows, plus schema browsing
//! of the default database.

pub mod aggregator;
pub mod enumerator;
pub mod introspector;
pub mod manager;

#[cfg(test)]
pub(crate) mod mock;

pub use aggregator::{
    run_across_targets, AggregatedResult, FanOutPlan, ALL_TARGETS_FAILED_MESSAGE,
};
pub use enumerator::{list_targets, DATASOURCE_COLUMN};
pub use introspector::describe_schema;
pub use manager::{MultiSourceRunner, QueryOutput, NOOP_QUERY, RUNNER_NAME, RUNNER_TYPE};
