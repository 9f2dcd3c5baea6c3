// mssql-multisource - run one query across every database a directory query lists
// Core library

pub mod engine;
pub mod observability;
pub mod runner;

pub use engine::{EngineError, EngineResult, RunnerConfig, TargetExecutor};
pub use runner::{MultiSourceRunner, QueryOutput};
pub use tokio_util::sync::CancellationToken;
