// Data Engine Module
// Connection, execution and type normalization for a single target database

pub mod charset;
pub mod config;
pub mod drivers;
pub mod error;
pub mod traits;
pub mod type_map;
pub mod types;

pub use config::RunnerConfig;
pub use error::{EngineError, EngineResult};
pub use traits::TargetExecutor;
pub use types::*;
