// Database drivers

pub mod sqlserver;

pub use sqlserver::SqlServerExecutor;
