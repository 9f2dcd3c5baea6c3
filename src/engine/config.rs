// SPDX-License-Identifier: Apache-2.0

//! Runner configuration, as supplied by the host application.

use serde::Deserialize;

use crate::engine::charset::Charset;
use crate::engine::error::{EngineError, EngineResult};
use crate::observability::Sensitive;

/// Default SQL Server port. Any other port is appended to the server address.
pub const DEFAULT_PORT: u16 = 1433;

const SUPPORTED_TDS_VERSIONS: &[&str] = &["4.2", "7.0", "7.1", "7.2", "7.3", "7.4", "8.0"];

/// Namespaces that hold platform metadata or built-in roles rather than user data.
pub const DEFAULT_EXCLUDED_SCHEMAS: &[&str] = &[
    "guest",
    "INFORMATION_SCHEMA",
    "sys",
    "db_owner",
    "db_accessadmin",
    "db_securityadmin",
    "db_ddladmin",
    "db_backupoperator",
    "db_datareader",
    "db_datawriter",
    "db_denydatareader",
    "db_denydatawriter",
];

/// Connection and discovery settings for the multi-datasource runner
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: Sensitive<String>,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tds_version")]
    pub tds_version: String,
    #[serde(default)]
    pub charset: Charset,

    /// Database used for schema browsing and unqualified table names.
    #[serde(default)]
    pub db: String,
    /// Database the datasources query runs against.
    #[serde(default)]
    pub master_db: String,
    /// Returns one row per target, with the database name in a `datasource` column.
    #[serde(default)]
    pub datasources_query: String,

    #[serde(default = "default_excluded_schemas")]
    pub excluded_schemas: Vec<String>,
    /// 1 runs targets one after another.
    #[serde(default = "default_max_concurrent_targets")]
    pub max_concurrent_targets: usize,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_trust_server_certificate")]
    pub trust_server_certificate: bool,
}

fn default_server() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_tds_version() -> String {
    "4.2".to_string()
}

fn default_excluded_schemas() -> Vec<String> {
    DEFAULT_EXCLUDED_SCHEMAS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_concurrent_targets() -> usize {
    1
}

fn default_trust_server_certificate() -> bool {
    true
}

impl RunnerConfig {
    /// Parses and validates the host's JSON configuration object.
    pub fn from_json(value: serde_json::Value) -> EngineResult<Self> {
        let config: RunnerConfig = serde_json::from_value(value)
            .map_err(|e| EngineError::validation(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (key, value) in [
            ("db", &self.db),
            ("master_db", &self.master_db),
            ("datasources_query", &self.datasources_query),
        ] {
            if value.trim().is_empty() {
                return Err(EngineError::validation(format!(
                    "Missing required setting: {key}"
                )));
            }
        }

        if self.server.trim().is_empty() {
            return Err(EngineError::validation("Server address must not be empty"));
        }

        if !SUPPORTED_TDS_VERSIONS.contains(&self.tds_version.as_str()) {
            return Err(EngineError::validation(format!(
                "Unsupported TDS version: {}",
                self.tds_version
            )));
        }

        if self.max_concurrent_targets == 0 {
            return Err(EngineError::validation(
                "max_concurrent_targets must be at least 1",
            ));
        }

        Ok(())
    }

    /// Server address as the driver is given it: `server`, or `server:port`
    /// when the port is not the default. Bare IPv6 literals are bracketed
    /// before a port is appended.
    pub fn server_address(&self) -> String {
        if self.port == DEFAULT_PORT {
            self.server.clone()
        } else if self.server.contains(':') && !self.server.starts_with('[') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}
