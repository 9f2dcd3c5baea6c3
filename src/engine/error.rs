// SPDX-License-Identifier: Apache-2.0

//! Fatal error types for the multi-datasource engine
//!
//! Only failures that abort an operation are represented here. Recoverable
//! per-target conditions (query errors, login failures, cancellation, empty
//! result sets) travel as data inside [`TargetOutcome`](crate::engine::types::TargetOutcome).

use thiserror::Error;

/// Unified error type for all engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Unclassified driver failure, carrying the original cause.
    #[error("Driver failure while {context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: tiberius::error::Error,
    },

    #[error("Cannot encode query as {charset}: {message}")]
    Encoding { charset: String, message: String },

    #[error("Failed retrieving datasources: {message}")]
    Discovery { message: String },

    #[error("Failed getting schema: {message}")]
    Schema { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn driver(context: impl Into<String>, source: tiberius::error::Error) -> Self {
        Self::Driver {
            context: context.into(),
            source,
        }
    }

    pub fn encoding(charset: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Encoding {
            charset: charset.into(),
            message: msg.into(),
        }
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery { message: msg.into() }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema { message: msg.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError { message: msg.into() }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
