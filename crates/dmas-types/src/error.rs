//! Error types for the dMAS control center
//!
//! Every failure is a value. Errors are `Clone` so they can travel inside
//! command results and broadcast events.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for control center operations
pub type ControlResult<T> = std::result::Result<T, ControlError>;

/// Control center error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ControlError {
    /// Backend unreachable or answered with a non-success status
    #[error("Backend request failed: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Rejected locally before any network call
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Backend reported the addressed instance does not exist
    #[error("Agent {key} not found")]
    NotFound { key: String },

    /// Backend answered with a payload of unexpected shape
    #[error("Unexpected backend payload: {0}")]
    Decode(String),

    /// The task carrying a command stopped before reporting
    #[error("Command interrupted: {0}")]
    Interrupted(String),
}

impl ControlError {
    /// Transport failure without an HTTP status (connection refused, reset, ...)
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Transport failure carrying the backend's HTTP status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Local validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Simulation range is reversed: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Malformed date {value:?}, expected YYYY-MM-DD")]
    MalformedDate { value: String },

    #[error("Unknown agent type {tag:?}")]
    UnknownAgentType { tag: String },

    #[error("Malformed instance key {key:?}, expected <TYPE>_<ordinal>")]
    MalformedInstanceKey { key: String },
}
