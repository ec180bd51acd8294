//! Fleet commands, simulation requests and their outcomes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::agent::AgentType;
use crate::error::{ControlError, ValidationError};

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Acknowledgement
// ============================================================================

/// Backend acknowledgement of a write or lifecycle call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Body returned by the backend, usually `OK`
    pub message: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            message: "OK".to_string(),
        }
    }
}

// ============================================================================
// Simulation Request
// ============================================================================

/// Inclusive calendar date range for a simulation run
///
/// Construction does not check ordering. Call [`SimulationRequest::validate`]
/// before dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SimulationRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Parse two `YYYY-MM-DD` strings; a reversed range parses fine
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            start: parse_date(start)?,
            end: parse_date(end)?,
        })
    }

    /// Check `start <= end`
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start > self.end {
            return Err(ValidationError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of simulated days, both ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl Default for SimulationRequest {
    /// The console's pre-filled range: the whole of 2018
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2018, 12, 31).unwrap_or_default(),
        }
    }
}

impl fmt::Display for SimulationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start.format(DATE_FORMAT), self.end.format(DATE_FORMAT))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::MalformedDate {
        value: value.to_string(),
    })
}

// ============================================================================
// Command Results
// ============================================================================

/// What a command asked the backend to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Terminate,
    Simulate,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Terminate => write!(f, "terminate"),
            Self::Simulate => write!(f, "simulate"),
        }
    }
}

/// What a command was addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommandTarget {
    AgentType(AgentType),
    Instance(String),
    Range(SimulationRequest),
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentType(agent_type) => write!(f, "{}", agent_type),
            Self::Instance(key) => f.write_str(key),
            Self::Range(range) => write!(f, "{}", range),
        }
    }
}

/// Terminal status of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Failed(ControlError),
}

/// Outcome of one issued command, surfaced exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: Uuid,
    pub kind: CommandKind,
    pub target: CommandTarget,
    pub status: CommandStatus,
    pub completed_at: DateTime<Utc>,
}

impl CommandResult {
    /// Build a result from the outcome of the backend call
    pub fn from_outcome<T>(
        kind: CommandKind,
        target: CommandTarget,
        outcome: Result<T, ControlError>,
    ) -> Self {
        let status = match outcome {
            Ok(_) => CommandStatus::Success,
            Err(e) => CommandStatus::Failed(e),
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            target,
            status,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, CommandStatus::Success)
    }

    pub fn error(&self) -> Option<&ControlError> {
        match &self.status {
            CommandStatus::Success => None,
            CommandStatus::Failed(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversed_range_parses_but_fails_validation() {
        let request = SimulationRequest::parse("2019-05-01", "2019-01-01").unwrap();
        assert!(matches!(
            request.validate(),
            Err(ValidationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_single_day_range_is_valid() {
        let request = SimulationRequest::parse("2019-01-01", "2019-01-01").unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.days(), 1);
    }

    #[test]
    fn test_malformed_date_rejected() {
        assert!(matches!(
            SimulationRequest::parse("2019-13-01", "2019-12-31"),
            Err(ValidationError::MalformedDate { value }) if value == "2019-13-01"
        ));
        assert!(SimulationRequest::parse("01/01/2019", "2019-12-31").is_err());
    }

    #[test]
    fn test_default_range_covers_2018() {
        let request = SimulationRequest::default();
        assert_eq!(request.to_string(), "2018-01-01..=2018-12-31");
        assert_eq!(request.days(), 365);
    }

    #[test]
    fn test_request_body_shape() {
        let request = SimulationRequest::parse("2019-01-01", "2019-03-31").unwrap();
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(json, serde_json::json!({ "start": "2019-01-01", "end": "2019-03-31" }));
    }

    #[test]
    fn test_command_result_from_outcome() {
        let ok = CommandResult::from_outcome(
            CommandKind::Start,
            CommandTarget::AgentType(AgentType::Pwp),
            Ok::<_, ControlError>(Ack::ok()),
        );
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let failed = CommandResult::from_outcome::<Ack>(
            CommandKind::Terminate,
            CommandTarget::Instance("DEM_40".to_string()),
            Err(ControlError::unreachable("connection refused")),
        );
        assert!(!failed.is_success());
        assert!(failed.error().unwrap().is_transport());
        assert_ne!(ok.id, failed.id);
    }
}
