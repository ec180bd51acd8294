//! Agent identity types
//!
//! Agent types form a closed set known at configuration time. Instance keys
//! follow the backend's `<TYPE>_<ordinal>` convention, e.g. `DEM_40`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Category of a backend-managed agent process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentType {
    /// Power plant
    Pwp,
    /// Renewable energy source
    Res,
    /// Demand
    Dem,
    /// Storage
    Str,
    /// Market
    Mrk,
    /// Network operator
    Net,
}

impl AgentType {
    /// Every agent type, in console display order
    pub const ALL: [AgentType; 6] = [
        AgentType::Pwp,
        AgentType::Res,
        AgentType::Dem,
        AgentType::Str,
        AgentType::Mrk,
        AgentType::Net,
    ];

    /// The upper-case tag used on the wire and as instance key prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pwp => "PWP",
            Self::Res => "RES",
            Self::Dem => "DEM",
            Self::Str => "STR",
            Self::Mrk => "MRK",
            Self::Net => "NET",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| ValidationError::UnknownAgentType { tag: tag.to_string() })
    }
}

// ============================================================================
// Configuration Scope
// ============================================================================

/// Owner of one configuration mapping
///
/// The control service keeps its own configuration next to the per-type
/// agent configurations. Each scope owns an independent mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ConfigScope {
    /// The control service itself
    Service,
    /// One agent type
    Agent(AgentType),
}

impl ConfigScope {
    /// Path segment used by `/get_config/{..}` and `/set_config/{..}`
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Service => "services",
            Self::Agent(agent_type) => agent_type.as_str(),
        }
    }

    /// Every scope: the service followed by all agent types
    pub fn all() -> impl Iterator<Item = ConfigScope> {
        std::iter::once(ConfigScope::Service).chain(AgentType::ALL.into_iter().map(ConfigScope::Agent))
    }
}

impl From<AgentType> for ConfigScope {
    fn from(agent_type: AgentType) -> Self {
        Self::Agent(agent_type)
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for ConfigScope {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "services" | "service" => Ok(Self::Service),
            _ => s.parse().map(Self::Agent),
        }
    }
}

impl From<ConfigScope> for String {
    fn from(scope: ConfigScope) -> Self {
        scope.path_segment().to_string()
    }
}

impl TryFrom<String> for ConfigScope {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Agent Instances
// ============================================================================

/// Lifecycle state of a known instance, as seen by the control center
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Reported alive by the last successful info fetch
    Running,
    /// A termination request for this instance failed
    TerminationFailed { reason: String },
}

impl InstanceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// One running agent process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInstance {
    /// Opaque instance key, e.g. `DEM_40`
    pub key: String,
    pub agent_type: AgentType,
    pub status: InstanceStatus,
    /// Freeform metadata reported by the backend (e.g. `ip`)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AgentInstance {
    /// Create a running instance with no metadata
    pub fn new(key: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            key: key.into(),
            agent_type,
            status: InstanceStatus::Running,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Derive the agent type from a `<TYPE>_<ordinal>` key
    pub fn type_from_key(key: &str) -> Result<AgentType, ValidationError> {
        let (prefix, _ordinal) = key
            .split_once('_')
            .ok_or_else(|| ValidationError::MalformedInstanceKey { key: key.to_string() })?;
        prefix
            .parse()
            .map_err(|_| ValidationError::MalformedInstanceKey { key: key.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_parse_is_case_insensitive() {
        assert_eq!("PWP".parse::<AgentType>().unwrap(), AgentType::Pwp);
        assert_eq!(" net ".parse::<AgentType>().unwrap(), AgentType::Net);
        assert!(matches!(
            "WTR".parse::<AgentType>(),
            Err(ValidationError::UnknownAgentType { tag }) if tag == "WTR"
        ));
    }

    #[test]
    fn test_agent_type_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&AgentType::Mrk).unwrap(), "\"MRK\"");
        let parsed: AgentType = serde_json::from_str("\"STR\"").unwrap();
        assert_eq!(parsed, AgentType::Str);
    }

    #[test]
    fn test_config_scope_path_segments() {
        assert_eq!(ConfigScope::Service.path_segment(), "services");
        assert_eq!(ConfigScope::Agent(AgentType::Dem).path_segment(), "DEM");
        assert_eq!("services".parse::<ConfigScope>().unwrap(), ConfigScope::Service);
        assert_eq!("res".parse::<ConfigScope>().unwrap(), ConfigScope::Agent(AgentType::Res));
        assert_eq!(ConfigScope::all().count(), 7);
    }

    #[test]
    fn test_config_scope_serde_uses_path_segment() {
        let json = serde_json::to_string(&ConfigScope::Agent(AgentType::Pwp)).unwrap();
        assert_eq!(json, "\"PWP\"");
        let scope: ConfigScope = serde_json::from_str("\"services\"").unwrap();
        assert_eq!(scope, ConfigScope::Service);
    }

    #[test]
    fn test_type_from_key() {
        assert_eq!(AgentInstance::type_from_key("DEM_40").unwrap(), AgentType::Dem);
        assert!(AgentInstance::type_from_key("DEM40").is_err());
        assert!(AgentInstance::type_from_key("XYZ_1").is_err());
    }
}
