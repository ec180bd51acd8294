//! Remote agent API seam
//!
//! [`RemoteAgentApi`] is the only way the control core talks to the backend.
//! Implementations are pure transport: no caching, no retries.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use dmas_types::{
    Ack, AgentInstance, AgentType, ConfigEntry, ConfigScope, ControlResult, SimulationRequest,
};

/// One operation per backend capability
#[async_trait]
pub trait RemoteAgentApi: Send + Sync {
    /// `GET /get_config/{scope}`
    async fn fetch_config(&self, scope: ConfigScope) -> ControlResult<ConfigEntry>;

    /// `POST /set_config/{scope}`
    async fn push_config(&self, scope: ConfigScope, entry: &ConfigEntry) -> ControlResult<Ack>;

    /// `GET /get_running_agents/{type}`
    async fn fetch_count(&self, agent_type: AgentType) -> ControlResult<u64>;

    /// `GET /get_info/{type}`
    async fn fetch_instances(&self, agent_type: AgentType) -> ControlResult<Vec<AgentInstance>>;

    /// `GET /start_agents/{type}`
    async fn start_type(&self, agent_type: AgentType) -> ControlResult<Ack>;

    /// `GET /terminate_agents/{type}`
    async fn terminate_type(&self, agent_type: AgentType) -> ControlResult<Ack>;

    /// `GET /terminate_agent/{key}`
    async fn terminate_instance(&self, key: &str) -> ControlResult<Ack>;

    /// `POST /start_simulation`; every call may start a new run
    async fn start_simulation(&self, request: &SimulationRequest) -> ControlResult<Ack>;

    /// Address of the embedded grid view, if the backend serves one
    fn grid_url(&self) -> Option<String> {
        None
    }
}

/// Decode a `/get_info/{type}` payload
///
/// String values are the host address the agent reports and land in
/// metadata under `ip`. Object values are flattened into metadata.
pub(crate) fn decode_instances(
    requested: AgentType,
    payload: serde_json::Map<String, Value>,
) -> Vec<AgentInstance> {
    payload
        .into_iter()
        .map(|(key, value)| {
            let agent_type = AgentInstance::type_from_key(&key).unwrap_or(requested);
            let mut instance = AgentInstance::new(key, agent_type);
            instance.metadata = decode_metadata(value);
            instance
        })
        .collect()
}

fn decode_metadata(value: Value) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    match value {
        Value::Null => {}
        Value::String(ip) => {
            metadata.insert("ip".to_string(), ip);
        }
        Value::Object(fields) => {
            for (k, v) in fields {
                metadata.insert(k, scalar_to_string(v));
            }
        }
        other => {
            metadata.insert("status".to_string(), other.to_string());
        }
    }
    metadata
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Interpret a backend acknowledgement body
pub(crate) fn decode_ack(value: Value) -> Ack {
    Ack {
        message: scalar_to_string(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_decode_ip_values() {
        let payload = as_map(json!({ "DEM_40": "10.0.0.5", "DEM_41": "10.0.0.6" }));
        let mut instances = decode_instances(AgentType::Dem, payload);
        instances.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].key, "DEM_40");
        assert_eq!(instances[0].agent_type, AgentType::Dem);
        assert_eq!(instances[0].metadata.get("ip").map(String::as_str), Some("10.0.0.5"));
        assert!(instances[0].status.is_running());
    }

    #[test]
    fn test_decode_object_values() {
        let payload = as_map(json!({ "NET_1": { "ip": "10.0.0.7", "connected": true } }));
        let instances = decode_instances(AgentType::Net, payload);
        assert_eq!(instances[0].metadata.get("connected").map(String::as_str), Some("true"));
        assert_eq!(instances[0].metadata.get("ip").map(String::as_str), Some("10.0.0.7"));
    }

    #[test]
    fn test_key_prefix_wins_over_requested_type() {
        let payload = as_map(json!({ "RES_3": "10.0.0.8", "odd-key": null }));
        let mut instances = decode_instances(AgentType::Pwp, payload);
        instances.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(instances[0].key, "RES_3");
        assert_eq!(instances[0].agent_type, AgentType::Res);
        assert_eq!(instances[1].agent_type, AgentType::Pwp);
        assert!(instances[1].metadata.is_empty());
    }

    #[test]
    fn test_decode_ack() {
        assert_eq!(decode_ack(json!("OK")), Ack::ok());
        assert_eq!(decode_ack(json!({ "ok": true })).message, "{\"ok\":true}");
    }
}
