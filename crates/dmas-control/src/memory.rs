//! In-process backend
//!
//! [`InMemoryAgentApi`] behaves like the control service without any
//! network: it keeps per-scope configuration, launches and terminates
//! instances, and records simulation runs. Failures and response latency can
//! be injected per operation, and every call is logged for inspection.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use dmas_types::{
    Ack, AgentInstance, AgentType, ConfigEntry, ConfigScope, ControlError, ControlResult,
    SimulationRequest,
};

use crate::api::RemoteAgentApi;

/// Backend operation, for failure injection and call inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchConfig,
    PushConfig,
    FetchCount,
    FetchInstances,
    StartType,
    TerminateType,
    TerminateInstance,
    StartSimulation,
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub operation: Operation,
    /// Scope, type, key or range the call addressed
    pub target: String,
}

#[derive(Default)]
struct BackendState {
    configs: HashMap<ConfigScope, ConfigEntry>,
    instances: BTreeMap<String, AgentInstance>,
    simulations: Vec<SimulationRequest>,
    failures: HashMap<Operation, ControlError>,
    delays: HashMap<Operation, VecDeque<Duration>>,
    calls: Vec<ApiCall>,
}

/// In-memory [`RemoteAgentApi`]
#[derive(Default)]
pub struct InMemoryAgentApi {
    state: Mutex<BackendState>,
}

impl InMemoryAgentApi {
    /// Create an empty backend with no configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-loaded with a service configuration and a
    /// launch range for every agent type
    pub fn seeded() -> Self {
        let api = Self::new();
        api.set_config(
            ConfigScope::Service,
            [
                ("database", "dMAS"),
                ("mongodb", "localhost"),
                ("influxdb", "localhost"),
                ("rabbitmq", "localhost"),
                ("exchange", "Market"),
            ]
            .into_iter()
            .collect(),
        );
        for (i, agent_type) in AgentType::ALL.into_iter().enumerate() {
            let stop = (i as u32 % 3) + 2;
            api.set_config(
                agent_type,
                [
                    ("host".to_string(), "localhost".to_string()),
                    ("start".to_string(), "1".to_string()),
                    ("stop".to_string(), stop.to_string()),
                ]
                .into_iter()
                .collect(),
            );
        }
        api
    }

    /// Builder form of [`InMemoryAgentApi::set_config`]
    pub fn with_config(self, scope: impl Into<ConfigScope>, entry: ConfigEntry) -> Self {
        self.set_config(scope, entry);
        self
    }

    /// Builder form of [`InMemoryAgentApi::add_instance`]
    pub fn with_instance(self, instance: AgentInstance) -> Self {
        self.add_instance(instance);
        self
    }

    /// Replace the stored configuration of a scope
    pub fn set_config(&self, scope: impl Into<ConfigScope>, entry: ConfigEntry) {
        self.state.lock().configs.insert(scope.into(), entry);
    }

    pub fn config(&self, scope: impl Into<ConfigScope>) -> Option<ConfigEntry> {
        self.state.lock().configs.get(&scope.into()).cloned()
    }

    pub fn add_instance(&self, instance: AgentInstance) {
        self.state.lock().instances.insert(instance.key.clone(), instance);
    }

    /// Keys of running instances of a type, in key order
    pub fn running(&self, agent_type: AgentType) -> Vec<String> {
        self.state
            .lock()
            .instances
            .values()
            .filter(|i| i.agent_type == agent_type)
            .map(|i| i.key.clone())
            .collect()
    }

    /// Make every subsequent call of `operation` fail with `error`
    pub fn fail(&self, operation: Operation, error: ControlError) {
        self.state.lock().failures.insert(operation, error);
    }

    /// Undo [`InMemoryAgentApi::fail`]
    pub fn recover(&self, operation: Operation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Hold back the response of the next call of `operation`
    ///
    /// The response is computed when the call arrives and delivered after
    /// `delay`, like a slow network path.
    pub fn delay_next(&self, operation: Operation, delay: Duration) {
        self.state
            .lock()
            .delays
            .entry(operation)
            .or_default()
            .push_back(delay);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Simulation runs requested so far, in arrival order
    pub fn simulations(&self) -> Vec<SimulationRequest> {
        self.state.lock().simulations.clone()
    }

    async fn respond<T, F>(&self, operation: Operation, target: String, handler: F) -> ControlResult<T>
    where
        T: Send,
        F: FnOnce(&mut BackendState) -> ControlResult<T> + Send,
    {
        let (outcome, delay) = {
            let mut state = self.state.lock();
            state.calls.push(ApiCall { operation, target });
            let delay = state.delays.get_mut(&operation).and_then(VecDeque::pop_front);
            let injected = state.failures.get(&operation).cloned();
            let outcome = match injected {
                Some(err) => Err(err),
                None => handler(&mut *state),
            };
            (outcome, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// Instance ordinals to launch: `start..stop`, or `0..start` without `stop`
fn launch_range(entry: &ConfigEntry) -> Result<(u32, u32), String> {
    let parse = |key: &str| -> Result<Option<u32>, String> {
        entry
            .get(key)
            .map(|v| v.trim().parse::<u32>().map_err(|_| format!("invalid {} value {:?}", key, v)))
            .transpose()
    };

    let start = parse("start")?.ok_or_else(|| "missing start value".to_string())?;
    match parse("stop")? {
        Some(stop) => Ok((start, stop)),
        None => Ok((0, start)),
    }
}

#[async_trait]
impl RemoteAgentApi for InMemoryAgentApi {
    async fn fetch_config(&self, scope: ConfigScope) -> ControlResult<ConfigEntry> {
        self.respond(Operation::FetchConfig, scope.to_string(), move |state| {
            state
                .configs
                .get(&scope)
                .cloned()
                .ok_or_else(|| ControlError::status(500, format!("no configuration for {}", scope)))
        })
        .await
    }

    async fn push_config(&self, scope: ConfigScope, entry: &ConfigEntry) -> ControlResult<Ack> {
        let entry = entry.clone();
        self.respond(Operation::PushConfig, scope.to_string(), move |state| {
            // The backend merges pushed keys into the stored section
            let stored = state.configs.entry(scope).or_default();
            for (key, value) in entry.iter() {
                stored.set(key, value);
            }
            Ok(Ack::ok())
        })
        .await
    }

    async fn fetch_count(&self, agent_type: AgentType) -> ControlResult<u64> {
        self.respond(Operation::FetchCount, agent_type.to_string(), move |state| {
            Ok(state
                .instances
                .values()
                .filter(|i| i.agent_type == agent_type)
                .count() as u64)
        })
        .await
    }

    async fn fetch_instances(&self, agent_type: AgentType) -> ControlResult<Vec<AgentInstance>> {
        self.respond(Operation::FetchInstances, agent_type.to_string(), move |state| {
            Ok(state
                .instances
                .values()
                .filter(|i| i.agent_type == agent_type)
                .cloned()
                .collect())
        })
        .await
    }

    async fn start_type(&self, agent_type: AgentType) -> ControlResult<Ack> {
        self.respond(Operation::StartType, agent_type.to_string(), move |state| {
            let entry = state
                .configs
                .get(&ConfigScope::Agent(agent_type))
                .cloned()
                .unwrap_or_default();
            let (from, to) = launch_range(&entry).map_err(|msg| ControlError::status(500, msg))?;
            let host = entry.get("host").unwrap_or("localhost").to_string();

            for ordinal in from..to {
                let key = format!("{}_{}", agent_type, ordinal);
                let instance = AgentInstance::new(key.clone(), agent_type).with_metadata("ip", host.clone());
                state.instances.insert(key, instance);
            }
            Ok(Ack::ok())
        })
        .await
    }

    async fn terminate_type(&self, agent_type: AgentType) -> ControlResult<Ack> {
        self.respond(Operation::TerminateType, agent_type.to_string(), move |state| {
            state.instances.retain(|_, i| i.agent_type != agent_type);
            Ok(Ack::ok())
        })
        .await
    }

    async fn terminate_instance(&self, key: &str) -> ControlResult<Ack> {
        let key = key.to_string();
        self.respond(Operation::TerminateInstance, key.clone(), move |state| {
            state
                .instances
                .remove(&key)
                .map(|_| Ack::ok())
                .ok_or(ControlError::NotFound { key })
        })
        .await
    }

    async fn start_simulation(&self, request: &SimulationRequest) -> ControlResult<Ack> {
        let request = *request;
        self.respond(Operation::StartSimulation, request.to_string(), move |state| {
            state.simulations.push(request);
            Ok(Ack::ok())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, &str)]) -> ConfigEntry {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_launch_range() {
        assert_eq!(launch_range(&entry(&[("start", "1"), ("stop", "4")])), Ok((1, 4)));
        assert_eq!(launch_range(&entry(&[("start", "3")])), Ok((0, 3)));
        assert!(launch_range(&entry(&[])).is_err());
        assert!(launch_range(&entry(&[("start", "x")])).is_err());
    }

    #[tokio::test]
    async fn test_start_and_terminate_type() {
        let api = InMemoryAgentApi::new().with_config(
            AgentType::Dem,
            entry(&[("host", "10.0.0.5"), ("start", "40"), ("stop", "42")]),
        );

        api.start_type(AgentType::Dem).await.unwrap();
        assert_eq!(api.running(AgentType::Dem), vec!["DEM_40", "DEM_41"]);
        assert_eq!(api.fetch_count(AgentType::Dem).await.unwrap(), 2);

        let instances = api.fetch_instances(AgentType::Dem).await.unwrap();
        assert_eq!(instances[0].metadata.get("ip").map(String::as_str), Some("10.0.0.5"));

        api.terminate_type(AgentType::Dem).await.unwrap();
        assert_eq!(api.fetch_count(AgentType::Dem).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_terminate_unknown_key_is_not_found() {
        let api = InMemoryAgentApi::new();
        let err = api.terminate_instance("DEM_99").await.unwrap_err();
        assert_eq!(err, ControlError::NotFound { key: "DEM_99".to_string() });
    }

    #[tokio::test]
    async fn test_push_config_merges() {
        let api = InMemoryAgentApi::new().with_config(AgentType::Pwp, entry(&[("ip", "10.0.0.1"), ("port", "9000")]));
        api.push_config(AgentType::Pwp.into(), &entry(&[("port", "9100")])).await.unwrap();
        assert_eq!(api.config(AgentType::Pwp).unwrap(), entry(&[("ip", "10.0.0.1"), ("port", "9100")]));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let api = InMemoryAgentApi::seeded();
        api.fail(Operation::FetchCount, ControlError::unreachable("connection refused"));

        assert!(api.fetch_count(AgentType::Net).await.is_err());
        assert_eq!(api.call_count(Operation::FetchCount), 1);

        api.recover(Operation::FetchCount);
        assert_eq!(api.fetch_count(AgentType::Net).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seeded_backend_has_every_scope() {
        let api = InMemoryAgentApi::seeded();
        for scope in ConfigScope::all() {
            assert!(api.fetch_config(scope).await.is_ok(), "missing {}", scope);
        }
    }
}
