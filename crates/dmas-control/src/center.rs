//! The control center facade
//!
//! [`ControlCenter`] composes the configuration store, the population
//! tracker, the instance registry and the command dispatcher behind one
//! object. Each operation is addressed to one scope or agent type and only
//! reads or writes that type's state.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use dmas_types::{
    Ack, AgentInstance, AgentType, ConfigEntry, ConfigScope, ControlError, ControlResult,
    PopulationCount, SimulationRequest,
};

use crate::api::RemoteAgentApi;
use crate::config_store::ConfigStore;
use crate::dispatcher::{CommandDispatcher, CommandHandle};
use crate::events::{ControlEvent, EventBus};
use crate::http::{HttpAgentApi, HttpApiConfig};
use crate::population::PopulationTracker;
use crate::registry::AgentRegistry;
use crate::RefreshOutcome;

// ============================================================================
// Aggregate Views
// ============================================================================

/// Everything known locally about one agent type
#[derive(Debug, Clone, Serialize)]
pub struct TypeStatus {
    pub agent_type: AgentType,
    pub population: PopulationCount,
    pub instances: Vec<AgentInstance>,
    /// Last population refresh failed; `population` may be stale
    pub last_refresh_failed: bool,
}

/// Outcome of refreshing every view of one type
#[derive(Debug)]
pub struct TypeRefresh {
    pub agent_type: AgentType,
    pub config: ControlResult<RefreshOutcome<ConfigEntry>>,
    pub population: ControlResult<RefreshOutcome<PopulationCount>>,
    pub instances: ControlResult<RefreshOutcome<Vec<AgentInstance>>>,
}

impl TypeRefresh {
    pub fn is_complete(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn errors(&self) -> Vec<&ControlError> {
        [
            self.config.as_ref().err(),
            self.population.as_ref().err(),
            self.instances.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// ============================================================================
// Facade
// ============================================================================

/// Single entry point for the presentation layer
pub struct ControlCenter {
    agent_types: Vec<AgentType>,
    api: Arc<dyn RemoteAgentApi>,
    config: ConfigStore,
    population: Arc<PopulationTracker>,
    registry: AgentRegistry,
    dispatcher: CommandDispatcher,
    events: EventBus,
}

impl ControlCenter {
    /// Control center managing every agent type
    pub fn new(api: Arc<dyn RemoteAgentApi>) -> Self {
        Self::with_agent_types(api, AgentType::ALL.to_vec())
    }

    /// Control center whose aggregate operations cover only `agent_types`
    pub fn with_agent_types(api: Arc<dyn RemoteAgentApi>, mut agent_types: Vec<AgentType>) -> Self {
        agent_types.sort();
        agent_types.dedup();

        let events = EventBus::new();
        Self {
            config: ConfigStore::new(Arc::clone(&api), events.clone()),
            population: Arc::new(PopulationTracker::new(Arc::clone(&api), events.clone())),
            registry: AgentRegistry::new(Arc::clone(&api), events.clone()),
            dispatcher: CommandDispatcher::new(Arc::clone(&api), events.clone()),
            agent_types,
            api,
            events,
        }
    }

    /// Control center talking HTTP to a control service
    pub fn connect(config: HttpApiConfig) -> ControlResult<Self> {
        let api = HttpAgentApi::new(config)?;
        info!(base_url = %api.base_url(), "Control center connected");
        Ok(Self::new(Arc::new(api)))
    }

    pub fn agent_types(&self) -> &[AgentType] {
        &self.agent_types
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    /// Address of the backend's grid view, if the backend has one
    pub fn grid_url(&self) -> Option<String> {
        self.api.grid_url()
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    pub fn config(&self, scope: impl Into<ConfigScope>) -> ConfigEntry {
        self.config.get(scope)
    }

    pub async fn refresh_config(
        &self,
        scope: impl Into<ConfigScope>,
    ) -> ControlResult<RefreshOutcome<ConfigEntry>> {
        self.config.refresh(scope).await
    }

    pub fn set_config_value(
        &self,
        scope: impl Into<ConfigScope>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.config.set_key(scope, key, value)
    }

    pub async fn save_config(&self, scope: impl Into<ConfigScope>) -> ControlResult<Ack> {
        self.config.save(scope).await
    }

    // ------------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------------

    pub fn population(&self, agent_type: AgentType) -> PopulationCount {
        self.population.get(agent_type)
    }

    pub async fn refresh_population(
        &self,
        agent_type: AgentType,
    ) -> ControlResult<RefreshOutcome<PopulationCount>> {
        self.population.refresh(agent_type).await
    }

    /// Poll the managed types' counts every `period` in the background
    pub fn watch_population(&self, period: Duration) -> JoinHandle<()> {
        self.population.spawn_refresh_loop(self.agent_types.clone(), period)
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    pub fn instances(&self, agent_type: AgentType) -> Vec<AgentInstance> {
        self.registry.list_by_type(agent_type)
    }

    pub fn all_instances(&self) -> Vec<AgentInstance> {
        self.registry.list_all()
    }

    pub fn instance(&self, key: &str) -> Option<AgentInstance> {
        self.registry.get(key)
    }

    pub async fn refresh_instances(
        &self,
        agent_type: AgentType,
    ) -> ControlResult<RefreshOutcome<Vec<AgentInstance>>> {
        self.registry.refresh(agent_type).await
    }

    pub async fn terminate_instance(&self, key: &str) -> ControlResult<Ack> {
        self.registry.terminate(key).await
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub fn start_agents(&self, agent_type: AgentType) -> CommandHandle {
        self.dispatcher.start(agent_type)
    }

    pub fn stop_agents(&self, agent_type: AgentType) -> CommandHandle {
        self.dispatcher.stop(agent_type)
    }

    pub fn simulate(&self, request: SimulationRequest) -> CommandHandle {
        self.dispatcher.simulate(request)
    }

    /// Parse a `YYYY-MM-DD` range and dispatch it
    pub fn simulate_range(&self, start: &str, end: &str) -> ControlResult<CommandHandle> {
        let request = SimulationRequest::parse(start, end)?;
        Ok(self.simulate(request))
    }

    // ------------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------------

    /// Refresh configuration, population and instances of one type concurrently
    pub async fn refresh_type(&self, agent_type: AgentType) -> TypeRefresh {
        let (config, population, instances) = tokio::join!(
            self.config.refresh(agent_type),
            self.population.refresh(agent_type),
            self.registry.refresh(agent_type),
        );
        TypeRefresh {
            agent_type,
            config,
            population,
            instances,
        }
    }

    /// Refresh every managed type; one type failing never blocks another
    pub async fn refresh_all(&self) -> Vec<TypeRefresh> {
        let reports = join_all(self.agent_types.iter().map(|&agent_type| self.refresh_type(agent_type))).await;
        let failed = reports.iter().filter(|r| !r.is_complete()).count();
        info!(types = reports.len(), failed = failed, "Fleet refresh finished");
        reports
    }

    /// Point-in-time status of every managed type
    pub fn fleet_status(&self) -> Vec<TypeStatus> {
        self.agent_types
            .iter()
            .map(|&agent_type| TypeStatus {
                agent_type,
                population: self.population.get(agent_type),
                instances: self.registry.list_by_type(agent_type),
                last_refresh_failed: self.population.last_error(agent_type).is_some(),
            })
            .collect()
    }
}
