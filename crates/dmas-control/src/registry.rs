//! Addressable running instances
//!
//! Instances are held in one table per agent type. A refresh replaces exactly
//! one type's table, so listings of other types never shift underneath a
//! caller.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use dmas_types::{
    Ack, AgentInstance, AgentType, ControlResult, InstanceStatus, ValidationError,
};

use crate::api::RemoteAgentApi;
use crate::events::{ControlEvent, EventBus};
use crate::slot::Partitioned;
use crate::RefreshOutcome;

type InstanceTable = BTreeMap<String, AgentInstance>;

/// Registry of running agent instances, indexed by type and key
pub struct AgentRegistry {
    api: Arc<dyn RemoteAgentApi>,
    tables: Partitioned<AgentType, InstanceTable>,
    events: EventBus,
}

impl AgentRegistry {
    pub fn new(api: Arc<dyn RemoteAgentApi>, events: EventBus) -> Self {
        Self {
            api,
            tables: Partitioned::new(),
            events,
        }
    }

    /// Instances of one type, ordered by key
    pub fn list_by_type(&self, agent_type: AgentType) -> Vec<AgentInstance> {
        self.tables
            .slot(agent_type)
            .read(|table| table.values().cloned().collect())
    }

    /// Instances of every type, ordered by key
    pub fn list_all(&self) -> Vec<AgentInstance> {
        let mut all: Vec<AgentInstance> = self
            .tables
            .iter()
            .flat_map(|(_, slot)| slot.read(|table| table.values().cloned().collect::<Vec<_>>()))
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn get(&self, key: &str) -> Option<AgentInstance> {
        let agent_type = self.locate(key)?;
        self.tables.slot(agent_type).read(|table| table.get(key).cloned())
    }

    /// Replace the instances of one type with a fresh backend listing
    ///
    /// Entries the backend attributes to another type are dropped.
    pub async fn refresh(&self, agent_type: AgentType) -> ControlResult<RefreshOutcome<Vec<AgentInstance>>> {
        let slot = self.tables.slot(agent_type);
        let ticket = slot.ticket();

        let fetched = match self.api.fetch_instances(agent_type).await {
            Ok(instances) => instances,
            Err(e) => {
                if slot.reject(ticket, |_| ()).is_none() {
                    debug!(agent_type = %agent_type, error = %e, "Discarding superseded instance failure");
                    return Ok(RefreshOutcome::Superseded);
                }
                warn!(agent_type = %agent_type, error = %e, "Instance refresh failed, keeping last known listing");
                self.events.emit(ControlEvent::RefreshFailed {
                    target: format!("instances/{}", agent_type),
                    error: e.clone(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        let fresh: InstanceTable = fetched
            .into_iter()
            .filter(|instance| {
                if instance.agent_type != agent_type {
                    warn!(
                        key = %instance.key,
                        requested = %agent_type,
                        reported = %instance.agent_type,
                        "Ignoring instance listed under another type"
                    );
                    return false;
                }
                true
            })
            .map(|instance| (instance.key.clone(), instance))
            .collect();

        let count = fresh.len();
        match slot.apply(ticket, move |table| {
            *table = fresh;
            table.values().cloned().collect::<Vec<_>>()
        }) {
            Some(listing) => {
                info!(agent_type = %agent_type, count = count, "Instances refreshed");
                self.events.emit(ControlEvent::InstancesRefreshed {
                    agent_type,
                    count,
                    timestamp: Utc::now(),
                });
                Ok(RefreshOutcome::Applied(listing))
            }
            None => {
                debug!(agent_type = %agent_type, "Discarding superseded instance listing");
                Ok(RefreshOutcome::Superseded)
            }
        }
    }

    /// Terminate one instance by key
    ///
    /// On success the key is removed from its table. On failure the entry
    /// stays listed and is marked [`InstanceStatus::TerminationFailed`].
    pub async fn terminate(&self, key: &str) -> ControlResult<Ack> {
        if key.trim().is_empty() {
            return Err(ValidationError::MalformedInstanceKey { key: key.to_string() }.into());
        }
        let agent_type = self.locate(key);

        match self.api.terminate_instance(key).await {
            Ok(ack) => {
                if let Some(agent_type) = agent_type {
                    self.tables.slot(agent_type).update(|table| table.remove(key));
                }
                info!(key = %key, "Instance terminated");
                self.events.emit(ControlEvent::InstanceTerminated {
                    key: key.to_string(),
                    timestamp: Utc::now(),
                });
                Ok(ack)
            }
            Err(e) => {
                let reason = e.to_string();
                let marked = agent_type.map_or(false, |agent_type| {
                    self.tables.slot(agent_type).touch(|table| match table.get_mut(key) {
                        Some(instance) => {
                            instance.status = InstanceStatus::TerminationFailed { reason };
                            true
                        }
                        None => false,
                    })
                });
                warn!(key = %key, error = %e, listed = marked, "Instance termination failed");
                self.events.emit(ControlEvent::InstanceTerminationFailed {
                    key: key.to_string(),
                    error: e.clone(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// Type table holding `key`: the key prefix when it names a type,
    /// otherwise whichever table lists it
    fn locate(&self, key: &str) -> Option<AgentType> {
        AgentInstance::type_from_key(key).ok().or_else(|| {
            self.tables
                .iter()
                .find(|(_, slot)| slot.read(|table| table.contains_key(key)))
                .map(|(agent_type, _)| agent_type)
        })
    }
}
