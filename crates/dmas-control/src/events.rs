//! Control center events
//!
//! Events are broadcast to every subscriber (terminal views, watchers, ...).
//! Sending with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use dmas_types::{AgentType, CommandResult, ConfigScope, ControlError, PopulationCount};

/// Capacity of the event channel before slow subscribers start lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// State changes and outcomes observable by the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    /// A scope's configuration was replaced by a fresh fetch
    ConfigRefreshed {
        scope: ConfigScope,
        keys: usize,
        timestamp: DateTime<Utc>,
    },

    /// A scope's configuration was pushed to the backend
    ConfigSaved {
        scope: ConfigScope,
        timestamp: DateTime<Utc>,
    },

    /// A type's population count was replaced
    PopulationUpdated {
        agent_type: AgentType,
        population: PopulationCount,
        timestamp: DateTime<Utc>,
    },

    /// A type's instance subset was replaced
    InstancesRefreshed {
        agent_type: AgentType,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An instance was terminated and removed from the registry
    InstanceTerminated {
        key: String,
        timestamp: DateTime<Utc>,
    },

    /// An instance termination failed; the instance stays listed
    InstanceTerminationFailed {
        key: String,
        error: ControlError,
        timestamp: DateTime<Utc>,
    },

    /// A fleet command finished
    CommandCompleted { result: CommandResult },

    /// A refresh failed; last-known-good state was kept
    RefreshFailed {
        target: String,
        error: ControlError,
        timestamp: DateTime<Utc>,
    },
}

/// Sending half shared by all components of one control center
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ControlEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn emit(&self, event: ControlEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(ControlEvent::InstanceTerminated {
            key: "DEM_40".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(ControlEvent::ConfigSaved {
            scope: ConfigScope::Service,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            ControlEvent::ConfigSaved { scope, .. } => assert_eq!(scope, ConfigScope::Service),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = ControlEvent::PopulationUpdated {
            agent_type: AgentType::Net,
            population: PopulationCount::known(3),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PopulationUpdated");
        assert_eq!(json["agent_type"], "NET");
        assert_eq!(json["population"]["count"], 3);
    }
}
