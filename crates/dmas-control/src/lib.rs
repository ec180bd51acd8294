//! dMAS Control - State synchronization and command dispatch for the agent fleet
//!
//! This crate holds everything the console knows about the fleet and keeps
//! it consistent with the control service:
//!
//! - [`ConfigStore`] - per-scope configuration with isolated edits
//! - [`PopulationTracker`] - running counts per agent type
//! - [`AgentRegistry`] - addressable instances with targeted termination
//! - [`CommandDispatcher`] - non-blocking start, stop and simulation commands
//! - [`ControlCenter`] - the facade composing all of the above
//!
//! # Architecture
//!
//! ```text
//! CLI / views ──→ ControlCenter ──→ { ConfigStore | PopulationTracker |
//!                      │              AgentRegistry | CommandDispatcher }
//!                      │                         │
//!                      │                         ↓
//!                      │                  RemoteAgentApi ──→ control service
//!                      ↓
//!               ControlEvent broadcast
//! ```
//!
//! State is partitioned per agent type, each partition behind its own lock.
//! Refreshing or editing one type never touches another type's state.
//! Responses that arrive after a newer response (or a local edit) for the
//! same partition are discarded and reported as [`RefreshOutcome::Superseded`].

pub mod api;
pub mod center;
pub mod config_store;
pub mod dispatcher;
pub mod events;
pub mod http;
pub mod memory;
pub mod population;
pub mod registry;

mod slot;

pub use api::RemoteAgentApi;
pub use center::{ControlCenter, TypeRefresh, TypeStatus};
pub use config_store::ConfigStore;
pub use dispatcher::{CommandDispatcher, CommandHandle};
pub use events::{ControlEvent, EventBus};
pub use http::{HttpAgentApi, HttpApiConfig};
pub use memory::{ApiCall, InMemoryAgentApi, Operation};
pub use population::PopulationTracker;
pub use registry::AgentRegistry;

/// Result of a successful remote read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome<T> {
    /// The response replaced the stored state
    Applied(T),
    /// A newer response or a local edit won; stored state is unchanged
    Superseded,
}

impl<T> RefreshOutcome<T> {
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }

    pub fn applied(&self) -> Option<&T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Superseded => None,
        }
    }

    pub fn into_applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Superseded => None,
        }
    }
}
