//! Per-scope configuration cache
//!
//! Every [`ConfigScope`] owns its own [`ConfigEntry`]. A refresh replaces the
//! whole entry of one scope; an edit touches one key of one scope. Nothing
//! here ever writes to more than one scope.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use dmas_types::{Ack, ConfigEntry, ConfigScope, ControlResult};

use crate::api::RemoteAgentApi;
use crate::events::{ControlEvent, EventBus};
use crate::slot::Partitioned;
use crate::RefreshOutcome;

/// Configuration cache with isolated per-scope mutation
pub struct ConfigStore {
    api: Arc<dyn RemoteAgentApi>,
    entries: Partitioned<ConfigScope, ConfigEntry>,
    events: EventBus,
}

impl ConfigStore {
    pub fn new(api: Arc<dyn RemoteAgentApi>, events: EventBus) -> Self {
        Self {
            api,
            entries: Partitioned::new(),
            events,
        }
    }

    /// Current entry of a scope; empty if never fetched
    pub fn get(&self, scope: impl Into<ConfigScope>) -> ConfigEntry {
        self.entries.slot(scope.into()).read(ConfigEntry::clone)
    }

    /// Fetch a scope's configuration and replace the stored entry wholesale
    ///
    /// On failure the stored entry is left untouched.
    pub async fn refresh(
        &self,
        scope: impl Into<ConfigScope>,
    ) -> ControlResult<RefreshOutcome<ConfigEntry>> {
        let scope = scope.into();
        let slot = self.entries.slot(scope);
        let ticket = slot.ticket();

        let fetched = match self.api.fetch_config(scope).await {
            Ok(entry) => entry,
            Err(e) => {
                if slot.reject(ticket, |_| ()).is_none() {
                    debug!(scope = %scope, error = %e, "Discarding superseded config failure");
                    return Ok(RefreshOutcome::Superseded);
                }
                warn!(scope = %scope, error = %e, "Config refresh failed, keeping last known entry");
                self.events.emit(ControlEvent::RefreshFailed {
                    target: format!("config/{}", scope),
                    error: e.clone(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        let keys = fetched.len();
        match slot.apply(ticket, move |entry| {
            *entry = fetched;
            entry.clone()
        }) {
            Some(entry) => {
                info!(scope = %scope, keys = keys, "Config refreshed");
                self.events.emit(ControlEvent::ConfigRefreshed {
                    scope,
                    keys,
                    timestamp: Utc::now(),
                });
                Ok(RefreshOutcome::Applied(entry))
            }
            None => {
                debug!(scope = %scope, "Discarding superseded config response");
                Ok(RefreshOutcome::Superseded)
            }
        }
    }

    /// Local edit of one key; returns the previous value
    ///
    /// Visible immediately to [`ConfigStore::get`]. A refresh that was already
    /// in flight when the edit happened will not overwrite it.
    pub fn set_key(
        &self,
        scope: impl Into<ConfigScope>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        let scope = scope.into();
        let (key, value) = (key.into(), value.into());
        debug!(scope = %scope, key = %key, "Config key edited");
        self.entries.slot(scope).update(move |entry| entry.set(key, value))
    }

    /// Push the current entry of a scope to the backend
    ///
    /// Local state is kept on success and on failure.
    pub async fn save(&self, scope: impl Into<ConfigScope>) -> ControlResult<Ack> {
        let scope = scope.into();
        let snapshot = self.get(scope);

        match self.api.push_config(scope, &snapshot).await {
            Ok(ack) => {
                info!(scope = %scope, keys = snapshot.len(), "Config saved");
                self.events.emit(ControlEvent::ConfigSaved {
                    scope,
                    timestamp: Utc::now(),
                });
                Ok(ack)
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Config save failed");
                Err(e)
            }
        }
    }
}
