//! Running-agent counts per type

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dmas_types::{AgentType, ControlError, ControlResult, PopulationCount};

use crate::api::RemoteAgentApi;
use crate::events::{ControlEvent, EventBus};
use crate::slot::Partitioned;
use crate::RefreshOutcome;

#[derive(Debug, Clone, Default)]
struct PopulationState {
    count: PopulationCount,
    last_error: Option<ControlError>,
}

/// Tracks the running-agent count of each type independently
pub struct PopulationTracker {
    api: Arc<dyn RemoteAgentApi>,
    counts: Partitioned<AgentType, PopulationState>,
    events: EventBus,
}

impl PopulationTracker {
    pub fn new(api: Arc<dyn RemoteAgentApi>, events: EventBus) -> Self {
        Self {
            api,
            counts: Partitioned::new(),
            events,
        }
    }

    /// Last known count; [`PopulationCount::Unknown`] until a refresh succeeds
    pub fn get(&self, agent_type: AgentType) -> PopulationCount {
        self.counts.slot(agent_type).read(|s| s.count)
    }

    /// Error of the most recent failed refresh, cleared by the next success
    pub fn last_error(&self, agent_type: AgentType) -> Option<ControlError> {
        self.counts.slot(agent_type).read(|s| s.last_error.clone())
    }

    /// Point-in-time copy of every type's count
    pub fn snapshot(&self) -> Vec<(AgentType, PopulationCount)> {
        self.counts
            .iter()
            .map(|(agent_type, slot)| (agent_type, slot.read(|s| s.count)))
            .collect()
    }

    /// Fetch the running count of one type
    ///
    /// A failure keeps the last known count and records the error.
    pub async fn refresh(&self, agent_type: AgentType) -> ControlResult<RefreshOutcome<PopulationCount>> {
        let slot = self.counts.slot(agent_type);
        let ticket = slot.ticket();

        let count = match self.api.fetch_count(agent_type).await {
            Ok(count) => count,
            Err(e) => {
                if slot.reject(ticket, |s| s.last_error = Some(e.clone())).is_none() {
                    debug!(agent_type = %agent_type, error = %e, "Discarding superseded population failure");
                    return Ok(RefreshOutcome::Superseded);
                }
                warn!(agent_type = %agent_type, error = %e, "Population refresh failed, keeping last known count");
                self.events.emit(ControlEvent::RefreshFailed {
                    target: format!("population/{}", agent_type),
                    error: e.clone(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        let population = PopulationCount::known(count);
        let applied = slot.apply(ticket, |s| {
            s.count = population;
            s.last_error = None;
        });

        if applied.is_none() {
            debug!(agent_type = %agent_type, "Discarding superseded population response");
            return Ok(RefreshOutcome::Superseded);
        }

        info!(agent_type = %agent_type, count = count, "Population updated");
        self.events.emit(ControlEvent::PopulationUpdated {
            agent_type,
            population,
            timestamp: Utc::now(),
        });
        Ok(RefreshOutcome::Applied(population))
    }

    /// Refresh several types concurrently; each result stands alone
    pub async fn refresh_many(
        &self,
        agent_types: &[AgentType],
    ) -> Vec<(AgentType, ControlResult<RefreshOutcome<PopulationCount>>)> {
        let refreshes = agent_types.iter().map(|&agent_type| async move {
            (agent_type, self.refresh(agent_type).await)
        });
        join_all(refreshes).await
    }

    /// Re-poll the given types every `period` until the handle is aborted
    pub fn spawn_refresh_loop(self: &Arc<Self>, agent_types: Vec<AgentType>, period: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        info!(types = agent_types.len(), period_secs = period.as_secs_f64(), "Starting population refresh loop");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Failures are already logged and recorded per type
                let _ = tracker.refresh_many(&agent_types).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryAgentApi, Operation};
    use dmas_types::AgentInstance;

    fn tracker_with(api: Arc<InMemoryAgentApi>) -> PopulationTracker {
        PopulationTracker::new(api, EventBus::new())
    }

    fn api_with_net(n: usize) -> InMemoryAgentApi {
        (0..n).fold(InMemoryAgentApi::new(), |api, i| {
            api.with_instance(AgentInstance::new(format!("NET_{}", i), AgentType::Net))
        })
    }

    #[tokio::test]
    async fn test_unknown_until_first_refresh() {
        let tracker = tracker_with(Arc::new(api_with_net(3)));
        assert_eq!(tracker.get(AgentType::Net), PopulationCount::Unknown);

        tracker.refresh(AgentType::Net).await.unwrap();
        assert_eq!(tracker.get(AgentType::Net).count(), Some(3));
    }

    #[tokio::test]
    async fn test_refresh_of_one_type_leaves_others() {
        let tracker = tracker_with(Arc::new(api_with_net(2)));
        tracker.refresh(AgentType::Net).await.unwrap();

        for agent_type in AgentType::ALL.into_iter().filter(|t| *t != AgentType::Net) {
            assert_eq!(tracker.get(agent_type), PopulationCount::Unknown);
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_last_known_count() {
        let api = Arc::new(api_with_net(3));
        let tracker = tracker_with(api.clone());
        tracker.refresh(AgentType::Net).await.unwrap();

        api.fail(Operation::FetchCount, ControlError::unreachable("connection refused"));
        assert!(tracker.refresh(AgentType::Net).await.is_err());
        assert_eq!(tracker.get(AgentType::Net).count(), Some(3));
        assert!(tracker.last_error(AgentType::Net).is_some());

        api.recover(Operation::FetchCount);
        tracker.refresh(AgentType::Net).await.unwrap();
        assert!(tracker.last_error(AgentType::Net).is_none());
    }

    #[tokio::test]
    async fn test_failure_before_any_success_stays_unknown() {
        let api = Arc::new(InMemoryAgentApi::new());
        api.fail(Operation::FetchCount, ControlError::status(503, "unavailable"));
        let tracker = tracker_with(api);

        assert!(tracker.refresh(AgentType::Str).await.is_err());
        assert_eq!(tracker.get(AgentType::Str), PopulationCount::Unknown);
    }

    #[tokio::test]
    async fn test_refresh_many_reports_each_type() {
        let tracker = tracker_with(Arc::new(api_with_net(1)));
        let results = tracker.refresh_many(&[AgentType::Net, AgentType::Pwp]).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(tracker.get(AgentType::Net).count(), Some(1));
        assert_eq!(tracker.get(AgentType::Pwp).count(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_does_not_mark_newer_count_stale() {
        let api = Arc::new(api_with_net(1));
        let tracker = tracker_with(api.clone());
        let mut events = tracker.events.subscribe();

        api.fail(Operation::FetchCount, ControlError::unreachable("down"));
        api.delay_next(Operation::FetchCount, Duration::from_secs(5));
        let slow = tracker.refresh(AgentType::Net);
        tokio::pin!(slow);
        assert!(futures::poll!(&mut slow).is_pending());

        api.recover(Operation::FetchCount);
        let fast = tracker.refresh(AgentType::Net).await.unwrap();
        assert_eq!(fast.applied().and_then(|p| p.count()), Some(1));

        assert!(slow.await.unwrap().is_superseded());
        assert_eq!(tracker.get(AgentType::Net).count(), Some(1));
        assert!(tracker.last_error(AgentType::Net).is_none());

        assert!(matches!(events.try_recv(), Ok(ControlEvent::PopulationUpdated { .. })));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_polls_periodically() {
        let api = Arc::new(api_with_net(2));
        let tracker = Arc::new(tracker_with(api.clone()));

        let handle = tracker.spawn_refresh_loop(vec![AgentType::Net], Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.abort();

        assert_eq!(tracker.get(AgentType::Net).count(), Some(2));
        assert_eq!(api.call_count(Operation::FetchCount), 3);
    }
}
