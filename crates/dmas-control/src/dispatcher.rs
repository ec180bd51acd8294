//! Fleet-level commands
//!
//! Every command runs on its own task and returns immediately with a
//! [`CommandHandle`]. Commands share no mutable state, so a slow start for one
//! type never holds up a stop for another.

use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use dmas_types::{
    Ack, AgentType, CommandKind, CommandResult, CommandTarget, ControlError, ControlResult,
    SimulationRequest,
};

use crate::api::RemoteAgentApi;
use crate::events::{ControlEvent, EventBus};

/// A command in flight or already decided
#[derive(Debug)]
pub enum CommandHandle {
    /// Decided without contacting the backend
    Ready(CommandResult),
    /// Running on a spawned task
    Pending {
        kind: CommandKind,
        target: CommandTarget,
        task: JoinHandle<CommandResult>,
    },
}

impl CommandHandle {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Ready(result) => result.kind,
            Self::Pending { kind, .. } => *kind,
        }
    }

    pub fn target(&self) -> &CommandTarget {
        match self {
            Self::Ready(result) => &result.target,
            Self::Pending { target, .. } => target,
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Self::Ready(_) => true,
            Self::Pending { task, .. } => task.is_finished(),
        }
    }

    /// Wait for the terminal result
    ///
    /// Dropping the handle instead does not cancel the command; its result is
    /// still broadcast as [`ControlEvent::CommandCompleted`].
    pub async fn outcome(self) -> CommandResult {
        match self {
            Self::Ready(result) => result,
            Self::Pending { kind, target, task } => match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!(command = %kind, target = %target, error = %join_error, "Command task stopped");
                    CommandResult::from_outcome::<Ack>(
                        kind,
                        target,
                        Err(ControlError::Interrupted(join_error.to_string())),
                    )
                }
            },
        }
    }
}

/// Issues start, stop and simulation commands
///
/// Dispatching spawns onto the current Tokio runtime. Outside a runtime the
/// command fails at once with [`ControlError::Interrupted`] and never reaches
/// the backend.
#[derive(Clone)]
pub struct CommandDispatcher {
    api: Arc<dyn RemoteAgentApi>,
    events: EventBus,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn RemoteAgentApi>, events: EventBus) -> Self {
        Self { api, events }
    }

    /// Launch the configured instance range of a type
    pub fn start(&self, agent_type: AgentType) -> CommandHandle {
        self.dispatch(CommandKind::Start, CommandTarget::AgentType(agent_type), move |api| async move {
            api.start_type(agent_type).await
        })
    }

    /// Terminate every instance of a type
    pub fn stop(&self, agent_type: AgentType) -> CommandHandle {
        self.dispatch(CommandKind::Terminate, CommandTarget::AgentType(agent_type), move |api| async move {
            api.terminate_type(agent_type).await
        })
    }

    /// Trigger a simulation run; a reversed range fails here without any
    /// backend call
    pub fn simulate(&self, request: SimulationRequest) -> CommandHandle {
        if let Err(invalid) = request.validate() {
            warn!(range = %request, error = %invalid, "Rejected simulation request");
            let result = CommandResult::from_outcome::<Ack>(
                CommandKind::Simulate,
                CommandTarget::Range(request),
                Err(invalid.into()),
            );
            self.events.emit(ControlEvent::CommandCompleted { result: result.clone() });
            return CommandHandle::Ready(result);
        }

        self.dispatch(CommandKind::Simulate, CommandTarget::Range(request), move |api| async move {
            api.start_simulation(&request).await
        })
    }

    fn dispatch<F, Fut>(&self, kind: CommandKind, target: CommandTarget, call: F) -> CommandHandle
    where
        F: FnOnce(Arc<dyn RemoteAgentApi>) -> Fut + Send + 'static,
        Fut: Future<Output = ControlResult<Ack>> + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(command = %kind, target = %target, error = %e, "No runtime to dispatch on");
                let result = CommandResult::from_outcome::<Ack>(
                    kind,
                    target,
                    Err(ControlError::Interrupted(e.to_string())),
                );
                self.events.emit(ControlEvent::CommandCompleted { result: result.clone() });
                return CommandHandle::Ready(result);
            }
        };

        info!(command = %kind, target = %target, "Dispatching command");

        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let task_target = target.clone();

        let task = runtime.spawn(async move {
            let result = CommandResult::from_outcome(kind, task_target, call(api).await);
            match result.error() {
                None => info!(command = %kind, target = %result.target, id = %result.id, "Command succeeded"),
                Some(e) => warn!(command = %kind, target = %result.target, id = %result.id, error = %e, "Command failed"),
            }
            events.emit(ControlEvent::CommandCompleted { result: result.clone() });
            result
        });

        CommandHandle::Pending { kind, target, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryAgentApi, Operation};
    use dmas_types::{CommandStatus, ValidationError};
    use std::time::Duration;

    fn dispatcher_with(api: Arc<InMemoryAgentApi>) -> CommandDispatcher {
        CommandDispatcher::new(api, EventBus::new())
    }

    #[tokio::test]
    async fn test_reversed_range_fails_without_network() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        let dispatcher = dispatcher_with(api.clone());

        let request = SimulationRequest::parse("2019-05-01", "2019-01-01").unwrap();
        let handle = dispatcher.simulate(request);
        assert!(matches!(handle, CommandHandle::Ready(_)));

        let result = handle.outcome().await;
        assert!(matches!(
            result.status,
            CommandStatus::Failed(ControlError::Validation(ValidationError::InvalidRange { .. }))
        ));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_dispatch_outside_runtime_fails_without_panicking() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let dispatcher = CommandDispatcher::new(api.clone(), events);

        match dispatcher.start(AgentType::Dem) {
            CommandHandle::Ready(result) => {
                assert!(matches!(result.status, CommandStatus::Failed(ControlError::Interrupted(_))));
            }
            CommandHandle::Pending { .. } => panic!("expected an immediate failure"),
        }
        assert!(api.calls().is_empty());
        assert!(matches!(rx.try_recv(), Ok(ControlEvent::CommandCompleted { .. })));
    }

    #[tokio::test]
    async fn test_valid_simulation_reaches_backend() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        let dispatcher = dispatcher_with(api.clone());

        let result = dispatcher.simulate(SimulationRequest::default()).outcome().await;
        assert!(result.is_success());
        assert_eq!(api.simulations(), vec![SimulationRequest::default()]);
    }

    #[tokio::test]
    async fn test_single_day_range_is_valid() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        let dispatcher = dispatcher_with(api.clone());

        let request = SimulationRequest::parse("2019-03-01", "2019-03-01").unwrap();
        assert!(dispatcher.simulate(request).outcome().await.is_success());
    }

    #[tokio::test]
    async fn test_start_and_stop_report_results() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        let dispatcher = dispatcher_with(api.clone());

        let started = dispatcher.start(AgentType::Res).outcome().await;
        assert!(started.is_success());
        assert_eq!(started.kind, CommandKind::Start);
        assert!(!api.running(AgentType::Res).is_empty());

        let stopped = dispatcher.stop(AgentType::Res).outcome().await;
        assert!(stopped.is_success());
        assert_eq!(stopped.kind, CommandKind::Terminate);
        assert!(api.running(AgentType::Res).is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_a_value() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        api.fail(Operation::StartType, ControlError::status(500, "spawn failed"));
        let dispatcher = dispatcher_with(api);

        let result = dispatcher.start(AgentType::Str).outcome().await;
        assert_eq!(result.error(), Some(&ControlError::status(500, "spawn failed")));
        assert_eq!(result.target, CommandTarget::AgentType(AgentType::Str));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_command_does_not_block_another() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        api.delay_next(Operation::StartType, Duration::from_secs(30));
        let dispatcher = dispatcher_with(api.clone());

        let slow = dispatcher.start(AgentType::Pwp);
        let fast = dispatcher.stop(AgentType::Net).outcome().await;

        assert!(fast.is_success());
        assert!(!slow.is_finished());
        assert!(slow.outcome().await.is_success());
    }

    #[tokio::test]
    async fn test_completion_is_broadcast_once() {
        let api = Arc::new(InMemoryAgentApi::seeded());
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let dispatcher = CommandDispatcher::new(api, events);

        let result = dispatcher.start(AgentType::Mrk).outcome().await;

        match rx.recv().await.unwrap() {
            ControlEvent::CommandCompleted { result: broadcast } => assert_eq!(broadcast.id, result.id),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
