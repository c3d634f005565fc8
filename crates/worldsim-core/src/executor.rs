//! The seam between the scheduler and whatever carries out agent actions.
//!
//! The scheduler hands each due [`ScheduledEvent`] to an [`Executor`]
//! together with a read-only view of the world. The executor reports back
//! whether the action happened and which events it produced. It never
//! touches the world directly: the drafts it returns are appended to the
//! event log and reduced into the world by the scheduler.
//!
//! Dispatch is a synchronous call. An executor that needs to bound its own
//! latency (for example around an LLM call) enforces the limit itself and
//! returns [`ExecutorError::Timeout`].

use serde_json::{Value, json};
use worldsim_types::{ActionParameters, EventDraft, ScheduledEvent};
use worldsim_world::{AgentSnapshot, WorldState};

use crate::clock::TickWindow;

/// Errors an executor may report for one action.
///
/// Every variant becomes a `failed` outcome; none of them stop the tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The action took longer than the executor allows.
    #[error("action timed out after {limit_ms}ms")]
    Timeout {
        /// The limit that was exceeded, in milliseconds.
        limit_ms: u64,
    },

    /// The action is not possible in the current world.
    #[error("action rejected: {reason}")]
    Rejected {
        /// Why the action could not happen.
        reason: String,
    },

    /// The executor itself failed.
    #[error("executor failure: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

/// Read-only context for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// The world as of this dispatch (after earlier dispatches in the tick).
    pub world: &'a WorldState,
    /// The tick being dispatched.
    pub window: TickWindow,
    /// Environment tag of the event log.
    pub environment: &'a str,
}

/// What an executor did with one action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Whether the action happened.
    pub executed: bool,
    /// Executor-specific result payload.
    pub result: Option<Value>,
    /// Reason when `executed` is false.
    pub error: Option<String>,
    /// Events the action produced, in order. Dropped when `executed` is
    /// false.
    pub events: Vec<EventDraft>,
}

impl ExecutionReport {
    /// A successful action producing `events`.
    pub const fn executed(events: Vec<EventDraft>) -> Self {
        Self {
            executed: true,
            result: None,
            error: None,
            events,
        }
    }

    /// An action that did not happen.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            executed: false,
            result: None,
            error: Some(reason.into()),
            events: Vec::new(),
        }
    }

    /// Attach a result payload.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// Carries out scheduled agent actions.
pub trait Executor {
    /// Execute `event` on behalf of `agent`.
    ///
    /// # Errors
    ///
    /// Any error is recorded as a `failed` outcome for this event only.
    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
    ) -> Result<ExecutionReport, ExecutorError>;
}

/// Executor that accepts every action and logs it as an interaction.
///
/// Travel actions carry `action = "Travel"` and the destination in their
/// metadata, so the environmental reducer moves the agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubExecutor;

impl Executor for StubExecutor {
    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
    ) -> Result<ExecutionReport, ExecutorError> {
        let name = agent.agent_id.as_str();
        let mut draft = EventDraft::interaction(
            format!("{name} performs {} at {}", event.action_name, event.location),
            vec![agent.agent_id.clone()],
        )
        .with_source(agent.agent_id.clone())
        .in_environment(ctx.environment)
        .located(vec![event.location.clone()])
        .mentioning(name, agent.agent_id.clone())
        .with_metadata("action", Value::String(event.action_name.clone()));
        if let ActionParameters::Travel { to, .. } = &event.action {
            draft = draft.with_metadata("to", Value::String(to.as_str().to_owned()));
        }
        Ok(ExecutionReport::executed(vec![draft]).with_result(json!({ "kind": event.action.kind() })))
    }
}
