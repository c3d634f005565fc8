//! Core record types: log events, scheduled actions, outcomes, clock state.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::actions::ActionParameters;
use crate::enums::{EventType, OutcomeStatus};
use crate::ids::{AgentId, EventId, ScheduledEventId, SimulationId};

// ---------------------------------------------------------------------------
// Event (log record)
// ---------------------------------------------------------------------------

/// An immutable entry of an environment's event log.
///
/// `content` never names agents directly: it uses anonymized tokens
/// (`"agent 3"`), and [`Event::agent_number_mapping`] resolves each token
/// back to the real agent id. Events are never deleted, only moved from the
/// pending to the processed partition of their queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Creation-order id, strictly increasing within a queue.
    pub event_id: EventId,
    /// The category of event.
    #[ts(as = "String")]
    pub event_type: EventType,
    /// Human-readable description using anonymized agent tokens.
    pub content: String,
    /// Environment tag; always equals the owning queue's environment.
    pub environment: String,
    /// Agent that caused the event, if any.
    pub source: Option<AgentId>,
    /// Agent the event is addressed to. `None` means every agent.
    pub target: Option<AgentId>,
    /// Agents involved in the event.
    pub participants: Vec<AgentId>,
    /// Simulated time the event happened.
    pub timestamp: NaiveDateTime,
    /// Location path, most general first (`["USA", "Maine", "Portland"]`).
    pub location: Vec<String>,
    /// Type-specific payload read by reducers.
    #[ts(type = "Record<string, unknown>")]
    pub metadata: BTreeMap<String, Value>,
    /// Anonymized token to agent id, for every token used in `content`.
    pub agent_number_mapping: BTreeMap<String, AgentId>,
}

impl Event {
    /// The location path joined with `"; "`, or `"Unknown"` when empty.
    pub fn location_string(&self) -> String {
        if self.location.is_empty() {
            "Unknown".to_owned()
        } else {
            self.location.join("; ")
        }
    }

    /// Resolve an anonymized token used in `content`.
    pub fn agent_for_token(&self, token: &str) -> Option<&AgentId> {
        self.agent_number_mapping.get(token)
    }

    /// Find the token this event uses for `agent_id`.
    pub fn token_for_agent(&self, agent_id: &AgentId) -> Option<&str> {
        self.agent_number_mapping
            .iter()
            .find(|(_, id)| *id == agent_id)
            .map(|(token, _)| token.as_str())
    }

    /// Whether `agent_id` may see this event (global or addressed to it).
    pub fn is_visible_to(&self, agent_id: &AgentId) -> bool {
        self.target.as_ref().is_none_or(|target| target == agent_id)
    }
}

// ---------------------------------------------------------------------------
// EventDraft
// ---------------------------------------------------------------------------

/// An event that has not been appended to a log yet.
///
/// Executors and tick hooks produce drafts; the event queue validates them,
/// assigns the [`EventId`], anonymizes the agents listed in
/// [`EventDraft::mentions`] and freezes the result into an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// The category of event.
    pub event_type: EventType,
    /// Description. Display names listed in `mentions` are replaced by
    /// anonymized tokens on append.
    pub content: String,
    /// Target environment. `None` means the environment of the receiving queue.
    #[serde(default)]
    pub environment: Option<String>,
    /// Agent that caused the event.
    #[serde(default)]
    pub source: Option<AgentId>,
    /// Agent the event is addressed to.
    #[serde(default)]
    pub target: Option<AgentId>,
    /// Agents involved in the event.
    #[serde(default)]
    pub participants: Vec<AgentId>,
    /// Simulated time. `None` means "now" at append time.
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    /// Location path, most general first.
    #[serde(default)]
    pub location: Vec<String>,
    /// Type-specific payload.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Display name as written in `content` to the agent it refers to.
    #[serde(default)]
    pub mentions: BTreeMap<String, AgentId>,
}

impl EventDraft {
    /// Start a draft with the given type and content.
    pub fn new(event_type: EventType, content: impl Into<String>) -> Self {
        Self {
            event_type,
            content: content.into(),
            environment: None,
            source: None,
            target: None,
            participants: Vec::new(),
            timestamp: None,
            location: Vec::new(),
            metadata: BTreeMap::new(),
            mentions: BTreeMap::new(),
        }
    }

    /// A message from `source`, optionally addressed to a single agent.
    pub fn message(content: impl Into<String>, source: AgentId, target: Option<AgentId>) -> Self {
        let mut draft = Self::new(EventType::Message, content).with_source(source);
        draft.target = target;
        draft
    }

    /// A change in the environment not caused by any agent.
    pub fn environmental_change(description: impl Into<String>) -> Self {
        Self::new(EventType::EnvironmentalChange, description)
            .with_metadata("origin", Value::String("environment".to_owned()))
    }

    /// An interaction between the given agents.
    pub fn interaction(description: impl Into<String>, participants: Vec<AgentId>) -> Self {
        let mut draft = Self::new(EventType::Interaction, description);
        draft.participants = participants;
        draft
    }

    /// An engine notification.
    pub fn system_notification(content: impl Into<String>) -> Self {
        Self::new(EventType::SystemNotification, content)
    }

    /// Set the source agent.
    #[must_use]
    pub fn with_source(mut self, source: AgentId) -> Self {
        self.source = Some(source);
        self
    }

    /// Address the event to a single agent.
    #[must_use]
    pub fn with_target(mut self, target: AgentId) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the environment explicitly.
    #[must_use]
    pub fn in_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Set the simulated timestamp explicitly.
    #[must_use]
    pub const fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the location path.
    #[must_use]
    pub fn located(mut self, location: Vec<String>) -> Self {
        self.location = location;
        self
    }

    /// Add one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_owned(), value);
        self
    }

    /// Record that `name` in the content refers to `agent_id`.
    #[must_use]
    pub fn mentioning(mut self, name: &str, agent_id: AgentId) -> Self {
        self.mentions.insert(name.to_owned(), agent_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// One agent action waiting to be dispatched at a simulated time.
///
/// Ordered by `due_time`, then `priority` (lower first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScheduledEvent {
    /// When the action should happen.
    pub due_time: NaiveDateTime,
    /// The acting agent.
    pub agent_id: AgentId,
    /// The action name as the planner wrote it.
    pub action_name: String,
    /// Interpreted action parameters.
    pub action: ActionParameters,
    /// Where the planner expects the action to take place.
    pub location: String,
    /// Tie-breaker among events due at the same time; lower goes first.
    pub priority: i64,
}

impl ScheduledEvent {
    /// The `(due_time, priority)` ordering key.
    pub const fn order_key(&self) -> (NaiveDateTime, i64) {
        (self.due_time, self.priority)
    }
}

/// One task in an agent's schedule shard of the world state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ScheduledTask {
    /// What the agent will do.
    pub action_name: String,
    /// When, if known.
    #[serde(default)]
    pub due_time: Option<NaiveDateTime>,
    /// Where, if known.
    #[serde(default)]
    pub location: Option<String>,
    /// Free-form task details.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub details: BTreeMap<String, Value>,
}

/// An abstract plan step as produced by an agent's planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Human-readable time, `"HH:MM AM/PM"` or `"HHMM AM/PM"`.
    #[serde(default)]
    pub target_time: String,
    /// Action name.
    #[serde(default = "default_plan_action")]
    pub action: String,
    /// Expected location.
    #[serde(default = "default_plan_location")]
    pub location: String,
    /// Raw action parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

fn default_plan_action() -> String {
    "Unknown".to_owned()
}

fn default_plan_location() -> String {
    "unknown".to_owned()
}

/// The audit record of how one scheduled event was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DispatchOutcome {
    /// Scheduler handle of the resolved event.
    pub scheduled_id: ScheduledEventId,
    /// The acting agent.
    pub agent_id: AgentId,
    /// Action name as planned.
    pub action_name: String,
    /// Action parameters as planned.
    pub action: ActionParameters,
    /// When the action was due.
    pub due_time: NaiveDateTime,
    /// Tie-break among events due at the same time; lower ran first.
    pub priority: i64,
    /// Planned location.
    pub location: String,
    /// Resolution.
    pub status: OutcomeStatus,
    /// Executor result payload, when it ran.
    #[ts(type = "unknown")]
    pub result: Option<Value>,
    /// Failure reason, when it did not succeed.
    pub error: Option<String>,
    /// Log events appended as a consequence of this action.
    pub emitted_events: Vec<EventId>,
    /// Start of the tick in which the event was resolved.
    pub resolved_at: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Clock persistence
// ---------------------------------------------------------------------------

/// Persisted form of the simulation clock, used to resume a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ClockState {
    /// The run this clock belongs to.
    pub simulation_id: SimulationId,
    /// Simulated start of the run.
    pub start: NaiveDateTime,
    /// Simulated "now".
    pub current: NaiveDateTime,
    /// Optional hard deadline of the run.
    pub end: Option<NaiveDateTime>,
    /// Tick length in seconds.
    pub tick_seconds: i64,
    /// Whether the clock was paused.
    pub paused: bool,
}
