//! Side hooks that run around each tick's dispatch.
//!
//! A hook sees a read-only [`TickView`] and may only answer with event
//! drafts. The scheduler appends those drafts to the log and reduces them
//! into the world exactly like executor output, so hooks can never mutate
//! the world behind the reducers' back.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};
use worldsim_events::EventQueue;
use worldsim_types::{ActionParameters, AgentId, EventDraft, ScheduledEvent};
use worldsim_world::{AgentSnapshot, WorldState};

use crate::clock::TickWindow;
use crate::executor::ExecutorError;
use crate::scheduler::TickReport;

/// What a hook can see of the simulation.
#[derive(Debug, Clone, Copy)]
pub struct TickView<'a> {
    /// The tick being processed.
    pub window: TickWindow,
    /// The world. Before dispatch this is the pre-tick state; after the
    /// tick it includes every event recorded during it.
    pub world: &'a WorldState,
    /// Events due in this tick, in dispatch order.
    pub due: &'a [ScheduledEvent],
    /// The event log.
    pub events: &'a EventQueue,
}

/// A side hook run once per tick.
pub trait TickHook {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called after the due events are selected and before any of them is
    /// dispatched.
    fn before_dispatch(&mut self, view: &TickView<'_>) -> Vec<EventDraft> {
        let _ = view;
        Vec::new()
    }

    /// Called once every due event has been resolved.
    fn after_tick(&mut self, view: &TickView<'_>, report: &TickReport) -> Vec<EventDraft> {
        let _ = (view, report);
        Vec::new()
    }
}

/// A conversation that took place between two agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// One-line summary for the log.
    pub summary: String,
    /// Number of turns exchanged.
    pub turns: u32,
    /// Display names used in `summary` and the agents they refer to. Each
    /// is replaced by the agent's token before the summary is logged.
    pub mentions: BTreeMap<String, AgentId>,
}

/// Runs a conversation between two agents, e.g. by prompting a model.
pub trait ConversationRunner {
    /// Hold a conversation started by `sender` on `channel`.
    ///
    /// `Ok(None)` means the recipient did not engage.
    ///
    /// # Errors
    ///
    /// Errors are logged and the conversation is skipped.
    fn run_conversation(
        &mut self,
        sender: &AgentSnapshot,
        recipient: &AgentSnapshot,
        channel: &str,
        opening: Option<&str>,
    ) -> Result<Option<Conversation>, ExecutorError>;
}

/// Turns due direct messages into conversations.
///
/// For every due `dm_on_<channel>` action whose sender and recipient both
/// exist, the runner is asked to hold a conversation; each conversation
/// that happens is logged as an `interaction` between the two agents.
#[derive(Debug)]
pub struct ConversationTrigger<R> {
    runner: R,
}

impl<R: ConversationRunner> ConversationTrigger<R> {
    /// Wrap a conversation runner.
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// The wrapped runner.
    pub const fn runner(&self) -> &R {
        &self.runner
    }
}

impl<R: ConversationRunner> TickHook for ConversationTrigger<R> {
    fn name(&self) -> &str {
        "conversation_trigger"
    }

    fn before_dispatch(&mut self, view: &TickView<'_>) -> Vec<EventDraft> {
        let mut drafts = Vec::new();
        for event in view.due {
            let ActionParameters::DirectMessage {
                channel,
                recipient,
                body,
                ..
            } = &event.action
            else {
                continue;
            };
            let (Some(sender), Some(receiver)) = (
                view.world.agent_snapshot(&event.agent_id),
                view.world.agent_snapshot(recipient),
            ) else {
                debug!(
                    sender = %event.agent_id,
                    recipient = %recipient,
                    "Direct message between unknown agents, no conversation"
                );
                continue;
            };

            match self
                .runner
                .run_conversation(&sender, &receiver, channel, body.as_deref())
            {
                Ok(Some(conversation)) => {
                    drafts.push(conversation_draft(
                        event,
                        recipient,
                        channel,
                        &conversation,
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        sender = %event.agent_id,
                        recipient = %recipient,
                        channel = %channel,
                        error = %e,
                        "Conversation failed"
                    );
                }
            }
        }
        drafts
    }
}

fn conversation_draft(
    event: &ScheduledEvent,
    recipient: &AgentId,
    channel: &str,
    conversation: &Conversation,
) -> EventDraft {
    let sender = &event.agent_id;
    let draft = EventDraft::interaction(
        format!(
            "{} talked with {} on {channel}: {}",
            sender.as_str(),
            recipient.as_str(),
            conversation.summary
        ),
        vec![sender.clone(), recipient.clone()],
    )
    .with_source(sender.clone())
    .at(event.due_time)
    .located(vec![event.location.clone()])
    .mentioning(sender.as_str(), sender.clone())
    .mentioning(recipient.as_str(), recipient.clone())
    .with_metadata("action", Value::String("Conversation".to_owned()))
    .with_metadata("channel", Value::String(channel.to_owned()))
    .with_metadata("turns", Value::from(conversation.turns));
    conversation
        .mentions
        .iter()
        .fold(draft, |draft, (name, agent_id)| {
            draft.mentioning(name, agent_id.clone())
        })
}
