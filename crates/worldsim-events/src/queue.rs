//! The per-environment event queue.
//!
//! Events enter the pending partition on [`EventQueue::append`] and move to
//! the processed partition on [`EventQueue::consume`]:
//!
//! - a global event (`target = None`) moves after the first agent consumes it;
//! - a targeted event moves only when its target consumes it, and is never
//!   visible to any other agent.
//!
//! Ids are strictly increasing in append order and are never reused, even
//! after [`EventQueue::clear_all`]. The pending partition therefore stays
//! sorted by id; the processed partition keeps consumption order and is
//! indexed by id.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;
use worldsim_types::{AgentId, Event, EventDraft, EventId, EventType};

use crate::error::EventLogError;
use crate::numbering::AgentNumberManager;

/// Backlog counters of one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Events no agent has consumed yet.
    pub pending: usize,
    /// Events that have been consumed.
    pub processed: usize,
    /// `pending + processed`.
    pub total: usize,
}

/// Append-only log of the events of one environment.
#[derive(Debug, Clone)]
pub struct EventQueue {
    environment: String,
    pending: Vec<Event>,
    processed: Vec<Event>,
    processed_index: BTreeMap<EventId, usize>,
    next_id: u64,
}

impl EventQueue {
    /// Create an empty queue. The first appended event gets id `0`.
    pub fn new(environment: impl Into<String>) -> Self {
        Self::resume(environment, EventId(0))
    }

    /// Create an empty queue that continues numbering at `next_id`, for a
    /// run resumed from persisted events.
    pub fn resume(environment: impl Into<String>, next_id: EventId) -> Self {
        Self {
            environment: environment.into(),
            pending: Vec::new(),
            processed: Vec::new(),
            processed_index: BTreeMap::new(),
            next_id: next_id.value(),
        }
    }

    /// The environment every event in this queue belongs to.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// The id the next appended event will receive.
    pub const fn next_id(&self) -> EventId {
        EventId(self.next_id)
    }

    /// Validate a draft, anonymize the agents it mentions and log it.
    ///
    /// A draft without an explicit environment is logged in this queue's
    /// environment; one without a timestamp is stamped with `now`. Every
    /// mentioned agent, as well as the source, target and participants,
    /// gets a token in the event's `agent_number_mapping`.
    pub fn append(
        &mut self,
        draft: EventDraft,
        now: NaiveDateTime,
        numbering: &mut AgentNumberManager,
    ) -> Result<EventId, EventLogError> {
        if let Some(environment) = &draft.environment {
            self.check_environment(environment)?;
        }
        check_type_and_content(&draft.event_type, &draft.content)?;

        let anonymized = numbering.anonymize(&draft.content, &draft.mentions);
        let mut mapping = anonymized.mapping;
        for agent_id in draft
            .source
            .iter()
            .chain(draft.target.iter())
            .chain(draft.participants.iter())
        {
            mapping.insert(numbering.token_for(agent_id), agent_id.clone());
        }

        let event = Event {
            event_id: EventId(0),
            event_type: draft.event_type,
            content: anonymized.content,
            environment: self.environment.clone(),
            source: draft.source,
            target: draft.target,
            participants: draft.participants,
            timestamp: draft.timestamp.unwrap_or(now),
            location: draft.location,
            metadata: draft.metadata,
            agent_number_mapping: mapping,
        };
        self.push(event)
    }

    /// Log an already-formed event, replacing its id with the next one.
    pub fn append_event(&mut self, event: Event) -> Result<EventId, EventLogError> {
        self.check_environment(&event.environment)?;
        check_type_and_content(&event.event_type, &event.content)?;
        self.push(event)
    }

    fn push(&mut self, mut event: Event) -> Result<EventId, EventLogError> {
        let id = EventId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(EventLogError::IdsExhausted)?;
        event.event_id = id;
        debug!(
            event_id = %id,
            event_type = %event.event_type,
            environment = %self.environment,
            "Event appended"
        );
        self.pending.push(event);
        Ok(id)
    }

    fn check_environment(&self, environment: &str) -> Result<(), EventLogError> {
        if environment == self.environment {
            Ok(())
        } else {
            Err(EventLogError::EnvironmentMismatch {
                event: environment.to_owned(),
                queue: self.environment.clone(),
            })
        }
    }

    /// Pending events `agent_id` may see: global ones and those addressed
    /// to it, in id order.
    pub fn visible_to(&self, agent_id: &AgentId) -> Vec<&Event> {
        self.pending
            .iter()
            .filter(|event| event.is_visible_to(agent_id))
            .collect()
    }

    /// Record that `agent_id` has consumed event `event_id`.
    ///
    /// Returns `true` if the event moved to the processed partition. An
    /// unknown or already processed id, or a targeted event consumed by
    /// someone other than its target, leaves the queue unchanged.
    pub fn consume(&mut self, event_id: EventId, agent_id: &AgentId) -> bool {
        let Some(position) = self.pending_position(event_id) else {
            return false;
        };
        if !self
            .pending
            .get(position)
            .is_some_and(|event| event.is_visible_to(agent_id))
        {
            return false;
        }
        let event = self.pending.remove(position);
        debug!(event_id = %event_id, agent_id = %agent_id, "Event consumed");
        self.processed_index.insert(event_id, self.processed.len());
        self.processed.push(event);
        true
    }

    /// Look up an event in either partition.
    pub fn get(&self, event_id: EventId) -> Option<&Event> {
        if let Some(position) = self.pending_position(event_id) {
            return self.pending.get(position);
        }
        self.processed_index
            .get(&event_id)
            .and_then(|position| self.processed.get(*position))
    }

    fn pending_position(&self, event_id: EventId) -> Option<usize> {
        self.pending
            .binary_search_by_key(&event_id, |event| event.event_id)
            .ok()
    }

    /// Pending events in id order.
    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    /// Processed events in consumption order.
    pub fn processed(&self) -> &[Event] {
        &self.processed
    }

    /// Processed events that were visible to `agent_id`.
    pub fn processed_for(&self, agent_id: &AgentId) -> Vec<&Event> {
        self.processed
            .iter()
            .filter(|event| event.is_visible_to(agent_id))
            .collect()
    }

    /// Backlog counters.
    pub fn stats(&self) -> QueueStats {
        let pending = self.pending.len();
        let processed = self.processed.len();
        QueueStats {
            pending,
            processed,
            total: pending.saturating_add(processed),
        }
    }

    /// Drop processed events to free memory. Ids are not reused.
    pub fn clear_processed(&mut self) {
        self.processed.clear();
        self.processed_index.clear();
    }

    /// Drop every event. Ids are not reused.
    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.processed.clear();
        self.processed_index.clear();
    }
}

fn check_type_and_content(event_type: &EventType, content: &str) -> Result<(), EventLogError> {
    if event_type.as_str().trim().is_empty() {
        return Err(EventLogError::EmptyEventType);
    }
    if content.trim().is_empty() {
        return Err(EventLogError::EmptyContent);
    }
    Ok(())
}
