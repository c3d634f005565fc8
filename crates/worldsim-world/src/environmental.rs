//! Reducers for agent movement, schedules and object interactions.

use tracing::debug;
use worldsim_types::{Event, EventType};

use crate::payload::{AgentMoved, TaskScheduled, TravelInteraction, decode};
use crate::registry::ReducerRegistry;
use crate::state::WorldState;

/// Action name marking an `interaction` event as a trip.
const TRAVEL_ACTION: &str = "Travel";

/// Register the environmental reducers.
pub fn register(registry: &mut ReducerRegistry) {
    registry.register(EventType::AgentMoved, apply_agent_moved);
    registry.register(EventType::TaskScheduled, apply_task_scheduled);
    registry.register(EventType::Interaction, apply_interaction);
    // Logged for the record; nothing in the world shards changes.
    for passive in [
        EventType::Message,
        EventType::ObjectOpen,
        EventType::ObjectClose,
        EventType::ObjectUsed,
    ] {
        registry.register(passive, |_, _| {});
    }
}

fn apply_agent_moved(world: &mut WorldState, event: &Event) {
    let Some(moved) = decode::<AgentMoved>(event) else {
        return;
    };
    if !world.set_agent_position(&moved.agent_id, moved.new_place_id) {
        debug!(agent_id = %moved.agent_id, "agent_moved for unknown agent, ignoring");
    }
}

fn apply_task_scheduled(world: &mut WorldState, event: &Event) {
    let Some(scheduled) = decode::<TaskScheduled>(event) else {
        return;
    };
    if !world.add_agent_task(&scheduled.agent_id, scheduled.task) {
        debug!(agent_id = %scheduled.agent_id, "task_scheduled for unknown agent, ignoring");
    }
}

/// Only trips change the world; every other interaction is a no-op.
fn apply_interaction(world: &mut WorldState, event: &Event) {
    let is_travel = event
        .metadata
        .get("action")
        .and_then(serde_json::Value::as_str)
        == Some(TRAVEL_ACTION);
    if !is_travel {
        return;
    }
    let (Some(agent_id), Some(trip)) = (&event.source, decode::<TravelInteraction>(event)) else {
        return;
    };
    if !world.set_agent_position(agent_id, trip.to) {
        debug!(agent_id = %agent_id, "travel interaction for unknown agent, ignoring");
    }
}
