//! Reducer registry.
//!
//! Maps each [`EventType`] to the reducers that apply it to the
//! [`WorldState`]. Reducers for the same type run in registration order.
//! An event whose type has no reducer, including every
//! [`EventType::Unrecognized`] type nobody registered for, leaves the state
//! exactly as it was.
//!
//! Reducers are total: they never fail. A payload that does not decode or
//! names an unknown entity is logged and skipped, so one malformed event
//! cannot abort the rest of a tick.

use core::fmt;
use std::collections::BTreeMap;

use worldsim_types::{Event, EventType};

use crate::state::WorldState;
use crate::{environmental, firm};

/// A reducer: applies one event's effect to the world.
pub type Reducer = Box<dyn Fn(&mut WorldState, &Event) + Send + Sync>;

/// What [`ReducerRegistry::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// The given number of reducers ran.
    Applied(usize),
    /// No reducer is registered for the event type.
    Ignored,
}

/// Event-type keyed collection of reducers.
#[derive(Default)]
pub struct ReducerRegistry {
    reducers: BTreeMap<EventType, Vec<Reducer>>,
}

impl fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerRegistry")
            .field("event_types", &self.reducers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ReducerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in environmental and firm reducers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        environmental::register(&mut registry);
        firm::register(&mut registry);
        registry
    }

    /// Add a reducer for `event_type`, after any already registered.
    pub fn register<F>(&mut self, event_type: EventType, reducer: F)
    where
        F: Fn(&mut WorldState, &Event) + Send + Sync + 'static,
    {
        self.reducers
            .entry(event_type)
            .or_default()
            .push(Box::new(reducer));
    }

    /// Whether any reducer is registered for `event_type`.
    pub fn handles(&self, event_type: &EventType) -> bool {
        self.reducers.contains_key(event_type)
    }

    /// Event types with at least one reducer.
    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.reducers.keys()
    }

    /// Apply every reducer registered for the event's type.
    pub fn apply(&self, state: &mut WorldState, event: &Event) -> Reduction {
        let Some(reducers) = self.reducers.get(&event.event_type) else {
            return Reduction::Ignored;
        };
        for reducer in reducers {
            reducer(state, event);
        }
        Reduction::Applied(reducers.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use serde_json::json;
    use worldsim_types::{AgentId, EventId, PlaceId};

    use super::*;

    fn event(event_type: EventType, metadata: serde_json::Value) -> Event {
        Event {
            event_id: EventId(0),
            event_type,
            content: "something".to_owned(),
            environment: "town".to_owned(),
            source: None,
            target: None,
            participants: Vec::new(),
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            location: Vec::new(),
            metadata: serde_json::from_value(metadata).unwrap(),
            agent_number_mapping: BTreeMap::new(),
        }
    }

    fn world() -> WorldState {
        WorldState::builder()
            .agent(AgentId::new("a1"), "home")
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_type_leaves_state_unchanged() {
        let registry = ReducerRegistry::with_defaults();
        let mut state = world();
        let before = serde_json::to_vec(&state).unwrap();
        let outcome = registry.apply(
            &mut state,
            &event(EventType::parse("weather_report"), json!({"agent_id": "a1"})),
        );
        assert_eq!(outcome, Reduction::Ignored);
        assert_eq!(serde_json::to_vec(&state).unwrap(), before);
    }

    #[test]
    fn defaults_cover_known_domain_types() {
        let registry = ReducerRegistry::with_defaults();
        for event_type in [
            EventType::AgentMoved,
            EventType::TaskScheduled,
            EventType::Interaction,
            EventType::Message,
            EventType::ObjectOpen,
            EventType::ObjectClose,
            EventType::ObjectUsed,
            EventType::RetailOrderPlaced,
            EventType::RetailOrderFulfilled,
            EventType::RetailInvoiceIssued,
            EventType::RetailPaymentReceived,
            EventType::RetailStockReceived,
        ] {
            assert!(registry.handles(&event_type), "{event_type}");
        }
        assert!(!registry.handles(&EventType::SystemNotification));
    }

    #[test]
    fn reducers_for_one_type_run_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ReducerRegistry::with_defaults();
        let seen = Arc::clone(&calls);
        registry.register(EventType::AgentMoved, move |state, _| {
            // The built-in reducer has already moved the agent.
            assert_eq!(
                state.agent_position(&AgentId::new("a1")),
                Some(&PlaceId::new("park"))
            );
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let mut state = world();
        let outcome = registry.apply(
            &mut state,
            &event(
                EventType::AgentMoved,
                json!({"agent_id": "a1", "new_place_id": "park"}),
            ),
        );
        assert_eq!(outcome, Reduction::Applied(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn plugins_can_handle_unrecognized_types() {
        let mut registry = ReducerRegistry::new();
        registry.register(EventType::parse("legacy_move"), |state, e| {
            if let Some(source) = &e.source {
                state.set_agent_position(source, PlaceId::new("legacy"));
            }
        });
        let mut e = event(EventType::parse("legacy_move"), json!({}));
        e.source = Some(AgentId::new("a1"));
        let mut state = world();
        assert_eq!(registry.apply(&mut state, &e), Reduction::Applied(1));
        assert_eq!(
            state.agent_position(&AgentId::new("a1")),
            Some(&PlaceId::new("legacy"))
        );
    }
}
