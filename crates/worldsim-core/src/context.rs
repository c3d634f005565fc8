//! Per-run simulation context.
//!
//! Everything one simulation run owns lives here: its id, clock, world,
//! event log, agent numbering and reducers. The context is created at run
//! start, handed to the [`TickScheduler`], and dropped at run end, so two
//! runs in the same process never share counters or state.
//!
//! The world is only ever mutated through [`SimulationContext::record`],
//! which appends an event to the log and then applies the reducers
//! registered for its type.
//!
//! [`TickScheduler`]: crate::scheduler::TickScheduler

use chrono::NaiveDateTime;
use tracing::debug;
use worldsim_events::{AgentNumberManager, EventLogError, EventQueue};
use worldsim_types::{EventDraft, EventId, SimulationId};
use worldsim_world::{ReducerRegistry, Reduction, WorldState};

use crate::clock::SimulationClock;

/// State owned by one simulation run.
#[derive(Debug)]
pub struct SimulationContext {
    simulation_id: SimulationId,
    clock: SimulationClock,
    world: WorldState,
    events: EventQueue,
    numbering: AgentNumberManager,
    reducers: ReducerRegistry,
}

impl SimulationContext {
    /// Create a context with the built-in reducers and an empty event log
    /// for `environment`.
    pub fn new(
        simulation_id: SimulationId,
        clock: SimulationClock,
        world: WorldState,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            simulation_id,
            clock,
            world,
            events: EventQueue::new(environment),
            numbering: AgentNumberManager::new(),
            reducers: ReducerRegistry::with_defaults(),
        }
    }

    /// Replace the reducer registry.
    #[must_use]
    pub fn with_reducers(mut self, reducers: ReducerRegistry) -> Self {
        self.reducers = reducers;
        self
    }

    /// Replace the event log, e.g. with one resumed at a persisted id.
    #[must_use]
    pub fn with_event_queue(mut self, events: EventQueue) -> Self {
        self.events = events;
        self
    }

    /// The run's identifier.
    pub const fn simulation_id(&self) -> &SimulationId {
        &self.simulation_id
    }

    /// The simulated clock.
    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Mutable access to the clock (pause, resume, re-initialise).
    pub const fn clock_mut(&mut self) -> &mut SimulationClock {
        &mut self.clock
    }

    /// Read-only world view.
    pub const fn world(&self) -> &WorldState {
        &self.world
    }

    /// The event log.
    pub const fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Mutable access to the event log, for agents consuming events.
    pub const fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// The run's agent numbering.
    pub const fn numbering(&self) -> &AgentNumberManager {
        &self.numbering
    }

    /// The reducer registry.
    pub const fn reducers(&self) -> &ReducerRegistry {
        &self.reducers
    }

    /// Mutable access to the reducer registry, for plugins.
    pub const fn reducers_mut(&mut self) -> &mut ReducerRegistry {
        &mut self.reducers
    }

    /// Append `draft` to the log and apply it to the world.
    ///
    /// A draft without a timestamp is stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns the [`EventLogError`] of a rejected draft. A rejected draft
    /// is neither logged nor applied.
    pub fn record(
        &mut self,
        draft: EventDraft,
        now: NaiveDateTime,
    ) -> Result<EventId, EventLogError> {
        let event_id = self.events.append(draft, now, &mut self.numbering)?;
        if let Some(event) = self.events.get(event_id) {
            let reduction = self.reducers.apply(&mut self.world, event);
            if reduction == Reduction::Ignored {
                debug!(event_id = %event_id, event_type = %event.event_type, "No reducer for event type");
            }
        }
        Ok(event_id)
    }
}
