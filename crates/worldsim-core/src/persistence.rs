//! The persistence sink the runner writes to.
//!
//! Writes are append-only: logged events and resolved scheduled events,
//! keyed by simulation id. The only read is the clock state, used to resume
//! a run after a restart.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::NaiveDateTime;
use tracing::info;
use worldsim_types::{ClockState, DispatchOutcome, Event, SimulationId};

use crate::clock::SimulationClock;

/// Errors reported by a [`PersistenceSink`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The storage backend failed.
    #[error("persistence backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A record could not be encoded for storage.
    #[error("failed to encode {what}: {message}")]
    Encode {
        /// What was being encoded.
        what: &'static str,
        /// The encoder's message.
        message: String,
    },
}

/// Append-only store for events, outcomes and clock state.
pub trait PersistenceSink {
    /// Append logged events.
    fn record_events(
        &mut self,
        simulation_id: &SimulationId,
        events: &[Event],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Append resolved scheduled events.
    fn record_outcomes(
        &mut self,
        simulation_id: &SimulationId,
        outcomes: &[DispatchOutcome],
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Store the current clock state, replacing any earlier one.
    fn save_clock(&mut self, state: &ClockState)
    -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Load the stored clock state of a run, if any.
    fn load_clock(
        &mut self,
        simulation_id: &SimulationId,
    ) -> impl Future<Output = Result<Option<ClockState>, SinkError>> + Send;
}

/// Rebuild the clock of a stored run.
///
/// The stored end is kept unless `new_end` is given.
///
/// # Errors
///
/// Returns the sink's error if the clock state cannot be read.
pub async fn resume_clock<S: PersistenceSink>(
    sink: &mut S,
    simulation_id: &SimulationId,
    new_end: Option<NaiveDateTime>,
) -> Result<Option<SimulationClock>, SinkError> {
    let Some(stored) = sink.load_clock(simulation_id).await? else {
        return Ok(None);
    };
    let clock = SimulationClock::resume_from(&stored, new_end);
    info!(
        simulation_id = %simulation_id,
        current = %clock.current(),
        end = ?clock.end(),
        "Clock resumed from storage"
    );
    Ok(Some(clock))
}

/// In-memory sink for tests and runs without a database.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: BTreeMap<SimulationId, Vec<Event>>,
    outcomes: BTreeMap<SimulationId, Vec<DispatchOutcome>>,
    clocks: BTreeMap<SimulationId, ClockState>,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events stored for a run.
    pub fn events(&self, simulation_id: &SimulationId) -> &[Event] {
        self.events.get(simulation_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Outcomes stored for a run.
    pub fn outcomes(&self, simulation_id: &SimulationId) -> &[DispatchOutcome] {
        self.outcomes.get(simulation_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Stored clock state of a run.
    pub fn clock(&self, simulation_id: &SimulationId) -> Option<&ClockState> {
        self.clocks.get(simulation_id)
    }
}

impl PersistenceSink for MemorySink {
    async fn record_events(
        &mut self,
        simulation_id: &SimulationId,
        events: &[Event],
    ) -> Result<(), SinkError> {
        self.events
            .entry(simulation_id.clone())
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }

    async fn record_outcomes(
        &mut self,
        simulation_id: &SimulationId,
        outcomes: &[DispatchOutcome],
    ) -> Result<(), SinkError> {
        self.outcomes
            .entry(simulation_id.clone())
            .or_default()
            .extend_from_slice(outcomes);
        Ok(())
    }

    async fn save_clock(&mut self, state: &ClockState) -> Result<(), SinkError> {
        self.clocks
            .insert(state.simulation_id.clone(), state.clone());
        Ok(())
    }

    async fn load_clock(
        &mut self,
        simulation_id: &SimulationId,
    ) -> Result<Option<ClockState>, SinkError> {
        Ok(self.clocks.get(simulation_id).cloned())
    }
}
