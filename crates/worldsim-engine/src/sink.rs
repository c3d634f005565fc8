//! [`PersistenceSink`] backed by `PostgreSQL`.

use worldsim_core::{PersistenceSink, SinkError};
use worldsim_db::{DbError, PostgresPool};
use worldsim_types::{ClockState, DispatchOutcome, Event, SimulationId};

/// Writes each tick's events, outcomes and clock to the database.
#[derive(Clone)]
pub struct PostgresSink {
    pool: PostgresPool,
    batch_size: usize,
}

impl PostgresSink {
    /// A sink writing through `pool` in batches of `batch_size` rows.
    pub const fn new(pool: PostgresPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }
}

fn backend(e: &DbError) -> SinkError {
    match e {
        DbError::Serialization(inner) => SinkError::Encode {
            what: "row",
            message: inner.to_string(),
        },
        other => SinkError::Backend {
            message: other.to_string(),
        },
    }
}

impl PersistenceSink for PostgresSink {
    async fn record_events(
        &mut self,
        simulation_id: &SimulationId,
        events: &[Event],
    ) -> Result<(), SinkError> {
        self.pool
            .events()
            .with_batch_size(self.batch_size)
            .batch_insert(simulation_id, events)
            .await
            .map_err(|e| backend(&e))
    }

    async fn record_outcomes(
        &mut self,
        simulation_id: &SimulationId,
        outcomes: &[DispatchOutcome],
    ) -> Result<(), SinkError> {
        self.pool
            .outcomes()
            .with_batch_size(self.batch_size)
            .batch_insert(simulation_id, outcomes)
            .await
            .map_err(|e| backend(&e))
    }

    async fn save_clock(&mut self, state: &ClockState) -> Result<(), SinkError> {
        self.pool
            .clocks()
            .save_clock(state)
            .await
            .map_err(|e| backend(&e))
    }

    async fn load_clock(
        &mut self,
        simulation_id: &SimulationId,
    ) -> Result<Option<ClockState>, SinkError> {
        self.pool
            .clocks()
            .load_clock(simulation_id)
            .await
            .map_err(|e| backend(&e))
    }
}
