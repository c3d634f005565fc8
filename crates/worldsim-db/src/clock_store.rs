//! Clock persistence for resumable runs.
//!
//! One row per run in `simulations`, replaced on every save. Loading the
//! row back is the only read the engine does when it restarts.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::PgPool;
use worldsim_types::{ClockState, SimulationId};

use crate::error::DbError;

/// Operations on the `simulations` table.
pub struct ClockStore<'a> {
    pool: &'a PgPool,
}

impl<'a> ClockStore<'a> {
    /// Create a new clock store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store the clock state of a run, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn save_clock(&self, state: &ClockState) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO simulations (simulation_id, start_at, current_at, end_at, tick_seconds, paused)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (simulation_id) DO UPDATE SET
                start_at = EXCLUDED.start_at,
                current_at = EXCLUDED.current_at,
                end_at = EXCLUDED.end_at,
                tick_seconds = EXCLUDED.tick_seconds,
                paused = EXCLUDED.paused,
                updated_at = now()",
        )
        .bind(state.simulation_id.as_str())
        .bind(state.start)
        .bind(state.current)
        .bind(state.end)
        .bind(state.tick_seconds)
        .bind(state.paused)
        .execute(self.pool)
        .await?;

        tracing::debug!(
            simulation_id = %state.simulation_id,
            current = %state.current,
            "Saved clock state"
        );
        Ok(())
    }

    /// Load the stored clock state of a run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn load_clock(
        &self,
        simulation_id: &SimulationId,
    ) -> Result<Option<ClockState>, DbError> {
        let row = sqlx::query_as::<_, SimulationRow>(
            r"SELECT simulation_id, start_at, current_at, end_at, tick_seconds, paused, created_at, updated_at
              FROM simulations
              WHERE simulation_id = $1",
        )
        .bind(simulation_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(SimulationRow::into_state))
    }

    /// Ids of every stored run, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list_simulations(&self) -> Result<Vec<SimulationId>, DbError> {
        let ids: Vec<String> =
            sqlx::query_scalar(r"SELECT simulation_id FROM simulations ORDER BY updated_at DESC")
                .fetch_all(self.pool)
                .await?;

        Ok(ids.into_iter().map(SimulationId::new).collect())
    }
}

/// A row from the `simulations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SimulationRow {
    /// The run.
    pub simulation_id: String,
    /// Simulated start.
    pub start_at: NaiveDateTime,
    /// Simulated "now".
    pub current_at: NaiveDateTime,
    /// Optional simulated deadline.
    pub end_at: Option<NaiveDateTime>,
    /// Tick length in seconds.
    pub tick_seconds: i64,
    /// Whether the clock was paused.
    pub paused: bool,
    /// First save.
    pub created_at: DateTime<Utc>,
    /// Latest save.
    pub updated_at: DateTime<Utc>,
}

impl SimulationRow {
    /// Convert to the domain clock state.
    pub fn into_state(self) -> ClockState {
        ClockState {
            simulation_id: SimulationId::new(self.simulation_id),
            start: self.start_at,
            current: self.current_at,
            end: self.end_at,
            tick_seconds: self.tick_seconds,
            paused: self.paused,
        }
    }
}
