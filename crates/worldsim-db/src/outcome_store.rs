//! Audit trail of resolved scheduled events.
//!
//! Every scheduled event ends as exactly one row in `scheduled_outcomes`
//! (executed, failed or missed). The ids of the events an action emitted
//! are kept as a JSONB array next to the outcome.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use worldsim_types::{
    ActionParameters, AgentId, DispatchOutcome, EventId, OutcomeStatus, ScheduledEventId,
    SimulationId,
};

use crate::error::DbError;

/// Default batch size for outcome inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Operations on the `scheduled_outcomes` table.
pub struct OutcomeStore<'a> {
    pool: &'a PgPool,
    batch_size: usize,
}

impl<'a> OutcomeStore<'a> {
    /// Create a new outcome store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the batch size for inserts. Zero is treated as one.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Batch-insert resolved scheduled events of one run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if an action or result cannot be
    /// encoded or [`DbError::Postgres`] if the insert fails.
    pub async fn batch_insert(
        &self,
        simulation_id: &SimulationId,
        outcomes: &[DispatchOutcome],
    ) -> Result<(), DbError> {
        if outcomes.is_empty() {
            return Ok(());
        }

        for chunk in outcomes.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut sim_ids = Vec::with_capacity(len);
            let mut scheduled_ids = Vec::with_capacity(len);
            let mut agent_ids = Vec::with_capacity(len);
            let mut action_names = Vec::with_capacity(len);
            let mut actions = Vec::with_capacity(len);
            let mut due_times = Vec::with_capacity(len);
            let mut priorities = Vec::with_capacity(len);
            let mut locations = Vec::with_capacity(len);
            let mut statuses = Vec::with_capacity(len);
            let mut results: Vec<Option<Value>> = Vec::with_capacity(len);
            let mut errors: Vec<Option<String>> = Vec::with_capacity(len);
            let mut emitted = Vec::with_capacity(len);
            let mut resolved = Vec::with_capacity(len);

            for outcome in chunk {
                sim_ids.push(simulation_id.as_str().to_owned());
                scheduled_ids
                    .push(i64::try_from(outcome.scheduled_id.value()).unwrap_or(i64::MAX));
                agent_ids.push(outcome.agent_id.as_str().to_owned());
                action_names.push(outcome.action_name.clone());
                actions.push(serde_json::to_value(&outcome.action)?);
                due_times.push(outcome.due_time);
                priorities.push(outcome.priority);
                locations.push(outcome.location.clone());
                statuses.push(outcome.status.as_str().to_owned());
                results.push(outcome.result.clone());
                errors.push(outcome.error.clone());
                emitted.push(serde_json::to_value(&outcome.emitted_events)?);
                resolved.push(outcome.resolved_at);
            }

            sqlx::query(
                r"INSERT INTO scheduled_outcomes (simulation_id, scheduled_id, agent_id, action_name, action, due_time, priority, location, status, result, error, emitted_events, resolved_at)
                  SELECT * FROM UNNEST($1::TEXT[], $2::BIGINT[], $3::TEXT[], $4::TEXT[], $5::JSONB[], $6::TIMESTAMP[], $7::BIGINT[], $8::TEXT[], $9::TEXT[], $10::JSONB[], $11::TEXT[], $12::JSONB[], $13::TIMESTAMP[])",
            )
            .bind(&sim_ids)
            .bind(&scheduled_ids)
            .bind(&agent_ids)
            .bind(&action_names)
            .bind(&actions)
            .bind(&due_times)
            .bind(&priorities)
            .bind(&locations)
            .bind(&statuses)
            .bind(&results)
            .bind(&errors)
            .bind(&emitted)
            .bind(&resolved)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(
            simulation_id = %simulation_id,
            count = outcomes.len(),
            "Inserted outcomes (batch UNNEST)"
        );
        Ok(())
    }

    /// All outcomes of a run in dispatch order: due time, priority, then
    /// scheduler handle.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_outcomes(
        &self,
        simulation_id: &SimulationId,
    ) -> Result<Vec<OutcomeRow>, DbError> {
        let rows = sqlx::query_as::<_, OutcomeRow>(
            r"SELECT id, simulation_id, scheduled_id, agent_id, action_name, action, due_time, priority, location, status, result, error, emitted_events, resolved_at, recorded_at
              FROM scheduled_outcomes
              WHERE simulation_id = $1
              ORDER BY due_time, priority, scheduled_id, id",
        )
        .bind(simulation_id.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Count outcomes of a run with the given status.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn count_by_status(
        &self,
        simulation_id: &SimulationId,
        status: OutcomeStatus,
    ) -> Result<i64, DbError> {
        let count: i64 = sqlx::query_scalar(
            r"SELECT COUNT(*) FROM scheduled_outcomes WHERE simulation_id = $1 AND status = $2",
        )
        .bind(simulation_id.as_str())
        .bind(status.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }
}

/// A row from the `scheduled_outcomes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutcomeRow {
    /// Surrogate row id.
    pub id: i64,
    /// The run.
    pub simulation_id: String,
    /// Scheduler handle of the resolved event.
    pub scheduled_id: i64,
    /// The acting agent.
    pub agent_id: String,
    /// Action name as planned.
    pub action_name: String,
    /// Action parameters (JSONB).
    pub action: Value,
    /// When the action was due.
    pub due_time: NaiveDateTime,
    /// Tie-break among events due at the same time.
    pub priority: i64,
    /// Planned location.
    pub location: String,
    /// `executed`, `failed` or `missed`.
    pub status: String,
    /// Executor result payload.
    pub result: Option<Value>,
    /// Failure reason.
    pub error: Option<String>,
    /// Ids of emitted events (JSONB array).
    pub emitted_events: Value,
    /// Start of the resolving tick.
    pub resolved_at: NaiveDateTime,
    /// When the row was written.
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRow {
    /// Rebuild the domain outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] for a negative handle and
    /// [`DbError::Serialization`] for an unknown status or a malformed
    /// JSON column.
    pub fn into_outcome(self) -> Result<DispatchOutcome, DbError> {
        let scheduled_id = u64::try_from(self.scheduled_id).ok().ok_or(DbError::InvalidRow {
            column: "scheduled_id",
            message: format!("negative handle {}", self.scheduled_id),
        })?;
        let status: OutcomeStatus = serde_json::from_value(Value::String(self.status))?;
        let action: ActionParameters = serde_json::from_value(self.action)?;
        let emitted_events: Vec<EventId> = serde_json::from_value(self.emitted_events)?;

        Ok(DispatchOutcome {
            scheduled_id: ScheduledEventId(scheduled_id),
            agent_id: AgentId::new(self.agent_id),
            action_name: self.action_name,
            action,
            due_time: self.due_time,
            priority: self.priority,
            location: self.location,
            status,
            result: self.result,
            error: self.error,
            emitted_events,
            resolved_at: self.resolved_at,
        })
    }
}
