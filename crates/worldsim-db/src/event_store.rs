//! Event store operations for batch-inserting logged events.
//!
//! The `sim_events` table mirrors the in-memory event log of each run,
//! keyed by `(simulation_id, event_id)`. Inserts are idempotent, so a tick
//! persisted twice after a crash leaves a single copy of each event.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use worldsim_types::{AgentId, Event, EventId, EventType, SimulationId};

use crate::error::DbError;

/// Default batch size for event inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Operations on the `sim_events` table.
pub struct EventStore<'a> {
    pool: &'a PgPool,
    batch_size: usize,
}

impl<'a> EventStore<'a> {
    /// Create a new event store bound to a connection pool.
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

    /// Batch-insert events of one run into `sim_events`.
    ///
    /// Each batch is a single `INSERT ... SELECT FROM UNNEST(...)` inside
    /// its own transaction. Rows whose `(simulation_id, event_id)` already
    /// exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if a JSON column cannot be encoded
    /// or [`DbError::Postgres`] if the insert fails.
    pub async fn batch_insert(
        &self,
        simulation_id: &SimulationId,
        events: &[Event],
    ) -> Result<(), DbError> {
        if events.is_empty() {
            return Ok(());
        }

        for chunk in events.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut sim_ids = Vec::with_capacity(len);
            let mut event_ids = Vec::with_capacity(len);
            let mut event_types = Vec::with_capacity(len);
            let mut contents = Vec::with_capacity(len);
            let mut environments = Vec::with_capacity(len);
            let mut sources: Vec<Option<String>> = Vec::with_capacity(len);
            let mut targets: Vec<Option<String>> = Vec::with_capacity(len);
            let mut participants = Vec::with_capacity(len);
            let mut sim_times = Vec::with_capacity(len);
            let mut locations = Vec::with_capacity(len);
            let mut metadata = Vec::with_capacity(len);
            let mut mappings = Vec::with_capacity(len);

            for event in chunk {
                sim_ids.push(simulation_id.as_str().to_owned());
                event_ids.push(i64::try_from(event.event_id.value()).unwrap_or(i64::MAX));
                event_types.push(String::from(event.event_type.clone()));
                contents.push(event.content.clone());
                environments.push(event.environment.clone());
                sources.push(event.source.as_ref().map(|a| a.as_str().to_owned()));
                targets.push(event.target.as_ref().map(|a| a.as_str().to_owned()));
                participants.push(serde_json::to_value(&event.participants)?);
                sim_times.push(event.timestamp);
                locations.push(serde_json::to_value(&event.location)?);
                metadata.push(serde_json::to_value(&event.metadata)?);
                mappings.push(serde_json::to_value(&event.agent_number_mapping)?);
            }

            sqlx::query(
                r"INSERT INTO sim_events (simulation_id, event_id, event_type, content, environment, source_agent, target_agent, participants, sim_time, location, metadata, agent_number_mapping)
                  SELECT * FROM UNNEST($1::TEXT[], $2::BIGINT[], $3::TEXT[], $4::TEXT[], $5::TEXT[], $6::TEXT[], $7::TEXT[], $8::JSONB[], $9::TIMESTAMP[], $10::JSONB[], $11::JSONB[], $12::JSONB[])
                  ON CONFLICT (simulation_id, event_id) DO NOTHING",
            )
            .bind(&sim_ids)
            .bind(&event_ids)
            .bind(&event_types)
            .bind(&contents)
            .bind(&environments)
            .bind(&sources)
            .bind(&targets)
            .bind(&participants)
            .bind(&sim_times)
            .bind(&locations)
            .bind(&metadata)
            .bind(&mappings)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(
            simulation_id = %simulation_id,
            count = events.len(),
            "Inserted events (batch UNNEST)"
        );
        Ok(())
    }

    /// All events of a run, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_events(&self, simulation_id: &SimulationId) -> Result<Vec<EventRow>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT simulation_id, event_id, event_type, content, environment, source_agent, target_agent, participants, sim_time, location, metadata, agent_number_mapping, recorded_at
              FROM sim_events
              WHERE simulation_id = $1
              ORDER BY event_id",
        )
        .bind(simulation_id.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Events of one type for a run, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_events_by_type(
        &self,
        simulation_id: &SimulationId,
        event_type: &EventType,
    ) -> Result<Vec<EventRow>, DbError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r"SELECT simulation_id, event_id, event_type, content, environment, source_agent, target_agent, participants, sim_time, location, metadata, agent_number_mapping, recorded_at
              FROM sim_events
              WHERE simulation_id = $1 AND event_type = $2
              ORDER BY event_id",
        )
        .bind(simulation_id.as_str())
        .bind(String::from(event_type.clone()))
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// The id the next event of a run should receive: one past the largest
    /// stored id, or `None` if the run has no stored events.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn next_event_id(&self, simulation_id: &SimulationId) -> Result<Option<u64>, DbError> {
        let max: Option<i64> =
            sqlx::query_scalar(r"SELECT MAX(event_id) FROM sim_events WHERE simulation_id = $1")
                .bind(simulation_id.as_str())
                .fetch_one(self.pool)
                .await?;

        Ok(max
            .and_then(|m| u64::try_from(m).ok())
            .map(|m| m.saturating_add(1)))
    }
}

/// A row from the `sim_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// The run the event belongs to.
    pub simulation_id: String,
    /// Creation-order id within the run.
    pub event_id: i64,
    /// Event type label.
    pub event_type: String,
    /// Anonymized content.
    pub content: String,
    /// Environment tag.
    pub environment: String,
    /// Source agent id.
    pub source_agent: Option<String>,
    /// Target agent id.
    pub target_agent: Option<String>,
    /// Participant ids (JSONB array).
    pub participants: Value,
    /// Simulated time of the event.
    pub sim_time: NaiveDateTime,
    /// Location path (JSONB array).
    pub location: Value,
    /// Type-specific payload (JSONB object).
    pub metadata: Value,
    /// Token to agent id (JSONB object).
    pub agent_number_mapping: Value,
    /// When the row was written.
    pub recorded_at: DateTime<Utc>,
}

impl EventRow {
    /// Rebuild the domain event.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] for a negative id and
    /// [`DbError::Serialization`] if a JSON column has the wrong shape.
    pub fn into_event(self) -> Result<Event, DbError> {
        let event_id = u64::try_from(self.event_id).ok().ok_or(DbError::InvalidRow {
            column: "event_id",
            message: format!("negative id {}", self.event_id),
        })?;
        let participants: Vec<AgentId> = serde_json::from_value(self.participants)?;
        let location: Vec<String> = serde_json::from_value(self.location)?;
        let metadata: BTreeMap<String, Value> = serde_json::from_value(self.metadata)?;
        let agent_number_mapping: BTreeMap<String, AgentId> =
            serde_json::from_value(self.agent_number_mapping)?;

        Ok(Event {
            event_id: EventId(event_id),
            event_type: EventType::from(self.event_type),
            content: self.content,
            environment: self.environment,
            source: self.source_agent.map(AgentId::new),
            target: self.target_agent.map(AgentId::new),
            participants,
            timestamp: self.sim_time,
            location,
            metadata,
            agent_number_mapping,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    fn row() -> EventRow {
        EventRow {
            simulation_id: "sim".to_owned(),
            event_id: 4,
            event_type: "agent_moved".to_owned(),
            content: "agent 1 walks to the park".to_owned(),
            environment: "town".to_owned(),
            source_agent: Some("ada".to_owned()),
            target_agent: None,
            participants: json!(["ada"]),
            sim_time: NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            location: json!(["USA", "Maine"]),
            metadata: json!({"to": "park"}),
            agent_number_mapping: json!({"agent 1": "ada"}),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_event() {
        let event = row().into_event().unwrap();
        assert_eq!(event.event_id, EventId(4));
        assert_eq!(event.event_type, EventType::AgentMoved);
        assert_eq!(event.source, Some(AgentId::new("ada")));
        assert!(event.target.is_none());
        assert_eq!(event.location_string(), "USA; Maine");
        assert_eq!(event.agent_for_token("agent 1"), Some(&AgentId::new("ada")));
    }

    #[test]
    fn unknown_type_survives_conversion() {
        let mut r = row();
        r.event_type = "weather_report".to_owned();
        let event = r.into_event().unwrap();
        assert_eq!(String::from(event.event_type), "weather_report");
    }

    #[test]
    fn negative_id_is_rejected() {
        let mut r = row();
        r.event_id = -1;
        assert!(matches!(
            r.into_event(),
            Err(DbError::InvalidRow {
                column: "event_id",
                ..
            })
        ));
    }
}
