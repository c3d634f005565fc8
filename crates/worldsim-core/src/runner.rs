//! Day runner.
//!
//! [`run_day`] drives a [`TickScheduler`] tick by tick until the clock
//! reports end of day, persisting every tick's events, outcomes and clock
//! state through a [`PersistenceSink`] and notifying a [`TickCallback`].
//!
//! A fresh scheduler first dispatches the window the clock starts in, so
//! events due in the very first tick are not reported as missed. Later
//! calls continue with the next tick, which lets a caller run several days
//! back to back on one scheduler.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use worldsim_types::{Event, SimulationId};

use crate::executor::Executor;
use crate::persistence::{PersistenceSink, SinkError};
use crate::scheduler::{TickPhase, TickReport, TickScheduler};

/// Errors that can occur during a day run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Persisting a tick failed.
    #[error("sink error: {source}")]
    Sink {
        /// The underlying sink error.
        #[from]
        source: SinkError,
    },
}

/// Totals of one simulated day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    /// The run.
    pub simulation_id: SimulationId,
    /// The simulated date.
    pub date: NaiveDate,
    /// Start of the first tick dispatched.
    pub first_tick: NaiveDateTime,
    /// Start of the last tick dispatched.
    pub last_tick: NaiveDateTime,
    /// Ticks dispatched.
    pub ticks: u64,
    /// Actions executed.
    pub executed: u64,
    /// Actions failed.
    pub failed: u64,
    /// Actions missed.
    pub missed: u64,
    /// Events logged.
    pub events: u64,
    /// Event drafts rejected by the log.
    pub rejected_drafts: u64,
}

impl DaySummary {
    fn new(simulation_id: SimulationId, start: NaiveDateTime) -> Self {
        Self {
            simulation_id,
            date: start.date(),
            first_tick: start,
            last_tick: start,
            ticks: 0,
            executed: 0,
            failed: 0,
            missed: 0,
            events: 0,
            rejected_drafts: 0,
        }
    }

    fn absorb(&mut self, report: &TickReport) {
        self.last_tick = report.window.start;
        self.ticks = self.ticks.saturating_add(1);
        self.executed = self.executed.saturating_add(count(report.executed.len()));
        self.failed = self.failed.saturating_add(count(report.failed.len()));
        self.missed = self.missed.saturating_add(count(report.missed.len()));
        self.events = self.events.saturating_add(count(report.events.len()));
        self.rejected_drafts = self
            .rejected_drafts
            .saturating_add(count(report.rejected_drafts.len()));
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Callback invoked after each tick is dispatched and persisted.
pub trait TickCallback: Send {
    /// Called with the tick's report and the scheduler after the tick.
    fn on_tick(&mut self, report: &TickReport, scheduler: &TickScheduler);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &TickReport, _scheduler: &TickScheduler) {}
}

/// Run ticks until the end of the current simulated day.
///
/// Stops early if the clock cannot advance (paused, or its end reached).
///
/// # Errors
///
/// Returns [`RunnerError::Sink`] if persisting a tick fails. Ticks already
/// dispatched stay dispatched.
pub async fn run_day<S: PersistenceSink>(
    scheduler: &mut TickScheduler,
    executor: &mut dyn Executor,
    sink: &mut S,
    callback: &mut dyn TickCallback,
) -> Result<DaySummary, RunnerError> {
    let simulation_id = scheduler.context().simulation_id().clone();
    let fresh = scheduler.phase() == TickPhase::Idle;

    info!(
        simulation_id = %simulation_id,
        current = %scheduler.context().clock().current(),
        pending = scheduler.pending_count(),
        "Day starting"
    );

    let first = if fresh {
        scheduler.dispatch_current_tick(executor)
    } else {
        scheduler.run_tick(executor)
    };
    let mut summary = DaySummary::new(simulation_id, first.window.start);
    if !fresh && !first.advanced {
        warn!("Clock could not advance, day not run");
        return Ok(summary);
    }

    let mut report = first;
    loop {
        persist_tick(scheduler, sink, &report).await?;
        summary.absorb(&report);
        callback.on_tick(&report, scheduler);
        if report.end_of_day {
            break;
        }
        report = scheduler.run_tick(executor);
        if !report.advanced {
            break;
        }
    }

    log_day_end(&summary);
    Ok(summary)
}

async fn persist_tick<S: PersistenceSink>(
    scheduler: &TickScheduler,
    sink: &mut S,
    report: &TickReport,
) -> Result<(), SinkError> {
    let context = scheduler.context();
    let simulation_id = context.simulation_id();
    let events: Vec<Event> = report
        .events
        .iter()
        .filter_map(|id| context.events().get(*id).cloned())
        .collect();
    if !events.is_empty() {
        sink.record_events(simulation_id, &events).await?;
    }
    let outcomes: Vec<_> = report.outcomes().cloned().collect();
    if !outcomes.is_empty() {
        sink.record_outcomes(simulation_id, &outcomes).await?;
    }
    sink.save_clock(&context.clock().state(simulation_id.clone()))
        .await
}

/// Log the end-of-day totals.
pub fn log_day_end(summary: &DaySummary) {
    info!(
        simulation_id = %summary.simulation_id,
        date = %summary.date,
        ticks = summary.ticks,
        executed = summary.executed,
        failed = summary.failed,
        missed = summary.missed,
        events = summary.events,
        "Day ended"
    );
    if summary.failed > 0 || summary.missed > 0 {
        warn!(
            failed = summary.failed,
            missed = summary.missed,
            "Some scheduled actions did not happen"
        );
    }
}
