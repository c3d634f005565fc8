//! Tick scheduler: orders pending actions and dispatches them tick by tick.
//!
//! Each tick covers the half-open window `[start, start + tick)` of the
//! clock. Per tick the scheduler:
//!
//! 1. Reports every pending event due *before* the window as `missed` and
//!    drops it. Missed events are never requeued.
//! 2. Removes the events due inside the window, in `(due_time, priority,
//!    insertion)` order.
//! 3. Runs the `before_dispatch` side hooks against the pre-tick world.
//! 4. Resolves each event's agent. An unknown agent is a `failed` outcome.
//! 5. Hands each event to the [`Executor`]. On success the produced events
//!    are logged and reduced; either way the outcome is recorded.
//! 6. Runs the `after_tick` hooks and returns a [`TickReport`].
//!
//! Every scheduled event is removed from the pending set before it is
//! dispatched, so it is resolved exactly once: `executed`, `failed` or
//! `missed`. The scheduler never retries; callers that want a retry must
//! schedule the event again.

use core::fmt;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use worldsim_types::{
    DispatchOutcome, EventDraft, EventId, OutcomeStatus, ScheduledEvent, ScheduledEventId,
};

use crate::clock::TickWindow;
use crate::context::SimulationContext;
use crate::executor::{ExecutionContext, ExecutionReport, Executor};
use crate::hooks::{TickHook, TickView};

/// Reason recorded for events whose agent does not exist.
pub const AGENT_NOT_FOUND: &str = "agent not found";

/// Reason recorded for events due before the current tick.
pub const DUE_BEFORE_TICK: &str = "due before current tick";

/// Pending-set key: the dispatch order.
type PendingKey = (NaiveDateTime, i64, ScheduledEventId);

/// Where the scheduler is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickPhase {
    /// Nothing has been dispatched since the scheduler was created.
    Idle,
    /// The clock has moved; the current tick has not been dispatched.
    TickReady,
    /// The current tick has been dispatched.
    TickSettled,
    /// The current tick was the last one of the day.
    Completed,
}

/// Everything that happened in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// The window that was dispatched.
    pub window: TickWindow,
    /// Whether the clock moved before this dispatch.
    pub advanced: bool,
    /// Number of events that were due inside the window.
    pub due: usize,
    /// Outcomes of actions that happened, in dispatch order.
    pub executed: Vec<DispatchOutcome>,
    /// Outcomes of actions that did not happen, in dispatch order.
    pub failed: Vec<DispatchOutcome>,
    /// Events dropped because they were due before the window.
    pub missed: Vec<DispatchOutcome>,
    /// Ids of every event logged during the tick, hooks included.
    pub events: Vec<EventId>,
    /// Errors of event drafts the log rejected.
    pub rejected_drafts: Vec<String>,
    /// Whether this was the last tick of the day.
    pub end_of_day: bool,
}

impl TickReport {
    const fn new(window: TickWindow) -> Self {
        Self {
            window,
            advanced: false,
            due: 0,
            executed: Vec::new(),
            failed: Vec::new(),
            missed: Vec::new(),
            events: Vec::new(),
            rejected_drafts: Vec::new(),
            end_of_day: false,
        }
    }

    /// Whether nothing was due, missed or logged.
    pub fn is_empty(&self) -> bool {
        self.due == 0 && self.missed.is_empty() && self.events.is_empty()
    }

    /// Every outcome of the tick: missed, then dispatch order.
    pub fn outcomes(&self) -> impl Iterator<Item = &DispatchOutcome> {
        let mut dispatched: Vec<&DispatchOutcome> =
            self.executed.iter().chain(self.failed.iter()).collect();
        dispatched.sort_by_key(|o| (o.due_time, o.priority, o.scheduled_id));
        self.missed.iter().chain(dispatched)
    }
}

/// Orders pending scheduled events and dispatches them per tick.
pub struct TickScheduler {
    context: SimulationContext,
    pending: BTreeMap<PendingKey, ScheduledEvent>,
    next_id: u64,
    phase: TickPhase,
    hooks: Vec<Box<dyn TickHook>>,
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickScheduler")
            .field("context", &self.context)
            .field("pending", &self.pending.len())
            .field("next_id", &self.next_id)
            .field("phase", &self.phase)
            .field(
                "hooks",
                &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TickScheduler {
    /// Create an idle scheduler over `context`.
    pub const fn new(context: SimulationContext) -> Self {
        Self {
            context,
            pending: BTreeMap::new(),
            next_id: 0,
            phase: TickPhase::Idle,
            hooks: Vec::new(),
        }
    }

    /// The run's context.
    pub const fn context(&self) -> &SimulationContext {
        &self.context
    }

    /// Mutable access to the run's context.
    pub const fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.context
    }

    /// Tear down the scheduler, returning the context.
    pub fn into_context(self) -> SimulationContext {
        self.context
    }

    /// The current phase.
    pub const fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Register a side hook. Hooks run in registration order.
    pub fn add_hook(&mut self, hook: Box<dyn TickHook>) {
        debug!(hook = hook.name(), "Tick hook registered");
        self.hooks.push(hook);
    }

    /// Add an event to the pending set.
    pub fn schedule(&mut self, event: ScheduledEvent) -> ScheduledEventId {
        let id = ScheduledEventId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        debug!(
            scheduled_id = %id,
            agent_id = %event.agent_id,
            action = %event.action_name,
            due_time = %event.due_time,
            priority = event.priority,
            "Event scheduled"
        );
        self.pending
            .insert((event.due_time, event.priority, id), event);
        id
    }

    /// Add several events, returning their ids in input order.
    pub fn schedule_all(
        &mut self,
        events: impl IntoIterator<Item = ScheduledEvent>,
    ) -> Vec<ScheduledEventId> {
        events.into_iter().map(|e| self.schedule(e)).collect()
    }

    /// Number of events not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending events in dispatch order.
    pub fn pending(&self) -> impl Iterator<Item = (ScheduledEventId, &ScheduledEvent)> {
        self.pending.iter().map(|((_, _, id), e)| (*id, e))
    }

    /// Move the clock forward one tick. Returns whether it moved; it does
    /// not while paused or once the end has been reached.
    pub fn advance_to_next_tick(&mut self) -> bool {
        let before = self.context.clock().current();
        let after = self.context.clock_mut().advance_tick();
        let moved = after > before;
        if moved {
            self.phase = TickPhase::TickReady;
        }
        moved
    }

    /// Pending events due in the current window, in dispatch order.
    pub fn events_due_in_current_tick(&self) -> Vec<ScheduledEvent> {
        let window = self.context.clock().tick_window();
        self.pending
            .range(window_start_key(window.start)..window_start_key(window.end))
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Advance one tick and dispatch it.
    ///
    /// If the clock cannot move, nothing is dispatched and the report has
    /// `advanced == false`.
    pub fn run_tick(&mut self, executor: &mut dyn Executor) -> TickReport {
        if !self.advance_to_next_tick() {
            let mut report = TickReport::new(self.context.clock().tick_window());
            report.end_of_day = self.context.clock().is_end_of_day();
            debug!(current = %self.context.clock().current(), "Clock did not advance, nothing dispatched");
            return report;
        }
        let mut report = self.dispatch_current_tick(executor);
        report.advanced = true;
        report
    }

    /// Dispatch every event due in the current window.
    pub fn dispatch_current_tick(&mut self, executor: &mut dyn Executor) -> TickReport {
        let window = self.context.clock().tick_window();
        let mut report = TickReport::new(window);

        self.drop_missed(window, &mut report);

        let due_keys: Vec<PendingKey> = self
            .pending
            .range(window_start_key(window.start)..window_start_key(window.end))
            .map(|(key, _)| *key)
            .collect();
        let due: Vec<(ScheduledEventId, ScheduledEvent)> = due_keys
            .iter()
            .filter_map(|key| self.pending.remove(key).map(|e| (key.2, e)))
            .collect();
        report.due = due.len();
        let due_events: Vec<ScheduledEvent> = due.iter().map(|(_, e)| e.clone()).collect();

        let drafts = self.run_before_hooks(window, &due_events);
        self.record_drafts(drafts, window.start, &mut report);

        for (id, event) in due {
            self.dispatch_one(executor, window, id, event, &mut report);
        }

        let drafts = self.run_after_hooks(window, &due_events, &report);
        self.record_drafts(drafts, window.start, &mut report);

        report.end_of_day = self.context.clock().is_end_of_day();
        self.phase = if report.end_of_day {
            TickPhase::Completed
        } else {
            TickPhase::TickSettled
        };

        info!(
            tick_start = %window.start,
            due = report.due,
            executed = report.executed.len(),
            failed = report.failed.len(),
            missed = report.missed.len(),
            events = report.events.len(),
            end_of_day = report.end_of_day,
            "Tick dispatched"
        );
        report
    }

    fn drop_missed(&mut self, window: TickWindow, report: &mut TickReport) {
        let stale: Vec<PendingKey> = self
            .pending
            .range(..window_start_key(window.start))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            let Some(event) = self.pending.remove(&key) else {
                continue;
            };
            warn!(
                scheduled_id = %key.2,
                agent_id = %event.agent_id,
                action = %event.action_name,
                due_time = %event.due_time,
                tick_start = %window.start,
                "Scheduled event missed"
            );
            report.missed.push(outcome(
                key.2,
                event,
                OutcomeStatus::Missed,
                window.start,
                Resolution::failure(DUE_BEFORE_TICK),
            ));
        }
    }

    fn dispatch_one(
        &mut self,
        executor: &mut dyn Executor,
        window: TickWindow,
        id: ScheduledEventId,
        event: ScheduledEvent,
        report: &mut TickReport,
    ) {
        let Some(agent) = self.context.world().agent_snapshot(&event.agent_id) else {
            warn!(scheduled_id = %id, agent_id = %event.agent_id, "Dispatch failed: agent not found");
            report.failed.push(outcome(
                id,
                event,
                OutcomeStatus::Failed,
                window.start,
                Resolution::failure(AGENT_NOT_FOUND),
            ));
            return;
        };

        let result = {
            let ctx = ExecutionContext {
                world: self.context.world(),
                window,
                environment: self.context.events().environment(),
            };
            executor.execute(&ctx, &agent, &event)
        };

        match result {
            Ok(ExecutionReport {
                executed: true,
                result,
                events,
                ..
            }) => {
                let emitted = self.record_drafts(events, event.due_time, report);
                debug!(
                    scheduled_id = %id,
                    agent_id = %event.agent_id,
                    action = %event.action_name,
                    events = emitted.len(),
                    "Action executed"
                );
                report.executed.push(outcome(
                    id,
                    event,
                    OutcomeStatus::Executed,
                    window.start,
                    Resolution {
                        result,
                        error: None,
                        emitted,
                    },
                ));
            }
            Ok(ExecutionReport { result, error, .. }) => {
                let reason = error.unwrap_or_else(|| "executor reported failure".to_owned());
                warn!(scheduled_id = %id, agent_id = %event.agent_id, action = %event.action_name, reason = %reason, "Action failed");
                report.failed.push(outcome(
                    id,
                    event,
                    OutcomeStatus::Failed,
                    window.start,
                    Resolution {
                        result,
                        error: Some(reason),
                        emitted: Vec::new(),
                    },
                ));
            }
            Err(e) => {
                warn!(scheduled_id = %id, agent_id = %event.agent_id, action = %event.action_name, error = %e, "Executor error");
                report.failed.push(outcome(
                    id,
                    event,
                    OutcomeStatus::Failed,
                    window.start,
                    Resolution::failure(e.to_string()),
                ));
            }
        }
    }

    fn run_before_hooks(&mut self, window: TickWindow, due: &[ScheduledEvent]) -> Vec<EventDraft> {
        let view = TickView {
            window,
            world: self.context.world(),
            due,
            events: self.context.events(),
        };
        self.hooks
            .iter_mut()
            .flat_map(|hook| hook.before_dispatch(&view))
            .collect()
    }

    fn run_after_hooks(
        &mut self,
        window: TickWindow,
        due: &[ScheduledEvent],
        report: &TickReport,
    ) -> Vec<EventDraft> {
        let view = TickView {
            window,
            world: self.context.world(),
            due,
            events: self.context.events(),
        };
        self.hooks
            .iter_mut()
            .flat_map(|hook| hook.after_tick(&view, report))
            .collect()
    }

    /// Log and reduce drafts, stamping undated ones with `now`.
    fn record_drafts(
        &mut self,
        drafts: Vec<EventDraft>,
        now: NaiveDateTime,
        report: &mut TickReport,
    ) -> Vec<EventId> {
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let event_type = draft.event_type.clone();
            match self.context.record(draft, now) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    warn!(event_type = %event_type, error = %e, "Event draft rejected");
                    report.rejected_drafts.push(e.to_string());
                }
            }
        }
        report.events.extend(ids.iter().copied());
        ids
    }
}

/// Smallest key with the given due time.
const fn window_start_key(t: NaiveDateTime) -> PendingKey {
    (t, i64::MIN, ScheduledEventId(0))
}

struct Resolution {
    result: Option<serde_json::Value>,
    error: Option<String>,
    emitted: Vec<EventId>,
}

impl Resolution {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(reason.into()),
            emitted: Vec::new(),
        }
    }
}

fn outcome(
    scheduled_id: ScheduledEventId,
    event: ScheduledEvent,
    status: OutcomeStatus,
    resolved_at: NaiveDateTime,
    resolution: Resolution,
) -> DispatchOutcome {
    DispatchOutcome {
        scheduled_id,
        agent_id: event.agent_id,
        action_name: event.action_name,
        action: event.action,
        due_time: event.due_time,
        priority: event.priority,
        location: event.location,
        status,
        result: resolution.result,
        error: resolution.error,
        emitted_events: resolution.emitted,
        resolved_at,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};
    use worldsim_types::{ActionParameters, AgentId, SimulationId};
    use worldsim_world::WorldState;

    use super::*;
    use crate::clock::SimulationClock;
    use crate::executor::StubExecutor;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn scheduler() -> TickScheduler {
        let world = WorldState::builder()
            .agent(AgentId::new("a1"), "home")
            .build()
            .unwrap();
        let clock = SimulationClock::new(at(6, 0), TimeDelta::minutes(15), None);
        TickScheduler::new(SimulationContext::new(
            SimulationId::new("sim"),
            clock,
            world,
            "town",
        ))
    }

    fn work(due: NaiveDateTime, priority: i64) -> ScheduledEvent {
        ScheduledEvent {
            due_time: due,
            agent_id: AgentId::new("a1"),
            action_name: "Work".to_owned(),
            action: ActionParameters::Work {
                duration_hours: 8,
                extra: BTreeMap::new(),
            },
            location: "office".to_owned(),
            priority,
        }
    }

    #[test]
    fn due_selection_uses_half_open_window() {
        let mut s = scheduler();
        s.schedule(work(at(6, 0), 0));
        s.schedule(work(at(6, 14), 0));
        s.schedule(work(at(6, 15), 0));
        assert_eq!(s.events_due_in_current_tick().len(), 2);
    }

    #[test]
    fn phases_follow_the_tick_cycle() {
        let mut s = scheduler();
        assert_eq!(s.phase(), TickPhase::Idle);
        assert!(s.advance_to_next_tick());
        assert_eq!(s.phase(), TickPhase::TickReady);
        s.dispatch_current_tick(&mut StubExecutor);
        assert_eq!(s.phase(), TickPhase::TickSettled);
    }

    #[test]
    fn paused_clock_dispatches_nothing() {
        let mut s = scheduler();
        s.schedule(work(at(6, 20), 0));
        s.context_mut().clock_mut().pause();
        let report = s.run_tick(&mut StubExecutor);
        assert!(!report.advanced);
        assert_eq!(report.due, 0);
        assert_eq!(s.pending_count(), 1);
    }

    #[test]
    fn stale_events_are_reported_missed() {
        let mut s = scheduler();
        s.schedule(work(at(6, 5), 0));
        let report = s.run_tick(&mut StubExecutor);
        assert_eq!(report.missed.len(), 1);
        let missed = report.missed.first().unwrap();
        assert_eq!(missed.status, OutcomeStatus::Missed);
        assert_eq!(missed.error.as_deref(), Some(DUE_BEFORE_TICK));
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn outcomes_follow_priority_within_a_due_time() {
        let mut s = scheduler();
        s.schedule(work(at(6, 5), 1));
        s.schedule(ScheduledEvent {
            agent_id: AgentId::new("ghost"),
            ..work(at(6, 5), 0)
        });
        let report = s.dispatch_current_tick(&mut StubExecutor);
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        let order: Vec<(&str, i64)> = report
            .outcomes()
            .map(|o| (o.agent_id.as_str(), o.priority))
            .collect();
        assert_eq!(order, vec![("ghost", 0), ("a1", 1)]);
    }
}
