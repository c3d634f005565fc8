//! End-to-end scheduling tests: plans, ticks, executors, reducers and the
//! event log working together.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::too_many_lines,
    clippy::arithmetic_side_effects
)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use worldsim_core::executor::{ExecutionContext, ExecutionReport, Executor, ExecutorError};
use worldsim_core::hooks::{
    Conversation, ConversationRunner, ConversationTrigger, TickHook, TickView,
};
use worldsim_core::scheduler::{AGENT_NOT_FOUND, TickReport};
use worldsim_core::{
    MemorySink, NoOpCallback, PlanSettings, SimulationClock, SimulationContext, StubExecutor,
    TickScheduler, convert_plan, run_day,
};
use worldsim_types::{
    ActionParameters, AgentId, DispatchOutcome, EventDraft, EventType, FirmId, OrderId,
    OutcomeStatus, PlaceId, PlanStep, ScheduledEvent, SimulationId,
};
use worldsim_world::payload::{OrderPlaced, to_metadata};
use worldsim_world::{AgentSnapshot, FirmLedger, OrderLine, WorldState};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day(3).and_hms_opt(h, m, 0).unwrap()
}

fn world() -> WorldState {
    WorldState::builder()
        .agent(AgentId::new("ada"), "home")
        .agent(AgentId::new("bob"), "home")
        .firm(
            FirmLedger::new(FirmId::new("grocer"))
                .with_product("MILK_GAL", 10, dec!(4.50), dec!(3.00))
                .with_cash(dec!(100)),
        )
        .build()
        .unwrap()
}

fn scheduler_from(start: NaiveDateTime, end: Option<NaiveDateTime>) -> TickScheduler {
    let clock = SimulationClock::new(start, TimeDelta::minutes(15), end);
    TickScheduler::new(SimulationContext::new(
        SimulationId::new("sim-test"),
        clock,
        world(),
        "town",
    ))
}

fn action(agent: &str, due: NaiveDateTime, name: &str, priority: i64) -> ScheduledEvent {
    ScheduledEvent {
        due_time: due,
        agent_id: AgentId::new(agent),
        action_name: name.to_owned(),
        action: ActionParameters::Generic {
            params: BTreeMap::new(),
        },
        location: "home".to_owned(),
        priority,
    }
}

fn travel(agent: &str, due: NaiveDateTime, to: &str) -> ScheduledEvent {
    ScheduledEvent {
        action_name: "Travel".to_owned(),
        action: ActionParameters::Travel {
            to: PlaceId::new(to),
            extra: BTreeMap::new(),
        },
        ..action(agent, due, "Travel", 0)
    }
}

/// Records dispatch order and fails the actions it is told to fail.
#[derive(Default)]
struct Recorder {
    seen: Vec<(String, i64)>,
    reject: BTreeSet<String>,
    error: BTreeSet<String>,
}

impl Executor for Recorder {
    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
    ) -> Result<ExecutionReport, ExecutorError> {
        self.seen.push((event.action_name.clone(), event.priority));
        if self.error.contains(&event.action_name) {
            return Err(ExecutorError::Timeout { limit_ms: 50 });
        }
        if self.reject.contains(&event.action_name) {
            return Ok(ExecutionReport::failed("not today"));
        }
        StubExecutor.execute(ctx, agent, event)
    }
}

fn all_outcomes(reports: &[TickReport]) -> Vec<&DispatchOutcome> {
    reports.iter().flat_map(TickReport::outcomes).collect()
}

#[test]
fn twelve_ticks_dispatch_the_nine_oclock_event_once() {
    let mut scheduler = scheduler_from(at(6, 0), Some(day(4).and_hms_opt(6, 0, 0).unwrap()));
    scheduler.schedule(action("ada", at(9, 5), "Work", 0));

    let reports: Vec<TickReport> = (0..12)
        .map(|_| scheduler.run_tick(&mut StubExecutor))
        .collect();

    let busy: Vec<&TickReport> = reports.iter().filter(|r| r.due > 0).collect();
    assert_eq!(busy.len(), 1);
    assert_eq!(reports.iter().filter(|r| r.due == 0).count(), 11);

    let busy = busy[0];
    assert_eq!(busy.window.start, at(9, 0));
    assert_eq!(busy.window.end, at(9, 15));
    assert_eq!(busy.executed.len() + busy.failed.len(), 1);
    assert!(reports.iter().all(|r| r.missed.is_empty()));
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.context().clock().current(), at(9, 0));
}

#[test]
fn lower_priority_dispatches_first_within_a_tick() {
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.schedule(action("ada", at(9, 5), "second", 1));
    scheduler.schedule(action("bob", at(9, 5), "first", 0));
    scheduler.schedule(action("ada", at(9, 1), "earliest", 5));

    let mut recorder = Recorder::default();
    scheduler.dispatch_current_tick(&mut recorder);

    assert_eq!(
        recorder.seen,
        vec![
            ("earliest".to_owned(), 5),
            ("first".to_owned(), 0),
            ("second".to_owned(), 1)
        ]
    );
}

#[test]
fn equal_keys_keep_insertion_order() {
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.schedule(action("ada", at(9, 5), "a", 0));
    scheduler.schedule(action("ada", at(9, 5), "b", 0));
    scheduler.schedule(action("ada", at(9, 5), "c", 0));

    let mut recorder = Recorder::default();
    scheduler.dispatch_current_tick(&mut recorder);
    let names: Vec<&str> = recorder.seen.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn earlier_due_time_never_dispatches_in_a_later_tick() {
    let mut scheduler = scheduler_from(at(6, 0), None);
    scheduler.schedule(action("ada", at(8, 40), "late", 0));
    scheduler.schedule(action("ada", at(6, 20), "early", 9));
    scheduler.schedule(action("bob", at(7, 59), "middle", 0));

    let mut reports = vec![scheduler.dispatch_current_tick(&mut StubExecutor)];
    while scheduler.pending_count() > 0 {
        reports.push(scheduler.run_tick(&mut StubExecutor));
    }

    let order: Vec<(&str, NaiveDateTime)> = reports
        .iter()
        .flat_map(|r| r.executed.iter().map(|o| (o.action_name.as_str(), r.window.start)))
        .collect();
    assert_eq!(
        order,
        vec![("early", at(6, 15)), ("middle", at(7, 45)), ("late", at(8, 30))]
    );
}

#[test]
fn every_event_resolves_exactly_once() {
    let mut scheduler = scheduler_from(at(6, 0), None);
    let mut ids = Vec::new();
    for (i, name) in ["ok", "reject", "boom", "ok", "ok"].iter().enumerate() {
        let due = at(6, 0) + TimeDelta::minutes(i64::try_from(i).unwrap() * 20);
        ids.push(scheduler.schedule(action("ada", due, name, 0)));
    }
    ids.push(scheduler.schedule(action("ghost", at(6, 30), "ok", 0)));

    let mut recorder = Recorder {
        reject: BTreeSet::from(["reject".to_owned()]),
        error: BTreeSet::from(["boom".to_owned()]),
        ..Recorder::default()
    };
    let mut reports = vec![scheduler.dispatch_current_tick(&mut recorder)];
    for _ in 0..8 {
        reports.push(scheduler.run_tick(&mut recorder));
    }

    let outcomes = all_outcomes(&reports);
    let resolved: Vec<_> = outcomes.iter().map(|o| o.scheduled_id).collect();
    let unique: BTreeSet<_> = resolved.iter().copied().collect();
    assert_eq!(resolved.len(), ids.len());
    assert_eq!(unique, ids.iter().copied().collect::<BTreeSet<_>>());
    assert_eq!(scheduler.pending_count(), 0);

    let executed = reports.iter().map(|r| r.executed.len()).sum::<usize>();
    let failed = reports.iter().map(|r| r.failed.len()).sum::<usize>();
    assert_eq!(executed, 3);
    assert_eq!(failed, 3);
    for outcome in reports.iter().flat_map(|r| &r.executed) {
        assert_eq!(outcome.status, OutcomeStatus::Executed);
        assert!(outcome.error.is_none());
    }
}

#[test]
fn unknown_agent_fails_without_touching_siblings() {
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.schedule(travel("ghost", at(9, 1), "park"));
    scheduler.schedule(travel("ada", at(9, 2), "park"));

    let report = scheduler.dispatch_current_tick(&mut StubExecutor);

    assert_eq!(report.failed.len(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.agent_id, AgentId::new("ghost"));
    assert_eq!(failed.error.as_deref(), Some(AGENT_NOT_FOUND));
    assert_eq!(report.executed.len(), 1);
    assert_eq!(
        scheduler
            .context()
            .world()
            .agent_position(&AgentId::new("ada")),
        Some(&PlaceId::new("park"))
    );
}

#[test]
fn executor_errors_are_isolated_and_not_retried() {
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.schedule(action("ada", at(9, 0), "boom", 0));
    scheduler.schedule(travel("bob", at(9, 0), "store"));

    let mut recorder = Recorder {
        error: BTreeSet::from(["boom".to_owned()]),
        ..Recorder::default()
    };
    let report = scheduler.dispatch_current_tick(&mut recorder);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        report.failed[0].error.as_deref(),
        Some("action timed out after 50ms")
    );
    assert!(report.failed[0].emitted_events.is_empty());
    assert_eq!(report.executed.len(), 1);
    assert_eq!(
        scheduler
            .context()
            .world()
            .agent_position(&AgentId::new("bob")),
        Some(&PlaceId::new("store"))
    );

    for _ in 0..4 {
        scheduler.run_tick(&mut recorder);
    }
    assert_eq!(recorder.seen.iter().filter(|(n, _)| n == "boom").count(), 1);
}

#[test]
fn clock_jump_reports_skipped_events_as_missed() {
    let mut scheduler = scheduler_from(at(6, 0), None);
    scheduler.schedule(action("ada", at(7, 0), "skipped", 0));
    scheduler.schedule(action("ada", at(10, 5), "kept", 0));

    scheduler.context_mut().clock_mut().advance_to(at(10, 0));
    let report = scheduler.dispatch_current_tick(&mut StubExecutor);

    assert_eq!(report.missed.len(), 1);
    assert_eq!(report.missed[0].action_name, "skipped");
    assert_eq!(report.missed[0].status, OutcomeStatus::Missed);
    assert_eq!(report.executed.len(), 1);

    let later = scheduler.run_tick(&mut StubExecutor);
    assert!(later.missed.is_empty());
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn produced_events_are_anonymized_and_stamped_with_due_time() {
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.schedule(action("ada", at(9, 3), "Work", 0));
    scheduler.schedule(action("bob", at(9, 4), "Work", 1));
    scheduler.schedule(action("ada", at(9, 30), "Rest", 0));

    let first = scheduler.dispatch_current_tick(&mut StubExecutor);
    scheduler.run_tick(&mut StubExecutor);
    let second = scheduler.run_tick(&mut StubExecutor);

    let events = scheduler.context().events();
    let ada_first = events.get(first.executed[0].emitted_events[0]).unwrap();
    let bob = events.get(first.executed[1].emitted_events[0]).unwrap();
    let ada_again = events.get(second.executed[0].emitted_events[0]).unwrap();

    assert_eq!(ada_first.timestamp, at(9, 3));
    assert!(ada_first.content.starts_with("agent 1 "));
    assert!(bob.content.starts_with("agent 2 "));
    assert!(ada_again.content.starts_with("agent 1 "));
    assert!(!ada_again.content.contains("ada"));
    assert_eq!(
        ada_again.agent_for_token("agent 1"),
        Some(&AgentId::new("ada"))
    );
    assert!(ada_first.event_id < bob.event_id && bob.event_id < ada_again.event_id);
}

/// Places a one-gallon milk order for every `Exchange` action.
struct Shopper;

impl Executor for Shopper {
    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
    ) -> Result<ExecutionReport, ExecutorError> {
        let ActionParameters::Exchange { counterparty, .. } = &event.action else {
            return Ok(ExecutionReport::failed("not a purchase"));
        };
        let order_id = ctx
            .world
            .peek_next_order_id(counterparty)
            .ok_or_else(|| ExecutorError::Rejected {
                reason: format!("unknown firm {counterparty}"),
            })?;
        let payload = OrderPlaced {
            firm_id: counterparty.clone(),
            order_id,
            customer: Some(agent.agent_id.clone()),
            items: vec![OrderLine {
                sku: "MILK_GAL".to_owned(),
                qty: 1,
            }],
            total_price: ctx.world.firm_price(counterparty, "MILK_GAL"),
        };
        let mut draft = EventDraft::new(EventType::RetailOrderPlaced, "milk order")
            .with_source(agent.agent_id.clone());
        draft.metadata = to_metadata(&payload);
        Ok(ExecutionReport::executed(vec![draft]))
    }
}

fn exchange(agent: &str, due: NaiveDateTime, firm: &str) -> ScheduledEvent {
    ScheduledEvent {
        action_name: "Exchange".to_owned(),
        action: ActionParameters::Exchange {
            counterparty: FirmId::new(firm),
            receive: BTreeMap::from([("MILK_GAL".to_owned(), 1)]),
            extra: BTreeMap::new(),
        },
        ..action(agent, due, "Exchange", 0)
    }
}

#[test]
fn sequential_orders_mint_distinct_firm_order_ids() {
    let mut scheduler = scheduler_from(at(11, 0), None);
    scheduler.schedule(exchange("ada", at(11, 1), "grocer"));
    scheduler.schedule(exchange("bob", at(11, 2), "grocer"));
    scheduler.schedule(exchange("bob", at(11, 3), "nowhere"));

    let report = scheduler.dispatch_current_tick(&mut Shopper);
    assert_eq!(report.executed.len(), 2);
    assert_eq!(report.failed.len(), 1);

    let world = scheduler.context().world();
    let grocer = FirmId::new("grocer");
    assert_eq!(world.firm_cash(&grocer), dec!(109.00));
    assert_eq!(world.firm_inventory(&grocer, "MILK_GAL"), 8);
    assert!(world.firm_order(&grocer, &OrderId::new("O1")).is_some());
    assert!(world.firm_order(&grocer, &OrderId::new("O2")).is_some());
    assert_eq!(world.peek_next_order_id(&grocer), Some(OrderId::new("O3")));
}

/// Emits a notification after every tick, and one draft for the wrong
/// environment.
struct Announcer;

impl TickHook for Announcer {
    fn name(&self) -> &str {
        "announcer"
    }

    fn after_tick(&mut self, view: &TickView<'_>, report: &TickReport) -> Vec<EventDraft> {
        vec![
            EventDraft::system_notification(format!(
                "{} actions resolved at {}",
                report.executed.len() + report.failed.len(),
                view.window.start
            )),
            EventDraft::system_notification("lost").in_environment("elsewhere"),
        ]
    }
}

#[test]
fn hook_drafts_are_logged_and_rejections_reported() {
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.add_hook(Box::new(Announcer));
    scheduler.schedule(action("ada", at(9, 5), "Work", 0));

    let report = scheduler.dispatch_current_tick(&mut StubExecutor);

    assert_eq!(report.executed.len(), 1);
    assert_eq!(report.events.len(), 2);
    assert_eq!(report.rejected_drafts.len(), 1);
    let note = scheduler
        .context()
        .events()
        .get(*report.events.last().unwrap())
        .unwrap();
    assert_eq!(note.event_type, EventType::SystemNotification);
    assert_eq!(note.timestamp, at(9, 0));
}

/// Always converses, summarizing with the agents' display names.
struct Gossip {
    names: BTreeMap<AgentId, String>,
}

impl ConversationRunner for Gossip {
    fn run_conversation(
        &mut self,
        sender: &AgentSnapshot,
        recipient: &AgentSnapshot,
        _channel: &str,
        _opening: Option<&str>,
    ) -> Result<Option<Conversation>, ExecutorError> {
        let mentions: BTreeMap<String, AgentId> = [&sender.agent_id, &recipient.agent_id]
            .into_iter()
            .filter_map(|id| self.names.get(id).map(|name| (name.clone(), id.clone())))
            .collect();
        Ok(Some(Conversation {
            summary: format!(
                "{} told {} a secret",
                self.names[&sender.agent_id], self.names[&recipient.agent_id]
            ),
            turns: 3,
            mentions,
        }))
    }
}

#[test]
fn hook_content_is_anonymized_like_executor_content() {
    let names = BTreeMap::from([
        (AgentId::new("ada"), "Ada Park".to_owned()),
        (AgentId::new("bob"), "Bob Stone".to_owned()),
    ]);
    let mut scheduler = scheduler_from(at(9, 0), None);
    scheduler.add_hook(Box::new(ConversationTrigger::new(Gossip { names })));
    scheduler.schedule(ScheduledEvent {
        action: ActionParameters::DirectMessage {
            channel: "phone".to_owned(),
            recipient: AgentId::new("bob"),
            body: None,
            extra: BTreeMap::new(),
        },
        ..action("ada", at(9, 5), "dm_on_phone", 0)
    });

    let report = scheduler.dispatch_current_tick(&mut StubExecutor);
    assert_eq!(report.events.len(), 2);

    let events = scheduler.context().events();
    for id in &report.events {
        let content = &events.get(*id).unwrap().content;
        assert!(!content.contains("Ada Park"), "{content}");
        assert!(!content.contains("Bob Stone"), "{content}");
    }
    let talk = events.get(report.events[0]).unwrap();
    assert_eq!(talk.event_type, EventType::Interaction);
    assert_eq!(
        talk.content,
        "agent 1 talked with agent 2 on phone: agent 1 told agent 2 a secret"
    );
    assert_eq!(talk.agent_for_token("agent 1"), Some(&AgentId::new("ada")));
    assert_eq!(talk.agent_for_token("agent 2"), Some(&AgentId::new("bob")));
}

#[tokio::test]
async fn persisted_outcomes_follow_dispatch_order_for_shared_due_times() {
    let mut scheduler = scheduler_from(at(23, 0), None);
    scheduler.schedule(action("ada", at(23, 5), "second", 1));
    scheduler.schedule(action("bob", at(23, 5), "first", 0));
    scheduler.schedule(action("ada", at(23, 20), "later", 0));

    let mut recorder = Recorder {
        reject: BTreeSet::from(["first".to_owned()]),
        ..Recorder::default()
    };
    let mut sink = MemorySink::new();
    let summary = run_day(&mut scheduler, &mut recorder, &mut sink, &mut NoOpCallback)
        .await
        .unwrap();
    assert_eq!(summary.executed, 2);
    assert_eq!(summary.failed, 1);

    let dispatched: Vec<&str> = recorder.seen.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(dispatched, vec!["first", "second", "later"]);

    let persisted = sink.outcomes(&SimulationId::new("sim-test"));
    let order: Vec<(&str, i64, OutcomeStatus)> = persisted
        .iter()
        .map(|o| (o.action_name.as_str(), o.priority, o.status))
        .collect();
    assert_eq!(
        order,
        vec![
            ("first", 0, OutcomeStatus::Failed),
            ("second", 1, OutcomeStatus::Executed),
            ("later", 0, OutcomeStatus::Executed),
        ]
    );
}

#[tokio::test]
async fn converted_plan_runs_through_a_whole_day() {
    let settings = PlanSettings::default();
    let step = |time: &str, action: &str, params: Value| PlanStep {
        target_time: time.to_owned(),
        action: action.to_owned(),
        location: "home".to_owned(),
        parameters: serde_json::from_value(params).unwrap(),
    };
    let plan = vec![
        step("0500 AM", "MorningRoutine", json!({})),
        step("08:30 AM", "Travel", json!({"to": "office"})),
        step("whenever", "Work", json!({"duration_hours": 6})),
        step("06:00 PM", "Travel", json!({"to": "home"})),
        step("10:30 PM", "Sleep", json!({})),
    ];
    let ada = AgentId::new("ada");
    let conversion = convert_plan(&ada, &plan, day(3), Some(at(6, 45)), &settings);
    assert_eq!(conversion.shifted, vec![0]);
    assert_eq!(conversion.substitutions.len(), 1);

    let mut scheduler = scheduler_from(at(0, 0), None);
    scheduler.schedule_all(conversion.events);
    let mut sink = MemorySink::new();
    let summary = run_day(&mut scheduler, &mut StubExecutor, &mut sink, &mut NoOpCallback)
        .await
        .unwrap();

    assert_eq!(summary.ticks, 96);
    assert_eq!(summary.executed, 5);
    assert_eq!(summary.failed + summary.missed, 0);
    assert_eq!(
        scheduler.context().world().agent_position(&ada),
        Some(&PlaceId::new("home"))
    );
    let sim = SimulationId::new("sim-test");
    assert_eq!(sink.outcomes(&sim).len(), 5);
    assert_eq!(
        sink.clock(&sim).unwrap().current,
        at(23, 45)
    );
}
