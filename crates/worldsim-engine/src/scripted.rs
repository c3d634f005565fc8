//! Deterministic executor and conversation runner used by the engine
//! binary in place of agent cognition.
//!
//! Every action becomes one or two log events whose content uses the
//! agents' display names; the event log swaps those names for anonymized
//! tokens on append.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use worldsim_core::{
    Conversation, ConversationRunner, ExecutionContext, ExecutionReport, Executor, ExecutorError,
};
use worldsim_types::{
    ActionParameters, AgentId, EventDraft, EventType, FirmId, PlaceId, ScheduledEvent,
};
use worldsim_world::payload::{AgentMoved, OrderFulfilled, OrderPlaced, to_metadata};
use worldsim_world::{AgentSnapshot, OrderLine};

/// Carries out scheduled actions by rule, without any model calls.
///
/// - `Travel` moves the agent if the destination is a known place.
/// - `Exchange` buys over the counter: an order is placed and fulfilled
///   when the firm exists and has every requested unit in stock.
/// - Work, routines and sleep are logged as interactions.
/// - Direct messages are logged as messages to the recipient.
/// - Anything else is rejected.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    names: BTreeMap<AgentId, String>,
    location: Vec<String>,
}

impl ScriptedExecutor {
    /// An executor using `names` as display names and `location` as the
    /// location prefix of every event.
    pub const fn new(names: BTreeMap<AgentId, String>, location: Vec<String>) -> Self {
        Self { names, location }
    }

    fn name_of<'a>(&'a self, agent_id: &'a AgentId) -> &'a str {
        self.names.get(agent_id).map_or(agent_id.as_str(), String::as_str)
    }

    fn located(&self, place: &str) -> Vec<String> {
        let mut path = self.location.clone();
        path.push(place.to_owned());
        path
    }

    fn activity(&self, agent: &AgentSnapshot, event: &ScheduledEvent, what: &str) -> EventDraft {
        let name = self.name_of(&agent.agent_id);
        EventDraft::interaction(
            format!("{name} {what} at {}", event.location),
            vec![agent.agent_id.clone()],
        )
        .with_source(agent.agent_id.clone())
        .located(self.located(&event.location))
        .mentioning(name, agent.agent_id.clone())
        .with_metadata("action", Value::String(event.action_name.clone()))
    }

    fn travel(
        &self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        to: &PlaceId,
    ) -> Result<ExecutionReport, ExecutorError> {
        if !ctx.world.place_exists(to) {
            return Err(ExecutorError::Rejected {
                reason: format!("unknown place {to}"),
            });
        }
        let name = self.name_of(&agent.agent_id);
        let from = agent
            .position
            .as_ref()
            .map_or("somewhere", PlaceId::as_str);
        let payload = AgentMoved {
            agent_id: agent.agent_id.clone(),
            new_place_id: to.clone(),
            from_place_id: agent.position.clone(),
        };
        let mut draft = EventDraft::new(
            EventType::AgentMoved,
            format!("{name} travels from {from} to {to}"),
        )
        .with_source(agent.agent_id.clone())
        .located(self.located(to.as_str()))
        .mentioning(name, agent.agent_id.clone());
        draft.participants = vec![agent.agent_id.clone()];
        draft.metadata = to_metadata(&payload);
        Ok(ExecutionReport::executed(vec![draft]).with_result(json!({ "to": to })))
    }

    fn exchange(
        &self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
        counterparty: &FirmId,
        receive: &BTreeMap<String, u32>,
    ) -> Result<ExecutionReport, ExecutorError> {
        let order_id = ctx
            .world
            .peek_next_order_id(counterparty)
            .ok_or_else(|| ExecutorError::Rejected {
                reason: format!("unknown firm {counterparty}"),
            })?;
        if receive.is_empty() {
            return Ok(ExecutionReport::failed("nothing to buy"));
        }

        let mut items = Vec::with_capacity(receive.len());
        let mut total = Decimal::ZERO;
        for (sku, &qty) in receive {
            let qty = u64::from(qty);
            if ctx.world.firm_inventory(counterparty, sku) < qty {
                return Ok(ExecutionReport::failed(format!(
                    "{counterparty} is out of {sku}"
                )));
            }
            let line = ctx
                .world
                .firm_price(counterparty, sku)
                .checked_mul(Decimal::from(qty))
                .and_then(|amount| total.checked_add(amount))
                .ok_or_else(|| ExecutorError::Internal {
                    message: format!("order total overflow for {sku}"),
                })?;
            total = line;
            items.push(OrderLine {
                sku: sku.clone(),
                qty,
            });
        }

        let name = self.name_of(&agent.agent_id);
        let placed = OrderPlaced {
            firm_id: counterparty.clone(),
            order_id: order_id.clone(),
            customer: Some(agent.agent_id.clone()),
            items,
            total_price: total,
        };
        let fulfilled = OrderFulfilled {
            firm_id: counterparty.clone(),
            order_id: order_id.clone(),
        };
        let mut placed_draft = EventDraft::new(
            EventType::RetailOrderPlaced,
            format!("{name} places order {order_id} at {counterparty} for {total}"),
        )
        .with_source(agent.agent_id.clone())
        .located(self.located(&event.location))
        .mentioning(name, agent.agent_id.clone());
        placed_draft.metadata = to_metadata(&placed);
        let mut fulfilled_draft = EventDraft::new(
            EventType::RetailOrderFulfilled,
            format!("{counterparty} hands order {order_id} to {name}"),
        )
        .with_source(agent.agent_id.clone())
        .located(self.located(&event.location))
        .mentioning(name, agent.agent_id.clone());
        fulfilled_draft.metadata = to_metadata(&fulfilled);

        Ok(
            ExecutionReport::executed(vec![placed_draft, fulfilled_draft])
                .with_result(json!({ "order_id": order_id, "total": total })),
        )
    }

    fn direct_message(
        &self,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
        channel: &str,
        recipient: &AgentId,
        body: Option<&str>,
    ) -> ExecutionReport {
        let name = self.name_of(&agent.agent_id);
        let recipient_name = self.name_of(recipient);
        let content = body.map_or_else(
            || format!("{name} pings {recipient_name} on {channel}"),
            |text| format!("{name} messages {recipient_name} on {channel}: {text}"),
        );
        let draft = EventDraft::message(content, agent.agent_id.clone(), Some(recipient.clone()))
            .located(self.located(&event.location))
            .mentioning(name, agent.agent_id.clone())
            .mentioning(recipient_name, recipient.clone())
            .with_metadata("channel", Value::String(channel.to_owned()));
        ExecutionReport::executed(vec![draft])
    }
}

impl Executor for ScriptedExecutor {
    fn execute(
        &mut self,
        ctx: &ExecutionContext<'_>,
        agent: &AgentSnapshot,
        event: &ScheduledEvent,
    ) -> Result<ExecutionReport, ExecutorError> {
        let kind = json!({ "kind": event.action.kind() });
        match &event.action {
            ActionParameters::Travel { to, .. } => self.travel(ctx, agent, to),
            ActionParameters::Exchange {
                counterparty,
                receive,
                ..
            } => self.exchange(ctx, agent, event, counterparty, receive),
            ActionParameters::Work { duration_hours, .. } => Ok(ExecutionReport::executed(vec![
                self.activity(agent, event, &format!("works a {duration_hours}-hour shift")),
            ])
            .with_result(kind)),
            ActionParameters::MorningRoutine {
                duration_minutes, ..
            } => {
                Ok(ExecutionReport::executed(vec![self.activity(
                    agent,
                    event,
                    &format!("gets ready for the day ({duration_minutes} min)"),
                )])
                .with_result(kind))
            }
            ActionParameters::EveningRoutine {
                duration_minutes, ..
            } => {
                Ok(ExecutionReport::executed(vec![self.activity(
                    agent,
                    event,
                    &format!("winds down for the evening ({duration_minutes} min)"),
                )])
                .with_result(kind))
            }
            ActionParameters::Sleep { duration_hours, .. } => Ok(ExecutionReport::executed(vec![
                self.activity(agent, event, &format!("goes to sleep for {duration_hours} hours")),
            ])
            .with_result(kind)),
            ActionParameters::DirectMessage {
                channel,
                recipient,
                body,
                ..
            } => Ok(self
                .direct_message(agent, event, channel, recipient, body.as_deref())
                .with_result(kind)),
            ActionParameters::Generic { .. } => Err(ExecutorError::Rejected {
                reason: format!("no script for action {}", event.action_name),
            }),
        }
    }
}

/// Conversation runner that always gets a reply: two turns when the
/// opening message has a body, one otherwise.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConversations {
    names: BTreeMap<AgentId, String>,
}

impl ScriptedConversations {
    /// A runner using `names` as display names in summaries.
    pub const fn new(names: BTreeMap<AgentId, String>) -> Self {
        Self { names }
    }
}

impl ConversationRunner for ScriptedConversations {
    fn run_conversation(
        &mut self,
        sender: &AgentSnapshot,
        recipient: &AgentSnapshot,
        channel: &str,
        opening: Option<&str>,
    ) -> Result<Option<Conversation>, ExecutorError> {
        let name = |id: &AgentId| {
            self.names
                .get(id)
                .cloned()
                .unwrap_or_else(|| id.as_str().to_owned())
        };
        let turns = if opening.is_some() { 2 } else { 1 };
        let (sender_name, recipient_name) = (name(&sender.agent_id), name(&recipient.agent_id));
        Ok(Some(Conversation {
            summary: format!("{sender_name} and {recipient_name} talk on {channel}"),
            turns,
            mentions: BTreeMap::from([
                (sender_name, sender.agent_id.clone()),
                (recipient_name, recipient.agent_id.clone()),
            ]),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;
    use chrono::TimeDelta;
    use worldsim_core::{
        ConversationTrigger, SimulationClock, SimulationContext, TickScheduler, TickWindow,
    };
    use worldsim_types::SimulationId;
    use worldsim_world::{FirmLedger, WorldState};

    use super::*;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn world() -> WorldState {
        WorldState::builder()
            .place("home")
            .place("park")
            .agent(AgentId::new("ada"), "home")
            .agent(AgentId::new("bo"), "home")
            .firm(
                FirmLedger::new(FirmId::new("grocer"))
                    .with_product("MILK_GAL", 2, dec!(4.50), dec!(2.10))
                    .with_product("EGGS", 5, dec!(3.00), dec!(1.00)),
            )
            .build()
            .unwrap()
    }

    fn executor() -> ScriptedExecutor {
        ScriptedExecutor::new(
            BTreeMap::from([(AgentId::new("ada"), "Ada Park".to_owned())]),
            vec!["USA".to_owned()],
        )
    }

    fn run(world: &WorldState, action: ActionParameters) -> Result<ExecutionReport, ExecutorError> {
        let ctx = ExecutionContext {
            world,
            window: TickWindow {
                start: noon(),
                end: noon(),
            },
            environment: "town",
        };
        let agent = world.agent_snapshot(&AgentId::new("ada")).unwrap();
        let event = ScheduledEvent {
            due_time: noon(),
            agent_id: AgentId::new("ada"),
            action_name: "Action".to_owned(),
            action,
            location: "home".to_owned(),
            priority: 0,
        };
        executor().execute(&ctx, &agent, &event)
    }

    #[test]
    fn travel_to_known_place_emits_agent_moved() {
        let report = run(
            &world(),
            ActionParameters::Travel {
                to: PlaceId::new("park"),
                extra: BTreeMap::new(),
            },
        )
        .unwrap();
        let draft = report.events.first().unwrap();
        assert_eq!(draft.event_type, EventType::AgentMoved);
        assert_eq!(draft.content, "Ada Park travels from home to park");
        assert_eq!(draft.mentions.get("Ada Park"), Some(&AgentId::new("ada")));
        assert_eq!(draft.location, vec!["USA".to_owned(), "park".to_owned()]);
    }

    #[test]
    fn travel_to_unknown_place_is_rejected() {
        let err = run(
            &world(),
            ActionParameters::Travel {
                to: PlaceId::new("moon"),
                extra: BTreeMap::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected { .. }));
    }

    #[test]
    fn exchange_places_and_fulfils_an_order() {
        let report = run(
            &world(),
            ActionParameters::Exchange {
                counterparty: FirmId::new("grocer"),
                receive: BTreeMap::from([("MILK_GAL".to_owned(), 2), ("EGGS".to_owned(), 1)]),
                extra: BTreeMap::new(),
            },
        )
        .unwrap();
        assert!(report.executed);
        let kinds: Vec<_> = report.events.iter().map(|d| d.event_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![EventType::RetailOrderPlaced, EventType::RetailOrderFulfilled]
        );
        let placed = report.events.first().unwrap();
        assert_eq!(placed.metadata.get("order_id"), Some(&json!("O1")));
        assert_eq!(
            report.result,
            Some(json!({ "order_id": "O1", "total": dec!(12.00) }))
        );
    }

    #[test]
    fn exchange_without_stock_fails() {
        let report = run(
            &world(),
            ActionParameters::Exchange {
                counterparty: FirmId::new("grocer"),
                receive: BTreeMap::from([("MILK_GAL".to_owned(), 3)]),
                extra: BTreeMap::new(),
            },
        )
        .unwrap();
        assert!(!report.executed);
        assert_eq!(report.error.as_deref(), Some("grocer is out of MILK_GAL"));
    }

    #[test]
    fn exchange_with_unknown_firm_is_rejected() {
        let err = run(
            &world(),
            ActionParameters::Exchange {
                counterparty: FirmId::new("bakery"),
                receive: BTreeMap::new(),
                extra: BTreeMap::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "action rejected: unknown firm bakery");
    }

    #[test]
    fn direct_message_mentions_both_agents() {
        let report = run(
            &world(),
            ActionParameters::DirectMessage {
                channel: "phone".to_owned(),
                recipient: AgentId::new("bo"),
                body: Some("lunch?".to_owned()),
                extra: BTreeMap::new(),
            },
        )
        .unwrap();
        let draft = report.events.first().unwrap();
        assert_eq!(draft.event_type, EventType::Message);
        assert_eq!(draft.target, Some(AgentId::new("bo")));
        assert_eq!(draft.content, "Ada Park messages bo on phone: lunch?");
        assert_eq!(draft.mentions.len(), 2);
    }

    #[test]
    fn generic_actions_are_rejected() {
        let err = run(
            &world(),
            ActionParameters::Generic {
                params: BTreeMap::new(),
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "action rejected: no script for action Action");
    }

    #[test]
    fn conversations_take_two_turns_with_an_opening() {
        let world = world();
        let ada = world.agent_snapshot(&AgentId::new("ada")).unwrap();
        let bo = world.agent_snapshot(&AgentId::new("bo")).unwrap();
        let mut runner = ScriptedConversations::default();
        let talk = runner
            .run_conversation(&ada, &bo, "phone", Some("hi"))
            .unwrap()
            .unwrap();
        assert_eq!(talk.turns, 2);
        assert_eq!(talk.summary, "ada and bo talk on phone");
        assert_eq!(talk.mentions.get("bo"), Some(&AgentId::new("bo")));
    }

    #[test]
    fn logged_conversations_never_show_display_names() {
        let names = BTreeMap::from([
            (AgentId::new("ada"), "Ada Park".to_owned()),
            (AgentId::new("bo"), "Bo Chen".to_owned()),
        ]);
        let clock = SimulationClock::new(noon(), TimeDelta::minutes(15), None);
        let mut scheduler = TickScheduler::new(SimulationContext::new(
            SimulationId::new("sim"),
            clock,
            world(),
            "town",
        ));
        scheduler.add_hook(Box::new(ConversationTrigger::new(
            ScriptedConversations::new(names.clone()),
        )));
        scheduler.schedule(ScheduledEvent {
            due_time: noon(),
            agent_id: AgentId::new("ada"),
            action_name: "dm_on_phone".to_owned(),
            action: ActionParameters::DirectMessage {
                channel: "phone".to_owned(),
                recipient: AgentId::new("bo"),
                body: Some("lunch?".to_owned()),
                extra: BTreeMap::new(),
            },
            location: "home".to_owned(),
            priority: 0,
        });

        let mut executor = ScriptedExecutor::new(names, vec!["USA".to_owned()]);
        let report = scheduler.dispatch_current_tick(&mut executor);
        assert_eq!(report.executed.len(), 1);

        let logged = scheduler.context().events().pending();
        assert_eq!(logged.len(), 2);
        for event in logged {
            assert!(!event.content.contains("Ada Park"), "{}", event.content);
            assert!(!event.content.contains("Bo Chen"), "{}", event.content);
        }
        let talk = logged
            .iter()
            .find(|e| e.event_type == EventType::Interaction)
            .unwrap();
        assert_eq!(
            talk.content,
            "agent 1 talked with agent 2 on phone: agent 1 and agent 2 talk on phone"
        );
    }
}
