//! Reducers for retail firm events.
//!
//! Each reducer touches exactly one firm ledger. Events for firms that were
//! not registered at setup, or whose ledger update would overflow, are
//! logged and dropped.

use tracing::{debug, warn};
use worldsim_types::{Event, EventType, FirmId};

use crate::error::WorldError;
use crate::ledger::{FirmLedger, Order, OrderStatus};
use crate::payload::{
    InvoiceIssued, OrderFulfilled, OrderPlaced, PaymentReceived, StockReceived, decode,
};
use crate::registry::ReducerRegistry;
use crate::state::WorldState;

/// Register the retail firm reducers.
pub fn register(registry: &mut ReducerRegistry) {
    registry.register(EventType::RetailOrderPlaced, apply_order_placed);
    registry.register(EventType::RetailOrderFulfilled, apply_order_fulfilled);
    registry.register(EventType::RetailInvoiceIssued, apply_invoice_issued);
    registry.register(EventType::RetailPaymentReceived, apply_payment_received);
    registry.register(EventType::RetailStockReceived, apply_stock_received);
}

fn ledger<'a>(world: &'a mut WorldState, firm_id: &FirmId) -> Option<&'a mut FirmLedger> {
    let ledger = world.firm_mut(firm_id);
    if ledger.is_none() {
        debug!(firm_id = %firm_id, "Firm event for unknown firm, ignoring");
    }
    ledger
}

fn report(event: &Event, result: Result<(), WorldError>) {
    if let Err(e) = result {
        warn!(event_id = %event.event_id, error = %e, "Firm event dropped");
    }
}

fn apply_order_placed(world: &mut WorldState, event: &Event) {
    let Some(placed) = decode::<OrderPlaced>(event) else {
        return;
    };
    let Some(firm) = ledger(world, &placed.firm_id) else {
        return;
    };
    let order = Order {
        order_id: placed.order_id,
        customer: placed.customer.or_else(|| event.source.clone()),
        items: placed.items,
        total_price: placed.total_price,
        status: OrderStatus::Placed,
        placed_at: event.timestamp,
    };
    let order_id = order.order_id.clone();
    match firm.record_order(order) {
        Ok(true) => {}
        Ok(false) => {
            debug!(firm_id = %placed.firm_id, order_id = %order_id, "Duplicate order ignored");
        }
        Err(e) => report(event, Err(e)),
    }
}

fn apply_order_fulfilled(world: &mut WorldState, event: &Event) {
    let Some(fulfilled) = decode::<OrderFulfilled>(event) else {
        return;
    };
    if let Some(firm) = ledger(world, &fulfilled.firm_id) {
        firm.fulfil_order(&fulfilled.order_id);
    }
}

fn apply_invoice_issued(world: &mut WorldState, event: &Event) {
    let Some(invoice) = decode::<InvoiceIssued>(event) else {
        return;
    };
    if let Some(firm) = ledger(world, &invoice.firm_id) {
        let result = firm.issue_invoice(invoice.order_id.as_ref(), invoice.ar_amount);
        report(event, result);
    }
}

fn apply_payment_received(world: &mut WorldState, event: &Event) {
    let Some(payment) = decode::<PaymentReceived>(event) else {
        return;
    };
    if let Some(firm) = ledger(world, &payment.firm_id) {
        let result = firm.receive_payment(payment.order_id.as_ref(), payment.amount);
        report(event, result);
    }
}

fn apply_stock_received(world: &mut WorldState, event: &Event) {
    let Some(delivery) = decode::<StockReceived>(event) else {
        return;
    };
    if let Some(firm) = ledger(world, &delivery.firm_id) {
        let result = firm.receive_stock(&delivery.sku, delivery.qty, delivery.cost);
        report(event, result);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use worldsim_types::{AgentId, EventId, OrderId};

    use super::*;

    fn event(event_type: EventType, metadata: serde_json::Value) -> Event {
        Event {
            event_id: EventId(0),
            event_type,
            content: "retail".to_owned(),
            environment: "town".to_owned(),
            source: Some(AgentId::new("a1")),
            target: None,
            participants: Vec::new(),
            timestamp: NaiveDate::from_ymd_opt(2024, 6, 3)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap(),
            location: Vec::new(),
            metadata: serde_json::from_value(metadata).unwrap(),
            agent_number_mapping: BTreeMap::new(),
        }
    }

    fn setup() -> (ReducerRegistry, WorldState, FirmId) {
        let firm_id = FirmId::new("grocer");
        let world = WorldState::builder()
            .agent(AgentId::new("a1"), "home")
            .firm(
                FirmLedger::new(firm_id.clone())
                    .with_product("MILK_GAL", 10, dec!(4.50), dec!(3.00))
                    .with_cash(dec!(100)),
            )
            .build()
            .unwrap();
        (ReducerRegistry::with_defaults(), world, firm_id)
    }

    fn place(registry: &ReducerRegistry, world: &mut WorldState, order_id: &str) {
        registry.apply(
            world,
            &event(
                EventType::RetailOrderPlaced,
                json!({
                    "firm_id": "grocer",
                    "order_id": order_id,
                    "items": [{"sku": "MILK_GAL", "qty": 2}],
                    "total_price": "9.00"
                }),
            ),
        );
    }

    #[test]
    fn order_placed_records_order_and_cash() {
        let (registry, mut world, firm) = setup();
        place(&registry, &mut world, "O1");
        assert_eq!(world.firm_cash(&firm), dec!(109.00));
        assert_eq!(world.firm_inventory(&firm, "MILK_GAL"), 8);
        let order = world.firm_order(&firm, &OrderId::new("O1")).unwrap();
        assert_eq!(order.customer, Some(AgentId::new("a1")));
        assert_eq!(world.peek_next_order_id(&firm).unwrap().as_str(), "O2");
    }

    #[test]
    fn duplicate_order_placed_is_ignored() {
        let (registry, mut world, firm) = setup();
        place(&registry, &mut world, "O1");
        place(&registry, &mut world, "O1");
        assert_eq!(world.firm_cash(&firm), dec!(109.00));
        assert_eq!(world.firm_inventory(&firm, "MILK_GAL"), 8);
    }

    #[test]
    fn order_lifecycle_statuses() {
        let (registry, mut world, firm) = setup();
        place(&registry, &mut world, "O1");
        registry.apply(
            &mut world,
            &event(
                EventType::RetailOrderFulfilled,
                json!({"firm_id": "grocer", "order_id": "O1"}),
            ),
        );
        let id = OrderId::new("O1");
        assert_eq!(
            world.firm_order(&firm, &id).unwrap().status,
            OrderStatus::Fulfilled
        );
        registry.apply(
            &mut world,
            &event(
                EventType::RetailInvoiceIssued,
                json!({"firm_id": "grocer", "order_id": "O1", "ar_amount": 30}),
            ),
        );
        assert_eq!(world.firm_ar(&firm), dec!(30));
        registry.apply(
            &mut world,
            &event(
                EventType::RetailPaymentReceived,
                json!({"firm_id": "grocer", "order_id": "O1", "amount": 12}),
            ),
        );
        assert_eq!(world.firm_ar(&firm), dec!(18));
        assert_eq!(
            world.firm_order(&firm, &id).unwrap().status,
            OrderStatus::Paid
        );
    }

    #[test]
    fn payment_floors_receivables_at_zero() {
        let (registry, mut world, firm) = setup();
        registry.apply(
            &mut world,
            &event(
                EventType::RetailPaymentReceived,
                json!({"firm_id": "grocer", "amount": 50}),
            ),
        );
        assert_eq!(world.firm_ar(&firm), Decimal::ZERO);
    }

    #[test]
    fn stock_received_adds_inventory_and_spends_cash() {
        let (registry, mut world, firm) = setup();
        registry.apply(
            &mut world,
            &event(
                EventType::RetailStockReceived,
                json!({"firm_id": "grocer", "sku": "MILK_GAL", "qty": 5, "cost": "3.00"}),
            ),
        );
        assert_eq!(world.firm_inventory(&firm, "MILK_GAL"), 15);
        assert_eq!(world.firm_cash(&firm), dec!(85.00));
    }

    #[test]
    fn unknown_firm_and_bad_payloads_are_noops() {
        let (registry, mut world, _) = setup();
        let before = world.clone();
        registry.apply(
            &mut world,
            &event(
                EventType::RetailStockReceived,
                json!({"firm_id": "nobody", "sku": "X", "qty": 1}),
            ),
        );
        registry.apply(
            &mut world,
            &event(EventType::RetailOrderPlaced, json!({"order_id": "O1"})),
        );
        assert_eq!(world, before);
    }
}
