//! Typed event payloads.
//!
//! Reducers read an event's open `metadata` map through these structs.
//! Producers (executors, hooks) build metadata from the same structs with
//! [`to_metadata`], so both sides agree on field names.
//!
//! A payload that does not decode is not an error: the reducer logs it at
//! debug level and leaves the world untouched.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use worldsim_types::{AgentId, Event, FirmId, OrderId, PlaceId, ScheduledTask};

use crate::ledger::OrderLine;

/// Metadata of an `agent_moved` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMoved {
    /// The agent that moved.
    pub agent_id: AgentId,
    /// Where it is now.
    pub new_place_id: PlaceId,
    /// Where it came from, if known.
    #[serde(default)]
    pub from_place_id: Option<PlaceId>,
}

/// Metadata of a `task_scheduled` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskScheduled {
    /// Whose schedule gains the task.
    pub agent_id: AgentId,
    /// The task.
    pub task: ScheduledTask,
}

/// Metadata of an `interaction` event describing a trip. The traveller is
/// the event's `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelInteraction {
    /// Always `"Travel"`.
    pub action: String,
    /// Destination.
    pub to: PlaceId,
}

/// Metadata of a `retail_order_placed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The selling firm.
    pub firm_id: FirmId,
    /// Firm-scoped order id.
    pub order_id: OrderId,
    /// The buyer.
    #[serde(default)]
    pub customer: Option<AgentId>,
    /// Ordered lines.
    #[serde(default)]
    pub items: Vec<OrderLine>,
    /// Amount paid at the counter.
    #[serde(default)]
    pub total_price: Decimal,
}

/// Metadata of a `retail_order_fulfilled` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilled {
    /// The selling firm.
    pub firm_id: FirmId,
    /// The fulfilled order.
    pub order_id: OrderId,
}

/// Metadata of a `retail_invoice_issued` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    /// The invoicing firm.
    pub firm_id: FirmId,
    /// The invoiced order, if any.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    /// Amount added to receivables.
    #[serde(default)]
    pub ar_amount: Decimal,
}

/// Metadata of a `retail_payment_received` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceived {
    /// The paid firm.
    pub firm_id: FirmId,
    /// The order paid for, if any.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    /// Amount received.
    #[serde(default)]
    pub amount: Decimal,
}

/// Metadata of a `retail_stock_received` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    /// The receiving firm.
    pub firm_id: FirmId,
    /// Delivered SKU.
    pub sku: String,
    /// Delivered units.
    #[serde(default)]
    pub qty: u64,
    /// Unit cost paid to the supplier.
    #[serde(default)]
    pub cost: Decimal,
}

/// Serialize a payload into an event metadata map.
///
/// Anything that does not serialize to a JSON object yields an empty map.
pub fn to_metadata<T: Serialize>(payload: &T) -> BTreeMap<String, Value> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        Ok(_) | Err(_) => BTreeMap::new(),
    }
}

/// Decode an event's metadata into a payload, logging on mismatch.
pub(crate) fn decode<T: DeserializeOwned>(event: &Event) -> Option<T> {
    let object: serde_json::Map<String, Value> = event
        .metadata
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    match serde_json::from_value(Value::Object(object)) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                error = %e,
                "Event payload did not decode, ignoring"
            );
            None
        }
    }
}
