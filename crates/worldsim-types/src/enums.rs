//! Enumeration types for the World Sim engine.

use core::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// The category of a logged [`Event`](crate::Event).
///
/// The set is closed at compile time so reducers can match on it, with an
/// explicit [`EventType::Unrecognized`] variant that carries whatever string
/// an external or legacy producer used. Unrecognized types round-trip through
/// serialization unchanged and are ignored by the reducer registry.
///
/// On the wire every variant is its `snake_case` name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A message between agents (DM, post, note).
    Message,
    /// A change in the environment not caused by an agent.
    EnvironmentalChange,
    /// Agents interacting, or an agent performing a generic action.
    Interaction,
    /// An engine-generated notification (tick summaries, warnings).
    SystemNotification,
    /// An agent moved to a new place.
    AgentMoved,
    /// A task was added to an agent's schedule.
    TaskScheduled,
    /// An object was opened.
    ObjectOpen,
    /// An object was closed.
    ObjectClose,
    /// An object was used.
    ObjectUsed,
    /// A retail customer placed (and paid for) an order.
    RetailOrderPlaced,
    /// A retail order was handed over to the customer.
    RetailOrderFulfilled,
    /// An invoice was issued against an order.
    RetailInvoiceIssued,
    /// A payment was received against accounts receivable.
    RetailPaymentReceived,
    /// A firm received stock from a supplier.
    RetailStockReceived,
    /// Any type this build does not know about.
    Unrecognized(String),
}

impl EventType {
    /// Every known variant, in declaration order.
    pub const KNOWN: [Self; 14] = [
        Self::Message,
        Self::EnvironmentalChange,
        Self::Interaction,
        Self::SystemNotification,
        Self::AgentMoved,
        Self::TaskScheduled,
        Self::ObjectOpen,
        Self::ObjectClose,
        Self::ObjectUsed,
        Self::RetailOrderPlaced,
        Self::RetailOrderFulfilled,
        Self::RetailInvoiceIssued,
        Self::RetailPaymentReceived,
        Self::RetailStockReceived,
    ];

    /// The wire name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::EnvironmentalChange => "environmental_change",
            Self::Interaction => "interaction",
            Self::SystemNotification => "system_notification",
            Self::AgentMoved => "agent_moved",
            Self::TaskScheduled => "task_scheduled",
            Self::ObjectOpen => "object_open",
            Self::ObjectClose => "object_close",
            Self::ObjectUsed => "object_used",
            Self::RetailOrderPlaced => "retail_order_placed",
            Self::RetailOrderFulfilled => "retail_order_fulfilled",
            Self::RetailInvoiceIssued => "retail_invoice_issued",
            Self::RetailPaymentReceived => "retail_payment_received",
            Self::RetailStockReceived => "retail_stock_received",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Parse a wire name. Never fails: unknown names become
    /// [`EventType::Unrecognized`].
    pub fn parse(raw: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str() == raw)
            .cloned()
            .unwrap_or_else(|| Self::Unrecognized(raw.to_owned()))
    }

    /// Whether this is a type the current build understands.
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for EventType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Unrecognized(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch outcomes
// ---------------------------------------------------------------------------

/// How a [`ScheduledEvent`](crate::ScheduledEvent) was resolved.
///
/// Every scheduled event is resolved exactly once and then leaves the
/// pending set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OutcomeStatus {
    /// The executor carried the action out.
    Executed,
    /// The agent could not be resolved or the executor reported failure.
    Failed,
    /// The clock moved past the event's due time before it was dispatched.
    Missed,
}

impl OutcomeStatus {
    /// Lower-case label used in logs and database rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Missed => "missed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
