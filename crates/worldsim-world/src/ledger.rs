//! Firm ledger shards.
//!
//! Each firm carries its own small ledger: stock on hand, list prices, unit
//! costs, cash, receivables, payables and the orders it has taken. Money is
//! always [`Decimal`]. Every mutation is checked and all-or-nothing: on
//! overflow the ledger is left exactly as it was.
//!
//! Order ids are minted from a per-firm sequence (`O1`, `O2`, ...). The
//! sequence only moves forward, so an id is never handed out twice by the
//! same firm; ids from different firms may coincide.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use worldsim_types::{AgentId, FirmId, OrderId};

use crate::error::WorldError;

/// Lifecycle of a retail order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed and paid at the counter.
    Placed,
    /// Handed over to the customer.
    Fulfilled,
    /// An invoice has been issued against it.
    Invoiced,
    /// Payment against the invoice was received.
    Paid,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Stock keeping unit.
    pub sku: String,
    /// Quantity ordered.
    #[serde(default)]
    pub qty: u64,
}

/// A retail order recorded on a firm's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Firm-scoped order id.
    pub order_id: OrderId,
    /// The buying agent, if known.
    pub customer: Option<AgentId>,
    /// Ordered lines.
    pub items: Vec<OrderLine>,
    /// Total charged for the order.
    pub total_price: Decimal,
    /// Current status.
    pub status: OrderStatus,
    /// Simulated time the order was placed.
    pub placed_at: NaiveDateTime,
}

/// The ledger shard of one firm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmLedger {
    firm_id: FirmId,
    inventory: BTreeMap<String, u64>,
    prices: BTreeMap<String, Decimal>,
    costs: BTreeMap<String, Decimal>,
    cash: Decimal,
    ar: Decimal,
    ap: Decimal,
    orders: BTreeMap<OrderId, Order>,
    seq: u64,
}

impl FirmLedger {
    /// An empty ledger. The first order id it mints is `O1`.
    pub const fn new(firm_id: FirmId) -> Self {
        Self {
            firm_id,
            inventory: BTreeMap::new(),
            prices: BTreeMap::new(),
            costs: BTreeMap::new(),
            cash: Decimal::ZERO,
            ar: Decimal::ZERO,
            ap: Decimal::ZERO,
            orders: BTreeMap::new(),
            seq: 1,
        }
    }

    /// Seed a product line (setup only).
    #[must_use]
    pub fn with_product(mut self, sku: &str, qty: u64, price: Decimal, cost: Decimal) -> Self {
        self.inventory.insert(sku.to_owned(), qty);
        self.prices.insert(sku.to_owned(), price);
        self.costs.insert(sku.to_owned(), cost);
        self
    }

    /// Seed opening cash (setup only).
    #[must_use]
    pub const fn with_cash(mut self, cash: Decimal) -> Self {
        self.cash = cash;
        self
    }

    /// Seed opening payables (setup only).
    #[must_use]
    pub const fn with_ap(mut self, ap: Decimal) -> Self {
        self.ap = ap;
        self
    }

    // -- reads --------------------------------------------------------------

    /// The firm this ledger belongs to.
    pub const fn firm_id(&self) -> &FirmId {
        &self.firm_id
    }

    /// Units of `sku` on hand (zero if unknown).
    pub fn inventory(&self, sku: &str) -> u64 {
        self.inventory.get(sku).copied().unwrap_or(0)
    }

    /// List price of `sku` (zero if unknown).
    pub fn price(&self, sku: &str) -> Decimal {
        self.prices.get(sku).copied().unwrap_or(Decimal::ZERO)
    }

    /// Unit cost of `sku` (zero if unknown).
    pub fn cost(&self, sku: &str) -> Decimal {
        self.costs.get(sku).copied().unwrap_or(Decimal::ZERO)
    }

    /// Cash on hand.
    pub const fn cash(&self) -> Decimal {
        self.cash
    }

    /// Accounts receivable.
    pub const fn ar(&self) -> Decimal {
        self.ar
    }

    /// Accounts payable.
    pub const fn ap(&self) -> Decimal {
        self.ap
    }

    /// Look up an order.
    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Number of recorded orders.
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// The id the next order will receive, without reserving it.
    pub fn peek_next_order_id(&self) -> OrderId {
        OrderId::from_seq(self.seq)
    }

    /// Current value of the order sequence.
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    // -- mutations ----------------------------------------------------------

    /// Record a paid-at-the-counter order: cash goes up by the total and
    /// stock goes down by each line, floored at zero.
    ///
    /// Returns `Ok(false)` without touching the ledger if the order id is
    /// already taken. The sequence is advanced past the order's number so
    /// the id is never minted again.
    pub fn record_order(&mut self, order: Order) -> Result<bool, WorldError> {
        if self.orders.contains_key(&order.order_id) {
            return Ok(false);
        }
        let cash = self
            .cash
            .checked_add(order.total_price)
            .ok_or_else(|| self.overflow("cash"))?;

        for line in &order.items {
            if let Some(on_hand) = self.inventory.get_mut(&line.sku) {
                *on_hand = on_hand.saturating_sub(line.qty);
            }
        }
        self.cash = cash;
        if let Some(next) = order.order_id.seq().and_then(|n| n.checked_add(1)) {
            self.seq = self.seq.max(next);
        }
        self.orders.insert(order.order_id.clone(), order);
        Ok(true)
    }

    /// Mark an order fulfilled. Returns `false` if the order is unknown.
    pub fn fulfil_order(&mut self, order_id: &OrderId) -> bool {
        self.set_status(order_id, OrderStatus::Fulfilled)
    }

    /// Raise receivables by `amount`, marking the order invoiced if known.
    pub fn issue_invoice(
        &mut self,
        order_id: Option<&OrderId>,
        amount: Decimal,
    ) -> Result<(), WorldError> {
        self.ar = self
            .ar
            .checked_add(amount)
            .ok_or_else(|| self.overflow("ar"))?;
        if let Some(order_id) = order_id {
            self.set_status(order_id, OrderStatus::Invoiced);
        }
        Ok(())
    }

    /// Lower receivables by `amount`, floored at zero, marking the order
    /// paid if known. Cash is not touched: it was collected when the order
    /// was placed.
    pub fn receive_payment(
        &mut self,
        order_id: Option<&OrderId>,
        amount: Decimal,
    ) -> Result<(), WorldError> {
        let remaining = self
            .ar
            .checked_sub(amount)
            .ok_or_else(|| self.overflow("ar"))?;
        self.ar = remaining.max(Decimal::ZERO);
        if let Some(order_id) = order_id {
            self.set_status(order_id, OrderStatus::Paid);
        }
        Ok(())
    }

    /// Book a delivery from a supplier: stock goes up by `qty` and cash goes
    /// down by `unit_cost * qty`.
    pub fn receive_stock(
        &mut self,
        sku: &str,
        qty: u64,
        unit_cost: Decimal,
    ) -> Result<(), WorldError> {
        let on_hand = self
            .inventory(sku)
            .checked_add(qty)
            .ok_or_else(|| self.overflow("inventory"))?;
        let cash = unit_cost
            .checked_mul(Decimal::from(qty))
            .and_then(|spent| self.cash.checked_sub(spent))
            .ok_or_else(|| self.overflow("cash"))?;
        self.inventory.insert(sku.to_owned(), on_hand);
        self.cash = cash;
        Ok(())
    }

    fn set_status(&mut self, order_id: &OrderId, status: OrderStatus) -> bool {
        self.orders.get_mut(order_id).is_some_and(|order| {
            order.status = status;
            true
        })
    }

    fn overflow(&self, field: &'static str) -> WorldError {
        WorldError::LedgerOverflow {
            firm: self.firm_id.clone(),
            field,
        }
    }
}
