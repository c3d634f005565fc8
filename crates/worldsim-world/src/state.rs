//! The queryable world state.
//!
//! [`WorldState`] holds three shards: agent positions, agent schedules and
//! firm ledgers. Agents and firms live in arenas addressed by stable
//! [`AgentHandle`]s and [`FirmHandle`]s handed out by [`WorldStateBuilder`]
//! at setup. Once the run starts, the state is owned by the simulation
//! context and only the reducer registry gets `&mut` access to it; every
//! other collaborator reads through `&WorldState`.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use worldsim_types::{AgentId, FirmId, OrderId, PlaceId, ScheduledTask};

use crate::error::WorldError;
use crate::ledger::{FirmLedger, Order};

/// Stable index of an agent in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentHandle(u32);

/// Stable index of a firm in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmHandle(u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AgentRecord {
    agent_id: AgentId,
    position: Option<PlaceId>,
    schedule: Vec<ScheduledTask>,
}

/// Read-only copy of everything the world knows about one agent.
///
/// This is what executors receive alongside the scheduled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// The agent.
    pub agent_id: AgentId,
    /// Arena handle of the agent.
    pub handle: AgentHandle,
    /// Current place, if known.
    pub position: Option<PlaceId>,
    /// Tasks on the agent's schedule, in insertion order.
    pub schedule: Vec<ScheduledTask>,
}

/// Minimal queryable world: positions, schedules and firm ledgers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    agents: Vec<AgentRecord>,
    agent_index: BTreeMap<AgentId, AgentHandle>,
    firms: Vec<FirmLedger>,
    firm_index: BTreeMap<FirmId, FirmHandle>,
    places: BTreeSet<PlaceId>,
}

impl WorldState {
    /// Start building a world.
    pub fn builder() -> WorldStateBuilder {
        WorldStateBuilder::default()
    }

    // -- resolution ---------------------------------------------------------

    /// Resolve an agent id to its arena handle.
    pub fn agent_handle(&self, agent_id: &AgentId) -> Option<AgentHandle> {
        self.agent_index.get(agent_id).copied()
    }

    /// Resolve a firm id to its arena handle.
    pub fn firm_handle(&self, firm_id: &FirmId) -> Option<FirmHandle> {
        self.firm_index.get(firm_id).copied()
    }

    /// Whether the agent was registered at setup.
    pub fn agent_exists(&self, agent_id: &AgentId) -> bool {
        self.agent_index.contains_key(agent_id)
    }

    /// Whether the firm was registered at setup.
    pub fn firm_exists(&self, firm_id: &FirmId) -> bool {
        self.firm_index.contains_key(firm_id)
    }

    /// Whether `place_id` is a known place. A world registered without any
    /// places accepts every place.
    pub fn place_exists(&self, place_id: &PlaceId) -> bool {
        self.places.is_empty() || self.places.contains(place_id)
    }

    /// Number of registered agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Number of registered firms.
    pub fn firm_count(&self) -> usize {
        self.firms.len()
    }

    /// Registered agent ids in handle order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.iter().map(|record| &record.agent_id)
    }

    // -- agent shard --------------------------------------------------------

    fn agent(&self, agent_id: &AgentId) -> Option<&AgentRecord> {
        self.agent_handle(agent_id)
            .and_then(|handle| self.agents.get(slot(handle.0)))
    }

    fn agent_mut(&mut self, agent_id: &AgentId) -> Option<&mut AgentRecord> {
        let handle = self.agent_handle(agent_id)?;
        self.agents.get_mut(slot(handle.0))
    }

    /// Current place of an agent.
    pub fn agent_position(&self, agent_id: &AgentId) -> Option<&PlaceId> {
        self.agent(agent_id).and_then(|record| record.position.as_ref())
    }

    /// An agent's scheduled tasks. Empty for unknown agents.
    pub fn agent_schedule(&self, agent_id: &AgentId) -> &[ScheduledTask] {
        self.agent(agent_id)
            .map_or(&[], |record| record.schedule.as_slice())
    }

    /// A read-only copy of an agent's shard entries.
    pub fn agent_snapshot(&self, agent_id: &AgentId) -> Option<AgentSnapshot> {
        let handle = self.agent_handle(agent_id)?;
        let record = self.agents.get(slot(handle.0))?;
        Some(AgentSnapshot {
            agent_id: record.agent_id.clone(),
            handle,
            position: record.position.clone(),
            schedule: record.schedule.clone(),
        })
    }

    /// Move an agent. Returns `false` if the agent is unknown.
    pub fn set_agent_position(&mut self, agent_id: &AgentId, place_id: PlaceId) -> bool {
        self.agent_mut(agent_id).is_some_and(|record| {
            record.position = Some(place_id);
            true
        })
    }

    /// Append a task to an agent's schedule. Returns `false` if the agent is
    /// unknown.
    pub fn add_agent_task(&mut self, agent_id: &AgentId, task: ScheduledTask) -> bool {
        self.agent_mut(agent_id).is_some_and(|record| {
            record.schedule.push(task);
            true
        })
    }

    // -- firm shard ---------------------------------------------------------

    /// The whole ledger of a firm.
    pub fn firm(&self, firm_id: &FirmId) -> Option<&FirmLedger> {
        self.firm_handle(firm_id)
            .and_then(|handle| self.firms.get(slot(handle.0)))
    }

    /// Mutable access to a firm's ledger.
    pub fn firm_mut(&mut self, firm_id: &FirmId) -> Option<&mut FirmLedger> {
        let handle = self.firm_handle(firm_id)?;
        self.firms.get_mut(slot(handle.0))
    }

    /// Units of `sku` a firm has on hand (zero for unknown firms).
    pub fn firm_inventory(&self, firm_id: &FirmId, sku: &str) -> u64 {
        self.firm(firm_id).map_or(0, |firm| firm.inventory(sku))
    }

    /// List price of `sku` at a firm.
    pub fn firm_price(&self, firm_id: &FirmId, sku: &str) -> Decimal {
        self.firm(firm_id)
            .map_or(Decimal::ZERO, |firm| firm.price(sku))
    }

    /// Unit cost of `sku` at a firm.
    pub fn firm_cost(&self, firm_id: &FirmId, sku: &str) -> Decimal {
        self.firm(firm_id)
            .map_or(Decimal::ZERO, |firm| firm.cost(sku))
    }

    /// Cash on hand of a firm.
    pub fn firm_cash(&self, firm_id: &FirmId) -> Decimal {
        self.firm(firm_id).map_or(Decimal::ZERO, FirmLedger::cash)
    }

    /// Accounts receivable of a firm.
    pub fn firm_ar(&self, firm_id: &FirmId) -> Decimal {
        self.firm(firm_id).map_or(Decimal::ZERO, FirmLedger::ar)
    }

    /// Accounts payable of a firm.
    pub fn firm_ap(&self, firm_id: &FirmId) -> Decimal {
        self.firm(firm_id).map_or(Decimal::ZERO, FirmLedger::ap)
    }

    /// Look up an order on a firm's ledger.
    pub fn firm_order(&self, firm_id: &FirmId, order_id: &OrderId) -> Option<&Order> {
        self.firm(firm_id).and_then(|firm| firm.order(order_id))
    }

    /// The id the firm's next order will receive. Does not reserve it; the
    /// sequence moves when the order-placed event is reduced.
    pub fn peek_next_order_id(&self, firm_id: &FirmId) -> Option<OrderId> {
        self.firm(firm_id).map(FirmLedger::peek_next_order_id)
    }
}

/// Arena slot of a handle.
fn slot(index: u32) -> usize {
    usize::try_from(index).unwrap_or(usize::MAX)
}

/// Collects agents, firms and places before the run starts.
#[derive(Debug, Default)]
pub struct WorldStateBuilder {
    agents: Vec<(AgentId, Option<PlaceId>)>,
    firms: Vec<FirmLedger>,
    places: BTreeSet<PlaceId>,
}

impl WorldStateBuilder {
    /// Register an agent with its starting place.
    #[must_use]
    pub fn agent(mut self, agent_id: AgentId, position: impl Into<PlaceId>) -> Self {
        self.agents.push((agent_id, Some(position.into())));
        self
    }

    /// Register an agent whose position is not known yet.
    #[must_use]
    pub fn agent_unplaced(mut self, agent_id: AgentId) -> Self {
        self.agents.push((agent_id, None));
        self
    }

    /// Register a firm with its opening ledger.
    #[must_use]
    pub fn firm(mut self, ledger: FirmLedger) -> Self {
        self.firms.push(ledger);
        self
    }

    /// Register a place. Once any place is registered, only registered
    /// places exist.
    #[must_use]
    pub fn place(mut self, place_id: impl Into<PlaceId>) -> Self {
        self.places.insert(place_id.into());
        self
    }

    /// Freeze the registrations into a [`WorldState`].
    pub fn build(self) -> Result<WorldState, WorldError> {
        let mut world = WorldState {
            places: self.places,
            ..WorldState::default()
        };

        for (agent_id, position) in self.agents {
            if world.agent_index.contains_key(&agent_id) {
                return Err(WorldError::DuplicateAgent(agent_id));
            }
            let handle =
                AgentHandle(u32::try_from(world.agents.len()).ok().ok_or(WorldError::ArenaFull)?);
            world.agent_index.insert(agent_id.clone(), handle);
            world.agents.push(AgentRecord {
                agent_id,
                position,
                schedule: Vec::new(),
            });
        }

        for ledger in self.firms {
            if world.firm_index.contains_key(ledger.firm_id()) {
                return Err(WorldError::DuplicateFirm(ledger.firm_id().clone()));
            }
            let handle =
                FirmHandle(u32::try_from(world.firms.len()).ok().ok_or(WorldError::ArenaFull)?);
            world.firm_index.insert(ledger.firm_id().clone(), handle);
            world.firms.push(ledger);
        }

        Ok(world)
    }
}
