//! Shared type definitions for the World Sim engine.
//!
//! This crate is the single source of truth for the records that cross crate
//! boundaries: log events, scheduled actions, dispatch outcomes and the
//! persisted clock. Types flow downstream to `TypeScript` via `ts-rs` for
//! replay and inspection tooling.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for agent, firm, place and sequence ids
//! - [`enums`] -- Event categories and dispatch outcome statuses
//! - [`structs`] -- Events, drafts, scheduled events, outcomes, clock state
//! - [`actions`] -- Typed parameters for scheduled agent actions

pub mod actions;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actions::{ActionParameters, DIRECT_MESSAGE_PREFIX, ParamLimits, ParsedAction};
pub use enums::{EventType, OutcomeStatus};
pub use ids::{AgentId, EventId, FirmId, OrderId, PlaceId, ScheduledEventId, SimulationId};
pub use structs::{
    ClockState, DispatchOutcome, Event, EventDraft, PlanStep, ScheduledEvent, ScheduledTask,
};
