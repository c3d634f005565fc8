//! World state and reducers for the World Sim engine.
//!
//! The world is the minimal queryable state that agent cognition, firm
//! accounting and the scheduler read from: who is where, what is on each
//! agent's schedule and what each firm's ledger looks like. It changes only
//! by applying logged events through the [`ReducerRegistry`].
//!
//! # Modules
//!
//! - [`state`] -- [`WorldState`] with arena handles and its builder.
//! - [`ledger`] -- Per-firm ledger shard with checked money arithmetic.
//! - [`registry`] -- Event-type keyed reducer registry.
//! - [`payload`] -- Typed views of event metadata shared with producers.
//! - [`environmental`] -- Movement, schedule and object reducers.
//! - [`firm`] -- Retail order, invoice, payment and stock reducers.
//! - [`error`] -- Setup and ledger errors.

pub mod environmental;
pub mod error;
pub mod firm;
pub mod ledger;
pub mod payload;
pub mod registry;
pub mod state;

// Re-export primary types at crate root.
pub use error::WorldError;
pub use ledger::{FirmLedger, Order, OrderLine, OrderStatus};
pub use registry::{Reducer, ReducerRegistry, Reduction};
pub use state::{AgentHandle, AgentSnapshot, FirmHandle, WorldState, WorldStateBuilder};
