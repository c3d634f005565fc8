//! `PostgreSQL` persistence for World Sim runs.
//!
//! The engine keeps its world and event log in memory and streams every
//! tick's results here:
//!
//! ```text
//! Tick dispatched
//!     |
//!     +-- ClockStore    (one row per run, upserted)
//!     +-- EventStore    (append-only event log)
//!     +-- OutcomeStore  (one row per resolved scheduled event)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- connection pool, configuration and migrations
//! - [`event_store`] -- batch event insertion and querying
//! - [`outcome_store`] -- batch outcome insertion and querying
//! - [`clock_store`] -- clock save and resume
//! - [`error`] -- shared error types

pub mod clock_store;
pub mod error;
pub mod event_store;
pub mod outcome_store;
pub mod postgres;

pub use clock_store::{ClockStore, SimulationRow};
pub use error::DbError;
pub use event_store::{EventRow, EventStore};
pub use outcome_store::{OutcomeRow, OutcomeStore};
pub use postgres::{PostgresConfig, PostgresPool};
