//! Event log for the World Sim engine.
//!
//! Every state change is first written here as an immutable [`Event`] and
//! only then applied to the world state by the reducers. Each environment
//! owns one [`EventQueue`]; events are never deleted, only moved from the
//! pending to the processed partition as agents consume them.
//!
//! Agents are never named directly in logged content. The
//! [`AgentNumberManager`] hands out stable `"agent N"` tokens and every
//! event carries the token-to-id mapping it uses.
//!
//! # Modules
//!
//! - [`error`] -- Validation errors raised on append.
//! - [`numbering`] -- Stable anonymized agent tokens.
//! - [`queue`] -- The pending/processed event queue.
//!
//! [`Event`]: worldsim_types::Event

pub mod error;
pub mod numbering;
pub mod queue;

pub use error::EventLogError;
pub use numbering::{AgentNumberManager, Anonymized};
pub use queue::{EventQueue, QueueStats};
