//! Error types for the `worldsim-world` crate.
//!
//! Only setup and individual ledger mutations can fail. Reducers catch
//! these, log them and leave the state unchanged.

use worldsim_types::{AgentId, FirmId};

/// Errors raised while building or mutating world state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The same agent was registered twice.
    #[error("agent {0} registered twice")]
    DuplicateAgent(AgentId),

    /// The same firm was registered twice.
    #[error("firm {0} registered twice")]
    DuplicateFirm(FirmId),

    /// More entities than an arena handle can address.
    #[error("arena full: cannot register more than u32::MAX entities")]
    ArenaFull,

    /// A ledger amount left the representable range.
    #[error("ledger overflow for firm {firm} on {field}")]
    LedgerOverflow {
        /// The firm whose ledger would overflow.
        firm: FirmId,
        /// The ledger field that would overflow.
        field: &'static str,
    },
}
