//! Type-safe identifier wrappers.
//!
//! Agents, firms and places are identified by opaque strings supplied by
//! the data loaders (voter file ids, firm registry numbers, map ids). Log
//! records and scheduled entries are identified by sequence numbers minted
//! inside the engine. Both families get their own newtype so identifiers
//! cannot be mixed up at compile time.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around an externally supplied string id.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

/// Generates a newtype wrapper around an engine-minted sequence number.
macro_rules! define_seq_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u64);

        impl $name {
            /// Return the raw sequence number.
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id! {
    /// Identifier of a simulated person.
    AgentId
}

define_id! {
    /// Identifier of a firm (store, employer, supplier).
    FirmId
}

define_id! {
    /// Identifier of a place an agent can occupy (`"home"`, a POI id, ...).
    PlaceId
}

define_id! {
    /// Identifier of one simulation run. Persistence rows are keyed by it.
    SimulationId
}

define_id! {
    /// Firm-scoped order identifier (`"O1"`, `"O2"`, ...). Unique within a
    /// firm, not across firms.
    OrderId
}

define_seq_id! {
    /// Position of an [`Event`](crate::Event) in its queue's creation order.
    EventId
}

define_seq_id! {
    /// Handle of a pending [`ScheduledEvent`](crate::ScheduledEvent) inside
    /// the scheduler.
    ScheduledEventId
}

impl SimulationId {
    /// Mint a fresh, time-ordered simulation id (UUID v7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl OrderId {
    /// Build the order id for sequence number `seq` (`O{seq}`).
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("O{seq}"))
    }

    /// Recover the sequence number from an id minted by [`OrderId::from_seq`].
    pub fn seq(&self) -> Option<u64> {
        self.0.strip_prefix('O').and_then(|n| n.parse().ok())
    }
}
