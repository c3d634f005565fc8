//! Error types for the `worldsim-events` crate.

/// Reasons an event is rejected by [`EventQueue::append`].
///
/// A rejected event is not logged and does not consume an id.
///
/// [`EventQueue::append`]: crate::EventQueue::append
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventLogError {
    /// The event names a different environment than the queue.
    #[error("event environment '{event}' does not match queue environment '{queue}'")]
    EnvironmentMismatch {
        /// Environment the event was addressed to.
        event: String,
        /// Environment of the receiving queue.
        queue: String,
    },

    /// The event type is blank.
    #[error("event type cannot be empty")]
    EmptyEventType,

    /// The event content is blank.
    #[error("event content cannot be empty")]
    EmptyContent,

    /// The queue has handed out every representable id.
    #[error("event id space exhausted")]
    IdsExhausted,
}
