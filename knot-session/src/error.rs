//! Error taxonomy for the session layer.
//!
//! Everything here is recoverable. Nothing may unwind or propagate back
//! into a native callback context — the core has no error contract for
//! its callbacks, so the bridge swallows these, counts them, and logs.

use thiserror::Error;

use crate::event::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The dispatch queue is at capacity. The bridge's enqueue path
    /// resolves this itself by dropping the oldest event for the peer;
    /// only the non-evicting `try_enqueue` returns it.
    #[error("dispatch queue is full")]
    QueueFull,

    /// No live registry entry for the peer (never added, or tombstoned).
    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    /// Shutdown has begun; enqueues and outbound calls are rejected.
    #[error("session is shutting down")]
    ShuttingDown,

    /// A payload from the core failed validation and was discarded.
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),
}
