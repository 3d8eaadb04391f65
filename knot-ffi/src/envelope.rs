//! Versioned wrapper around [`InboundEvent`] for the JSON callback.

use knot_session::InboundEvent;
use serde::Serialize;

/// Envelope wrapping every event emitted to the embedder's callback.
///
/// `seq` increases by one per delivered event for a given handle, so the
/// consumer can detect losses in its own plumbing; `dropped_events` is
/// the cumulative queue-full eviction count at emission time.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub dropped_events: u64,
    pub event: InboundEvent,
}

impl EventEnvelope {
    pub fn new(seq: u64, dropped_events: u64, event: InboundEvent) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            dropped_events,
            event,
        }
    }
}
