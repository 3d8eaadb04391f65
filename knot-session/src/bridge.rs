//! Event bridge — the producer side of the dispatch queue.
//!
//! These methods run inside the native core's poll loop, on its thread.
//! Contract with the core: payload slices are valid only for the duration
//! of the call and must be copied; the call must return normally no
//! matter what (no error, no panic, no unbounded blocking); and nothing
//! here may call back into the core.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::{
    ConnectionStatus, InboundEvent, MAX_FRIEND_REQUEST_LENGTH, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH,
    MAX_PACKET_SIZE, MAX_STATUS_MESSAGE_LENGTH, MessageKind, PeerId, PublicKey, UserStatus,
};
use crate::queue::DispatchQueue;

/// Translates native notifications into owned [`InboundEvent`] values and
/// enqueues them. Invalid payloads are counted and discarded here, before
/// they can reach the queue.
pub struct EventBridge {
    queue: Arc<DispatchQueue>,
    malformed: AtomicU64,
}

impl EventBridge {
    pub fn new(queue: Arc<DispatchQueue>) -> Self {
        Self {
            queue,
            malformed: AtomicU64::new(0),
        }
    }

    pub fn on_self_connection_status(&self, status: ConnectionStatus) {
        self.push(InboundEvent::ConnectionStatusChanged { status });
    }

    pub fn on_friend_request(&self, public_key: &[u8], message: &[u8]) {
        let Some(public_key) = PublicKey::from_bytes(public_key) else {
            self.reject_payload("friend request public key");
            return;
        };
        let Some(message) = self.text(message, MAX_FRIEND_REQUEST_LENGTH, "friend request") else {
            return;
        };
        self.push(InboundEvent::FriendRequest {
            public_key,
            message,
        });
    }

    pub fn on_friend_name(&self, peer: PeerId, name: &[u8]) {
        let Some(name) = self.text(name, MAX_NAME_LENGTH, "display name") else {
            return;
        };
        self.push(InboundEvent::NameChanged { peer, name });
    }

    pub fn on_friend_status_message(&self, peer: PeerId, message: &[u8]) {
        let Some(message) = self.text(message, MAX_STATUS_MESSAGE_LENGTH, "status message") else {
            return;
        };
        self.push(InboundEvent::StatusMessageChanged { peer, message });
    }

    pub fn on_friend_status(&self, peer: PeerId, status: UserStatus) {
        self.push(InboundEvent::UserStatusChanged { peer, status });
    }

    pub fn on_friend_connection_status(&self, peer: PeerId, status: ConnectionStatus) {
        self.push(InboundEvent::PeerConnectionChanged { peer, status });
    }

    pub fn on_friend_message(&self, peer: PeerId, kind: MessageKind, message: &[u8]) {
        let Some(text) = self.text(message, MAX_MESSAGE_LENGTH, "chat message") else {
            return;
        };
        self.push(InboundEvent::MessageReceived { peer, kind, text });
    }

    pub fn on_friend_lossless_packet(&self, peer: PeerId, data: &[u8]) {
        if data.len() > MAX_PACKET_SIZE {
            self.reject_payload("lossless packet");
            return;
        }
        self.push(InboundEvent::LosslessPacket {
            peer,
            data: data.to_vec(),
        });
    }

    /// Count a payload that failed validation before it became an event.
    /// Also used by FFI glue when a raw enum discriminant doesn't map.
    pub fn reject_payload(&self, what: &'static str) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(what, "discarded malformed payload from core");
    }

    /// Payloads discarded by validation so far.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Events evicted by the queue-full policy so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Copy `bytes` into an owned string, enforcing the length limit and
    /// UTF-8. `None` means the payload was rejected and counted.
    fn text(&self, bytes: &[u8], max: usize, what: &'static str) -> Option<String> {
        if bytes.len() > max {
            self.reject_payload(what);
            return None;
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Some(text.to_owned()),
            Err(_) => {
                self.reject_payload(what);
                None
            }
        }
    }

    fn push(&self, event: InboundEvent) {
        // A closed queue is the only enqueue failure; shutdown is already
        // in progress, so the event is silently dropped.
        if self.queue.enqueue(event).is_err() {
            tracing::debug!("event arrived during shutdown, dropped");
        }
    }
}
