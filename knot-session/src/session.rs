//! Session facade — one typed context tying the layer together.
//!
//! Owns the registry, queue, bridge, and dispatcher, and wraps the
//! outbound surface of the native core behind [`CoreHandle`]. Once
//! shutdown has begun, outbound calls are rejected locally and never
//! reach the core.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bridge::EventBridge;
use crate::dispatch::{Dispatcher, EventHandler};
use crate::error::SessionError;
use crate::event::{
    MAX_FRIEND_REQUEST_LENGTH, MAX_MESSAGE_LENGTH, MAX_PACKET_SIZE, MessageKind, PeerId, PublicKey,
};
use crate::queue::{DEFAULT_QUEUE_CAPACITY, DispatchQueue};
use crate::registry::{PeerSnapshot, SessionRegistry};

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Dispatch queue capacity, in events.
    pub queue_capacity: usize,
    /// How long shutdown waits for in-flight events before forcing the
    /// queue closed.
    pub drain_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_deadline: Duration::from_secs(3),
        }
    }
}

/// Outbound surface of the native core.
///
/// The real implementation lives with the embedder that links the core;
/// this layer only routes calls through it and gates them on shutdown.
pub trait CoreHandle: Send + Sync {
    /// Send a chat message; returns the core-assigned message id.
    fn send_message(&self, peer: PeerId, kind: MessageKind, text: &str)
    -> Result<u32, SessionError>;

    /// Send an application-defined lossless packet.
    fn send_lossless_packet(&self, peer: PeerId, data: &[u8]) -> Result<(), SessionError>;

    /// Send a friend request; returns the peer id the core assigned.
    fn add_peer(&self, public_key: &PublicKey, message: &str) -> Result<PeerId, SessionError>;

    /// Permanently remove a peer.
    fn remove_peer(&self, peer: PeerId) -> Result<(), SessionError>;
}

pub struct Session {
    registry: Arc<SessionRegistry>,
    bridge: Arc<EventBridge>,
    dispatcher: Mutex<Dispatcher>,
    core: Arc<dyn CoreHandle>,
    drain_deadline: Duration,
    shutting_down: AtomicBool,
}

impl Session {
    pub fn new(core: Arc<dyn CoreHandle>, config: SessionConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let queue = Arc::new(DispatchQueue::new(config.queue_capacity));
        let bridge = Arc::new(EventBridge::new(Arc::clone(&queue)));
        let dispatcher = Dispatcher::new(queue, Arc::clone(&registry));
        Self {
            registry,
            bridge,
            dispatcher: Mutex::new(dispatcher),
            core,
            drain_deadline: config.drain_deadline,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// The bridge to hand to the native binding layer. Its methods are
    /// the only legal entry points from the core's poll thread.
    pub fn bridge(&self) -> Arc<EventBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Register an event handler. See [`Dispatcher::subscribe`].
    pub fn subscribe(&self, handler: impl EventHandler + 'static) {
        self.dispatcher.lock().subscribe(handler);
    }

    /// Start the dispatch consumer thread. Idempotent.
    pub fn start(&self) {
        self.dispatcher.lock().start();
    }

    /// Snapshot of one peer's session state.
    pub fn peer(&self, id: PeerId) -> Result<PeerSnapshot, SessionError> {
        self.registry.get(id)
    }

    // ── Outbound (gated on shutdown) ──

    pub fn send_message(
        &self,
        peer: PeerId,
        kind: MessageKind,
        text: &str,
    ) -> Result<u32, SessionError> {
        self.guard()?;
        if text.is_empty() || text.len() > MAX_MESSAGE_LENGTH {
            return Err(SessionError::MalformedPayload("outbound message length"));
        }
        self.core.send_message(peer, kind, text)
    }

    pub fn send_lossless_packet(&self, peer: PeerId, data: &[u8]) -> Result<(), SessionError> {
        self.guard()?;
        if data.is_empty() || data.len() > MAX_PACKET_SIZE {
            return Err(SessionError::MalformedPayload("outbound packet length"));
        }
        self.core.send_lossless_packet(peer, data)
    }

    pub fn add_peer(&self, public_key: &PublicKey, message: &str) -> Result<PeerId, SessionError> {
        self.guard()?;
        if message.is_empty() || message.len() > MAX_FRIEND_REQUEST_LENGTH {
            return Err(SessionError::MalformedPayload("friend request length"));
        }
        self.core.add_peer(public_key, message)
    }

    /// Remove a peer from the core and tombstone its registry entry.
    pub fn remove_peer(&self, peer: PeerId) -> Result<(), SessionError> {
        self.guard()?;
        self.core.remove_peer(peer)?;
        // The entry may never have materialized; the tombstone matters
        // either way.
        let _ = self.registry.remove(peer);
        Ok(())
    }

    // ── Lifecycle ──

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Drain in-flight events up to the configured deadline, then close
    /// the queue and join the consumer thread. Safe to call twice.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("session shutting down");
        self.dispatcher.lock().shutdown(self.drain_deadline);
    }

    /// Events evicted by the queue-full policy.
    pub fn dropped_events(&self) -> u64 {
        self.bridge.dropped()
    }

    /// Payloads discarded by bridge validation.
    pub fn malformed_payloads(&self) -> u64 {
        self.bridge.malformed()
    }

    fn guard(&self) -> Result<(), SessionError> {
        if self.is_shutting_down() {
            Err(SessionError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ConnectionStatus, InboundEvent};
    use parking_lot::Mutex;

    #[derive(Debug, PartialEq, Eq)]
    enum Call {
        SendMessage(PeerId, String),
        SendPacket(PeerId, Vec<u8>),
        AddPeer(String),
        RemovePeer(PeerId),
    }

    #[derive(Default)]
    struct RecordingCore {
        calls: Mutex<Vec<Call>>,
    }

    impl CoreHandle for RecordingCore {
        fn send_message(
            &self,
            peer: PeerId,
            _kind: MessageKind,
            text: &str,
        ) -> Result<u32, SessionError> {
            self.calls.lock().push(Call::SendMessage(peer, text.into()));
            Ok(42)
        }

        fn send_lossless_packet(&self, peer: PeerId, data: &[u8]) -> Result<(), SessionError> {
            self.calls.lock().push(Call::SendPacket(peer, data.to_vec()));
            Ok(())
        }

        fn add_peer(&self, key: &PublicKey, message: &str) -> Result<PeerId, SessionError> {
            self.calls.lock().push(Call::AddPeer(key.to_string()));
            let _ = message;
            Ok(11)
        }

        fn remove_peer(&self, peer: PeerId) -> Result<(), SessionError> {
            self.calls.lock().push(Call::RemovePeer(peer));
            Ok(())
        }
    }

    fn new_session() -> (Session, Arc<RecordingCore>) {
        let core = Arc::new(RecordingCore::default());
        let session = Session::new(Arc::clone(&core) as Arc<dyn CoreHandle>, SessionConfig::default());
        (session, core)
    }

    #[test]
    fn outbound_calls_reach_the_core() {
        let (session, core) = new_session();

        assert_eq!(session.send_message(7, MessageKind::Normal, "hi"), Ok(42));
        session.send_lossless_packet(7, &[160, 1]).unwrap();
        assert_eq!(session.add_peer(&PublicKey([1; 32]), "hello"), Ok(11));

        let calls = core.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::SendMessage(7, "hi".into()));
    }

    #[test]
    fn outbound_is_rejected_locally_after_shutdown() {
        let (session, core) = new_session();
        session.start();
        session.shutdown();

        assert_eq!(
            session.send_message(1, MessageKind::Normal, "late"),
            Err(SessionError::ShuttingDown)
        );
        assert_eq!(
            session.send_lossless_packet(1, &[1]),
            Err(SessionError::ShuttingDown)
        );
        assert!(core.calls.lock().is_empty());
    }

    #[test]
    fn oversized_outbound_message_is_rejected() {
        let (session, core) = new_session();
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert_eq!(
            session.send_message(1, MessageKind::Normal, &long),
            Err(SessionError::MalformedPayload("outbound message length"))
        );
        assert_eq!(
            session.send_message(1, MessageKind::Normal, ""),
            Err(SessionError::MalformedPayload("outbound message length"))
        );
        assert!(core.calls.lock().is_empty());
    }

    #[test]
    fn remove_peer_tombstones_registry() {
        let (session, core) = new_session();
        session.start();

        let bridge = session.bridge();
        bridge.on_friend_connection_status(5, ConnectionStatus::Udp);
        // Wait for the consumer to apply the event.
        assert!(bridge.queue().wait_empty(Duration::from_secs(2)));
        while session.peer(5).is_err() {
            std::thread::yield_now();
        }

        session.remove_peer(5).unwrap();
        assert_eq!(core.calls.lock().last(), Some(&Call::RemovePeer(5)));
        assert_eq!(session.peer(5), Err(SessionError::PeerNotFound(5)));
        assert_eq!(
            session.registry().upsert(5, crate::registry::PeerUpdate::touch()),
            Err(SessionError::PeerNotFound(5))
        );
    }

    #[test]
    fn end_to_end_pipeline_updates_registry_and_handlers() {
        let (session, _core) = new_session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(move |_: &SessionRegistry, event: &InboundEvent| {
            sink.lock().push(event.clone());
        });
        session.start();

        let bridge = session.bridge();
        bridge.on_friend_connection_status(7, ConnectionStatus::Udp);
        bridge.on_friend_name(7, b"Alice");
        bridge.on_friend_message(7, MessageKind::Normal, b"hi");

        session.shutdown();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[2], InboundEvent::MessageReceived { peer: 7, .. }));

        let snapshot = session.peer(7).unwrap();
        assert_eq!(snapshot.connection, ConnectionStatus::Udp);
        assert_eq!(snapshot.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (session, _core) = new_session();
        session.start();
        session.shutdown();
        session.shutdown();
        assert!(session.is_shutting_down());
    }
}
