//! Dispatcher — the single consumer thread behind the queue.
//!
//! Events are applied to the registry first and handed to subscribers
//! second, so a handler looking up the event's peer always observes
//! registry state consistent with the event it is holding.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;

use crate::event::InboundEvent;
use crate::queue::DispatchQueue;
use crate::registry::{PeerUpdate, SessionRegistry};

/// Subscriber for dispatched events.
///
/// Invoked sequentially on the consumer thread, in arrival order. Any
/// closure with the matching signature works. Handlers must tolerate
/// being invoked while shutdown is in progress.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, registry: &SessionRegistry, event: &InboundEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&SessionRegistry, &InboundEvent) + Send + Sync,
{
    fn on_event(&self, registry: &SessionRegistry, event: &InboundEvent) {
        self(registry, event)
    }
}

/// Owns the consumer thread that drains the [`DispatchQueue`].
pub struct Dispatcher {
    queue: Arc<DispatchQueue>,
    registry: Arc<SessionRegistry>,
    handlers: Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(queue: Arc<DispatchQueue>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            queue,
            registry,
            handlers: Arc::new(RwLock::new(Vec::new())),
            worker: None,
        }
    }

    /// Register a handler. Any number of handlers may subscribe; each
    /// receives every event, in subscription order.
    pub fn subscribe(&self, handler: impl EventHandler + 'static) {
        self.handlers.write().push(Box::new(handler));
    }

    /// Spawn the consumer thread. Idempotent.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let queue = Arc::clone(&self.queue);
        let registry = Arc::clone(&self.registry);
        let handlers = Arc::clone(&self.handlers);
        self.worker = Some(
            std::thread::Builder::new()
                .name("knot-dispatch".to_string())
                .spawn(move || {
                    while let Some(event) = queue.pop() {
                        apply_to_registry(&registry, &event);
                        for handler in handlers.read().iter() {
                            handler.on_event(&registry, &event);
                        }
                    }
                    tracing::debug!("dispatch consumer stopped");
                })
                .expect("failed to spawn dispatch thread"),
        );
    }

    /// Drain in-flight events for up to `drain`, then force the queue
    /// closed and join the consumer. Events arriving after the drain
    /// window are discarded.
    pub fn shutdown(&mut self, drain: Duration) {
        if self.worker.is_some() && !self.queue.wait_empty(drain) {
            tracing::warn!(pending = self.queue.len(), "drain deadline hit, discarding");
        }
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Fold one event into the registry.
///
/// Friend requests and self connection changes carry no peer id and leave
/// the registry untouched. An event for a tombstoned peer is logged and
/// still delivered to handlers — the core may race its own removal.
fn apply_to_registry(registry: &SessionRegistry, event: &InboundEvent) {
    let result = match event {
        InboundEvent::ConnectionStatusChanged { .. } | InboundEvent::FriendRequest { .. } => {
            return;
        }
        InboundEvent::NameChanged { peer, name } => {
            registry.upsert(*peer, PeerUpdate::name(name.clone()))
        }
        InboundEvent::StatusMessageChanged { peer, message } => {
            registry.upsert(*peer, PeerUpdate::status_message(message.clone()))
        }
        InboundEvent::UserStatusChanged { peer, status } => {
            registry.upsert(*peer, PeerUpdate::user_status(*status))
        }
        InboundEvent::PeerConnectionChanged { peer, status } => {
            registry.upsert(*peer, PeerUpdate::connection(*status))
        }
        InboundEvent::MessageReceived { peer, .. } | InboundEvent::LosslessPacket { peer, .. } => {
            registry.upsert(*peer, PeerUpdate::touch())
        }
    };
    if let Err(err) = result {
        tracing::debug!(%err, "registry update skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::event::{ConnectionStatus, MessageKind, PublicKey};
    use parking_lot::Mutex;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn collector() -> (
        Arc<Mutex<Vec<InboundEvent>>>,
        impl Fn(&SessionRegistry, &InboundEvent) + Send + Sync,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |_: &SessionRegistry, event: &InboundEvent| {
            sink.lock().push(event.clone())
        })
    }

    fn new_dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(DispatchQueue::new(64)),
            Arc::new(SessionRegistry::new()),
        )
    }

    #[test]
    fn peer_events_arrive_in_order_with_consistent_registry() {
        init_tracing();
        let mut dispatcher = new_dispatcher();
        let (seen, handler) = collector();
        dispatcher.subscribe(handler);

        // The handler checks that the registry already reflects the
        // message event's peer by the time the message is delivered.
        let registry_at_message = Arc::new(Mutex::new(None));
        let probe = Arc::clone(&registry_at_message);
        dispatcher.subscribe(move |registry: &SessionRegistry, event: &InboundEvent| {
            if matches!(event, InboundEvent::MessageReceived { peer: 7, .. }) {
                *probe.lock() = Some(registry.get(7));
            }
        });

        let queue = Arc::clone(dispatcher.queue());
        queue
            .enqueue(InboundEvent::PeerConnectionChanged {
                peer: 7,
                status: ConnectionStatus::Udp,
            })
            .unwrap();
        queue
            .enqueue(InboundEvent::NameChanged {
                peer: 7,
                name: "Alice".to_string(),
            })
            .unwrap();
        queue
            .enqueue(InboundEvent::MessageReceived {
                peer: 7,
                kind: MessageKind::Normal,
                text: "hi".to_string(),
            })
            .unwrap();

        dispatcher.start();
        dispatcher.shutdown(Duration::from_secs(2));

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], InboundEvent::PeerConnectionChanged { peer: 7, .. }));
        assert!(matches!(seen[1], InboundEvent::NameChanged { peer: 7, .. }));
        assert!(matches!(seen[2], InboundEvent::MessageReceived { peer: 7, .. }));

        let snapshot = dispatcher.registry().get(7).unwrap();
        assert_eq!(snapshot.connection, ConnectionStatus::Udp);
        assert_eq!(snapshot.name.as_deref(), Some("Alice"));

        let at_message = registry_at_message.lock().take().unwrap().unwrap();
        assert_eq!(at_message.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn friend_request_is_delivered_without_registry_entry() {
        let mut dispatcher = new_dispatcher();
        let (seen, handler) = collector();
        dispatcher.subscribe(handler);

        dispatcher
            .queue()
            .enqueue(InboundEvent::FriendRequest {
                public_key: PublicKey([3u8; 32]),
                message: "add me".to_string(),
            })
            .unwrap();

        dispatcher.start();
        dispatcher.shutdown(Duration::from_secs(2));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(
            dispatcher.registry().get(3),
            Err(SessionError::PeerNotFound(3))
        );
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn no_handler_runs_after_shutdown() {
        let mut dispatcher = new_dispatcher();
        let (seen, handler) = collector();
        dispatcher.subscribe(handler);
        dispatcher.start();
        dispatcher.shutdown(Duration::from_secs(1));

        let result = dispatcher.queue().enqueue(InboundEvent::NameChanged {
            peer: 1,
            name: "late".to_string(),
        });
        assert_eq!(result, Err(SessionError::ShuttingDown));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let mut dispatcher = new_dispatcher();
        let (first, handler_a) = collector();
        let (second, handler_b) = collector();
        dispatcher.subscribe(handler_a);
        dispatcher.subscribe(handler_b);

        for i in 0..4 {
            dispatcher
                .queue()
                .enqueue(InboundEvent::MessageReceived {
                    peer: 1,
                    kind: MessageKind::Normal,
                    text: i.to_string(),
                })
                .unwrap();
        }

        dispatcher.start();
        dispatcher.shutdown(Duration::from_secs(2));

        assert_eq!(first.lock().len(), 4);
        assert_eq!(*first.lock(), *second.lock());
    }

    #[test]
    fn lossless_packet_touches_registry() {
        let mut dispatcher = new_dispatcher();
        dispatcher
            .queue()
            .enqueue(InboundEvent::LosslessPacket {
                peer: 9,
                data: vec![160, 1, 2],
            })
            .unwrap();
        dispatcher.start();
        dispatcher.shutdown(Duration::from_secs(2));

        let snapshot = dispatcher.registry().get(9).unwrap();
        assert_eq!(snapshot.connection, ConnectionStatus::Offline);
        assert_eq!(snapshot.name, None);
    }
}
