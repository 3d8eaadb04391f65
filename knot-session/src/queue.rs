//! Bounded single-consumer queue between the bridge and the dispatcher.
//!
//! The producer side runs inside the native core's poll loop and must
//! never block, so a full queue evicts instead of applying backpressure:
//! the oldest queued event for the incoming event's peer is dropped and
//! counted (falling back to the global oldest when that peer has nothing
//! queued). Dropping preserves the relative order of everything kept.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::SessionError;
use crate::event::InboundEvent;

/// Default queue capacity, in events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Lifecycle of the queue.
///
/// `Idle` → `Draining` on first enqueue, `Draining` → `Idle` when the
/// consumer empties it, any state → `ShutDown` on [`DispatchQueue::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
    ShutDown,
}

struct Inner {
    events: VecDeque<InboundEvent>,
    state: QueueState,
}

pub struct DispatchQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    /// Signaled on enqueue and on close.
    ready: Condvar,
    /// Signaled whenever the consumer empties the queue.
    drained: Condvar,
    dropped: AtomicU64,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity),
                state: QueueState::Idle,
            }),
            ready: Condvar::new(),
            drained: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting on overflow. Constant-bounded work; never
    /// blocks on the consumer. Fails only after [`close`](Self::close).
    pub fn enqueue(&self, event: InboundEvent) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.state == QueueState::ShutDown {
            return Err(SessionError::ShuttingDown);
        }
        if inner.events.len() >= self.capacity {
            let victim = event
                .peer()
                .and_then(|p| inner.events.iter().position(|e| e.peer() == Some(p)))
                .unwrap_or(0);
            let evicted = inner.events.remove(victim);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                peer = ?evicted.as_ref().and_then(InboundEvent::peer),
                dropped = self.dropped.load(Ordering::Relaxed),
                "dispatch queue full, evicted oldest event"
            );
        }
        inner.events.push_back(event);
        inner.state = QueueState::Draining;
        drop(inner);
        self.ready.notify_one();
        Ok(())
    }

    /// Non-evicting variant: a full queue is reported instead of resolved.
    pub fn try_enqueue(&self, event: InboundEvent) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        match inner.state {
            QueueState::ShutDown => return Err(SessionError::ShuttingDown),
            _ if inner.events.len() >= self.capacity => return Err(SessionError::QueueFull),
            _ => {}
        }
        inner.events.push_back(event);
        inner.state = QueueState::Draining;
        drop(inner);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until an event is available or the queue shuts down.
    ///
    /// Returns `None` once the queue is closed; pending events were
    /// discarded at close time.
    pub fn pop(&self) -> Option<InboundEvent> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.events.pop_front() {
                if inner.events.is_empty() {
                    if inner.state == QueueState::Draining {
                        inner.state = QueueState::Idle;
                    }
                    self.drained.notify_all();
                }
                return Some(event);
            }
            if inner.state == QueueState::ShutDown {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Non-blocking pop, for tests and opportunistic draining.
    pub fn try_pop(&self) -> Option<InboundEvent> {
        let mut inner = self.inner.lock();
        let event = inner.events.pop_front();
        if event.is_some() && inner.events.is_empty() {
            if inner.state == QueueState::Draining {
                inner.state = QueueState::Idle;
            }
            self.drained.notify_all();
        }
        event
    }

    /// Wait until the consumer has emptied the queue, up to `timeout`.
    /// Returns whether the queue was empty when the wait ended.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.events.is_empty() && inner.state != QueueState::ShutDown {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.drained.wait_for(&mut inner, deadline - now).timed_out() {
                return inner.events.is_empty();
            }
        }
        true
    }

    /// Shut the queue down. Pending events are discarded; subsequent
    /// enqueues fail with [`SessionError::ShuttingDown`] and the consumer
    /// unblocks with `None`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        let discarded = inner.events.len();
        inner.events.clear();
        inner.state = QueueState::ShutDown;
        drop(inner);
        if discarded > 0 {
            tracing::debug!(discarded, "closed dispatch queue with pending events");
        }
        self.ready.notify_all();
        self.drained.notify_all();
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Total events evicted by the queue-full policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
