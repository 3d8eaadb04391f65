//! Event dispatch and session layer for a native P2P messaging core.
//!
//! The native core pushes notifications (connection changes, friend
//! requests, messages, lossless packets) from its own poll thread, with
//! payload buffers that die when the callback returns. This crate turns
//! that surface into something an application can live with:
//!
//! - [`bridge::EventBridge`] copies payloads into owned
//!   [`event::InboundEvent`] values and enqueues them without ever
//!   blocking the core,
//! - [`queue::DispatchQueue`] is the bounded hand-off in between
//!   (full queue = drop-oldest-for-peer, counted),
//! - [`dispatch::Dispatcher`] drains it on one consumer thread, folding
//!   each event into the [`registry::SessionRegistry`] before any
//!   handler sees it,
//! - [`session::Session`] is the typed context wiring it all together
//!   and gating outbound calls to the core during shutdown.
//!
//! Per-peer event order is preserved end to end: core → bridge → queue →
//! handler.

pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod queue;
pub mod registry;
pub mod session;

pub use bridge::EventBridge;
pub use dispatch::{Dispatcher, EventHandler};
pub use error::SessionError;
pub use event::{
    ConnectionStatus, InboundEvent, MessageKind, PeerId, PublicKey, UserStatus,
};
pub use queue::{DispatchQueue, QueueState};
pub use registry::{PeerSnapshot, PeerUpdate, SessionRegistry};
pub use session::{CoreHandle, Session, SessionConfig};
