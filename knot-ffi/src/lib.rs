//! C ABI for embedding the session layer in non-Rust hosts.
//!
//! The surface splits in two:
//!
//! - [`abi`] — lifecycle and queries: create/destroy handles, subscribe
//!   the JSON event callback, shut down, snapshot peers and counters.
//! - [`hooks`] — the `knot_notify_*` functions the native core's glue
//!   calls from its poll thread. They copy payloads, validate them, and
//!   enqueue; they never block, error, or panic across the boundary.
//!
//! Events reach the embedder as JSON [`envelope::EventEnvelope`] strings
//! on the dispatch consumer thread. Pointers handed to the callback are
//! valid only for the duration of the call.

pub mod abi;
pub mod callback;
pub mod envelope;
pub mod error;
pub mod hooks;

pub use abi::SessionInstance;
pub use callback::{EventCallback, EventSink};
pub use envelope::EventEnvelope;
pub use error::FfiResult;
