//! Safe wrapper around the embedder's C event callback.

use std::ffi::{CString, c_char, c_void};

use crate::envelope::EventEnvelope;

/// C callback signature: a UTF-8 JSON envelope (pointer + length) and the
/// opaque user data registered with the subscription.
pub type EventCallback =
    unsafe extern "C" fn(json_ptr: *const c_char, json_len: usize, user_data: *mut c_void);

/// An event callback paired with its user_data pointer.
///
/// The embedder guarantees the callback and user_data stay valid until
/// the handle is destroyed or the subscription is replaced.
pub struct EventSink {
    cb: EventCallback,
    user_data: *mut c_void,
}

// Safety: the embedder guarantees thread-safe access to user_data; the
// callback is invoked only from the dispatch consumer thread.
unsafe impl Send for EventSink {}
unsafe impl Sync for EventSink {}

impl EventSink {
    pub fn new(cb: EventCallback, user_data: *mut c_void) -> Self {
        Self { cb, user_data }
    }

    /// Serialize the envelope and invoke the callback.
    ///
    /// The JSON pointer is valid only for the duration of the call; the
    /// embedder must copy what it keeps. Envelopes whose JSON contains an
    /// interior NUL are dropped (cannot happen with well-formed events).
    pub fn emit(&self, envelope: &EventEnvelope) {
        let json = match serde_json::to_string(envelope) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(%err, "failed to serialize event envelope");
                return;
            }
        };
        let Ok(cstr) = CString::new(json.as_str()) else {
            tracing::warn!("event envelope contained interior NUL, dropping");
            return;
        };
        unsafe {
            (self.cb)(cstr.as_ptr(), json.len(), self.user_data);
        }
    }
}
