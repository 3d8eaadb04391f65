//! C ABI lifecycle and query surface.
//!
//! All functions are `extern "C"` and `#[no_mangle]`. Handles are opaque
//! `u64` IDs into a global `DashMap`. The inbound notification hooks the
//! native core's glue calls live in [`crate::hooks`].

use std::ffi::{CStr, CString, c_char, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use knot_session::queue::QueueState;
use knot_session::{DispatchQueue, Dispatcher, EventBridge, InboundEvent, SessionRegistry};

use crate::callback::{EventCallback, EventSink};
use crate::envelope::EventEnvelope;
use crate::error::FfiResult;

/// Per-handle state. One instance per `knot_create` call.
pub struct SessionInstance {
    pub id: u64,
    pub bridge: Arc<EventBridge>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Mutex<Dispatcher>,
    /// Registered event callback (set via `knot_subscribe_events`).
    pub sink: Arc<Mutex<Option<EventSink>>>,
    pub drain_deadline: Duration,
}

/// Global handle table. Maps handle IDs → Arc<SessionInstance>.
static HANDLES: Lazy<DashMap<u64, Arc<SessionInstance>>> = Lazy::new(DashMap::new);

/// Monotonic handle counter.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Bridge lookup for the notification hooks.
pub(crate) fn bridge_for(handle: u64) -> Option<Arc<EventBridge>> {
    HANDLES.get(&handle).map(|inst| Arc::clone(&inst.bridge))
}

#[cfg(test)]
pub(crate) fn instance_for(handle: u64) -> Option<Arc<SessionInstance>> {
    HANDLES.get(&handle).map(|inst| Arc::clone(&inst))
}

/// Helper: read a C string pointer into a Rust String, returning None on
/// null or invalid UTF-8.
unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
}

// ─── Create / Destroy ────────────────────────────────────────────────

/// Create a new session instance from a JSON configuration string and
/// start its dispatch consumer thread.
///
/// Config JSON schema (all fields optional):
/// ```json
/// {
///   "queue_capacity": 1024,
///   "drain_deadline_ms": 3000
/// }
/// ```
///
/// Returns a non-zero handle on success, or 0 on failure. Subscribe a
/// callback with `knot_subscribe_events` before feeding notifications;
/// events dispatched without a subscriber are discarded.
///
/// # Safety
///
/// `config_json` must be a valid, NUL-terminated UTF-8 C string, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_create(config_json: *const c_char) -> u64 {
    let Some(json_str) = (unsafe { read_c_str(config_json) }) else {
        tracing::error!("knot_create: null or invalid config_json");
        return 0;
    };

    let parsed: serde_json::Value = match serde_json::from_str(&json_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("knot_create: invalid JSON: {e}");
            return 0;
        }
    };

    let capacity = parsed["queue_capacity"]
        .as_u64()
        .map(|n| n as usize)
        .unwrap_or(knot_session::queue::DEFAULT_QUEUE_CAPACITY);
    let drain_deadline = Duration::from_millis(parsed["drain_deadline_ms"].as_u64().unwrap_or(3000));
    if capacity == 0 {
        tracing::error!("knot_create: queue_capacity must be non-zero");
        return 0;
    }

    let queue = Arc::new(DispatchQueue::new(capacity));
    let registry = Arc::new(SessionRegistry::new());
    let bridge = Arc::new(EventBridge::new(Arc::clone(&queue)));
    let mut dispatcher = Dispatcher::new(Arc::clone(&queue), Arc::clone(&registry));

    // One internal subscriber forwards everything to whichever callback
    // is currently registered.
    let sink: Arc<Mutex<Option<EventSink>>> = Arc::new(Mutex::new(None));
    let pump_sink = Arc::clone(&sink);
    let pump_queue = Arc::clone(&queue);
    let seq = AtomicU64::new(0);
    dispatcher.subscribe(move |_: &SessionRegistry, event: &InboundEvent| {
        if let Some(ref cb) = *pump_sink.lock() {
            let seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
            cb.emit(&EventEnvelope::new(seq, pump_queue.dropped(), event.clone()));
        }
    });

    let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    dispatcher.start();

    HANDLES.insert(
        id,
        Arc::new(SessionInstance {
            id,
            bridge,
            registry,
            dispatcher: Mutex::new(dispatcher),
            sink,
            drain_deadline,
        }),
    );
    tracing::debug!("knot_create: created handle {id}");
    id
}

/// Destroy a session instance: drain with the configured deadline, stop
/// the consumer thread, and free all associated resources.
///
/// Safe to call multiple times — second call is a no-op.
///
/// # Safety
///
/// `handle` must be a value previously returned by `knot_create`, or the
/// call is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_destroy(handle: u64) {
    if let Some((_, instance)) = HANDLES.remove(&handle) {
        tracing::debug!("knot_destroy: destroying handle {handle}");
        instance.dispatcher.lock().shutdown(instance.drain_deadline);
    }
}

// ─── Subscribe ───────────────────────────────────────────────────────

/// Register the event callback for a session.
///
/// The callback is invoked from the dispatch consumer thread with JSON
/// event envelopes. Only one callback per session; subsequent calls
/// replace the previous one.
///
/// # Safety
///
/// `cb` must be a valid function pointer. `user_data` must remain valid
/// for the lifetime of the subscription (until destroy or a replacement
/// subscribe call).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_subscribe_events(
    handle: u64,
    cb: EventCallback,
    user_data: *mut c_void,
) -> i32 {
    let Some(instance) = HANDLES.get(&handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    *instance.sink.lock() = Some(EventSink::new(cb, user_data));
    tracing::debug!("knot_subscribe_events: callback registered for handle {handle}");
    FfiResult::Ok as i32
}

// ─── Shutdown ────────────────────────────────────────────────────────

/// Stop dispatch for a session without destroying the handle.
///
/// Drains in-flight events up to the configured deadline, then closes the
/// queue; subsequent notifications are discarded and no further callback
/// fires. Registry queries keep working.
///
/// # Safety
///
/// `handle` must be a valid handle from `knot_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_shutdown(handle: u64) -> i32 {
    let Some(instance) = HANDLES.get(&handle) else {
        return FfiResult::InvalidHandle as i32;
    };
    instance.dispatcher.lock().shutdown(instance.drain_deadline);
    FfiResult::Ok as i32
}

// ─── State Query ─────────────────────────────────────────────────────

/// Get a JSON snapshot of one peer's session state.
///
/// Returns a heap-allocated C string that must be freed with
/// `knot_free_string`, or null if the handle is invalid or the peer is
/// not in the registry.
///
/// Snapshot schema:
/// ```json
/// {
///   "id": 7,
///   "connection": "udp",
///   "name": "Alice",
///   "status_message": null,
///   "user_status": "available",
///   "last_update": "2026-01-01T00:00:00Z"
/// }
/// ```
///
/// # Safety
///
/// `handle` must be a valid handle from `knot_create`. The returned
/// pointer must be freed with `knot_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_peer_snapshot_json(handle: u64, peer: u32) -> *mut c_char {
    let Some(instance) = HANDLES.get(&handle) else {
        return std::ptr::null_mut();
    };
    let Ok(snapshot) = instance.registry.get(peer) else {
        return std::ptr::null_mut();
    };
    let Ok(json) = serde_json::to_string(&snapshot) else {
        return std::ptr::null_mut();
    };
    match CString::new(json) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Get a JSON snapshot of the session's counters and queue state.
///
/// Returns a heap-allocated C string that must be freed with
/// `knot_free_string`, or null if the handle is invalid.
///
/// # Safety
///
/// `handle` must be a valid handle from `knot_create`. The returned
/// pointer must be freed with `knot_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_stats_json(handle: u64) -> *mut c_char {
    let Some(instance) = HANDLES.get(&handle) else {
        return std::ptr::null_mut();
    };
    let queue = instance.bridge.queue();
    let state = match queue.state() {
        QueueState::Idle => "idle",
        QueueState::Draining => "draining",
        QueueState::ShutDown => "shut_down",
    };
    let stats = serde_json::json!({
        "dropped_events": instance.bridge.dropped(),
        "malformed_payloads": instance.bridge.malformed(),
        "queue_depth": queue.len(),
        "queue_state": state,
        "peers": instance.registry.len(),
    });
    match CString::new(stats.to_string()) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a string previously returned by a `knot_*_json` function.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by a `knot_*_json`
/// function. Must not be called more than once for the same pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(json: &str) -> CString {
        CString::new(json).unwrap()
    }

    fn create(json: &str) -> u64 {
        let config = make_config(json);
        unsafe { knot_create(config.as_ptr()) }
    }

    #[test]
    fn create_and_destroy() {
        let handle = create(r#"{"queue_capacity":16}"#);
        assert_ne!(handle, 0);
        assert!(HANDLES.contains_key(&handle));

        unsafe { knot_destroy(handle) };
        assert!(!HANDLES.contains_key(&handle));
    }

    #[test]
    fn create_null_config() {
        let handle = unsafe { knot_create(std::ptr::null()) };
        assert_eq!(handle, 0);
    }

    #[test]
    fn create_invalid_json() {
        let handle = create("not json");
        assert_eq!(handle, 0);
    }

    #[test]
    fn create_rejects_zero_capacity() {
        let handle = create(r#"{"queue_capacity":0}"#);
        assert_eq!(handle, 0);
    }

    #[test]
    fn double_destroy_is_noop() {
        let handle = create("{}");
        assert_ne!(handle, 0);

        unsafe { knot_destroy(handle) };
        unsafe { knot_destroy(handle) };
    }

    #[test]
    fn invalid_handle_returns_error() {
        unsafe extern "C" fn noop_cb(_ptr: *const c_char, _len: usize, _user_data: *mut c_void) {}

        let result = unsafe { knot_subscribe_events(999_999, noop_cb, std::ptr::null_mut()) };
        assert_eq!(result, FfiResult::InvalidHandle as i32);

        let result = unsafe { knot_shutdown(999_999) };
        assert_eq!(result, FfiResult::InvalidHandle as i32);

        let ptr = unsafe { knot_stats_json(999_999) };
        assert!(ptr.is_null());
    }

    #[test]
    fn subscribe_registers_callback() {
        unsafe extern "C" fn noop_cb(_ptr: *const c_char, _len: usize, _user_data: *mut c_void) {}

        let handle = create("{}");
        let result = unsafe { knot_subscribe_events(handle, noop_cb, std::ptr::null_mut()) };
        assert_eq!(result, FfiResult::Ok as i32);

        unsafe { knot_destroy(handle) };
    }

    #[test]
    fn snapshot_of_unknown_peer_is_null() {
        let handle = create("{}");
        let ptr = unsafe { knot_peer_snapshot_json(handle, 12345) };
        assert!(ptr.is_null());
        unsafe { knot_destroy(handle) };
    }

    #[test]
    fn stats_json_shape() {
        let handle = create("{}");
        let ptr = unsafe { knot_stats_json(handle) };
        assert!(!ptr.is_null());

        let json_str = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(json_str).unwrap();
        assert_eq!(parsed["dropped_events"], 0);
        assert_eq!(parsed["malformed_payloads"], 0);
        assert_eq!(parsed["queue_state"], "idle");
        assert_eq!(parsed["peers"], 0);

        unsafe { knot_free_string(ptr) };
        unsafe { knot_destroy(handle) };
    }

    #[test]
    fn free_null_string_is_noop() {
        unsafe { knot_free_string(std::ptr::null_mut()) };
    }
}
