//! Inbound notification hooks — the functions the native core's glue
//! calls from its poll thread.
//!
//! Every hook returns `void` and always completes normally: an invalid
//! handle is ignored, a bad pointer or unknown discriminant is counted as
//! a malformed payload, and nothing here blocks on the consumer. Payload
//! buffers are copied before the hook returns; the caller may reuse them
//! immediately.

use knot_session::event::PUBLIC_KEY_SIZE;
use knot_session::{ConnectionStatus, MessageKind, UserStatus};

use crate::abi::bridge_for;

/// View a (pointer, length) pair as a byte slice. Zero length is always an
/// empty slice; a null pointer with non-zero length is `None`.
unsafe fn payload<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        Some(&[])
    } else if ptr.is_null() {
        None
    } else {
        Some(unsafe { std::slice::from_raw_parts(ptr, len) })
    }
}

/// The local node's connection to the network changed.
///
/// `status`: 0 = offline, 1 = relayed, 2 = UDP.
///
/// # Safety
///
/// `handle` must be a handle from `knot_create` (unknown handles are
/// ignored).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_self_connection_status(handle: u64, status: u8) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    match ConnectionStatus::from_raw(status) {
        Some(status) => bridge.on_self_connection_status(status),
        None => bridge.reject_payload("connection status discriminant"),
    }
}

/// A friend request arrived.
///
/// # Safety
///
/// `public_key` must be null or point to 32 readable bytes. `message`
/// must be null (with `length` 0) or point to `length` readable bytes.
/// Buffers are only read for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_request(
    handle: u64,
    public_key: *const u8,
    message: *const u8,
    length: usize,
) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    let Some(key) = (unsafe { payload(public_key, PUBLIC_KEY_SIZE) }) else {
        bridge.reject_payload("friend request public key pointer");
        return;
    };
    let Some(message) = (unsafe { payload(message, length) }) else {
        bridge.reject_payload("friend request message pointer");
        return;
    };
    bridge.on_friend_request(key, message);
}

/// A friend changed their display name.
///
/// # Safety
///
/// `name` must be null (with `length` 0) or point to `length` readable
/// bytes, only read for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_name(
    handle: u64,
    friend: u32,
    name: *const u8,
    length: usize,
) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    match unsafe { payload(name, length) } {
        Some(bytes) => bridge.on_friend_name(friend, bytes),
        None => bridge.reject_payload("display name pointer"),
    }
}

/// A friend changed their status message.
///
/// # Safety
///
/// `message` must be null (with `length` 0) or point to `length` readable
/// bytes, only read for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_status_message(
    handle: u64,
    friend: u32,
    message: *const u8,
    length: usize,
) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    match unsafe { payload(message, length) } {
        Some(bytes) => bridge.on_friend_status_message(friend, bytes),
        None => bridge.reject_payload("status message pointer"),
    }
}

/// A friend changed their user status.
///
/// `status`: 0 = available, 1 = away, 2 = busy.
///
/// # Safety
///
/// `handle` must be a handle from `knot_create` (unknown handles are
/// ignored).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_status(handle: u64, friend: u32, status: u8) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    match UserStatus::from_raw(status) {
        Some(status) => bridge.on_friend_status(friend, status),
        None => bridge.reject_payload("user status discriminant"),
    }
}

/// A friend's connection to us changed.
///
/// `status`: 0 = offline, 1 = relayed, 2 = UDP.
///
/// # Safety
///
/// `handle` must be a handle from `knot_create` (unknown handles are
/// ignored).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_connection_status(
    handle: u64,
    friend: u32,
    status: u8,
) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    match ConnectionStatus::from_raw(status) {
        Some(status) => bridge.on_friend_connection_status(friend, status),
        None => bridge.reject_payload("connection status discriminant"),
    }
}

/// A chat message arrived from a friend.
///
/// `kind`: 0 = normal, 1 = action.
///
/// # Safety
///
/// `message` must be null (with `length` 0) or point to `length` readable
/// bytes, only read for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_message(
    handle: u64,
    friend: u32,
    kind: u8,
    message: *const u8,
    length: usize,
) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    let Some(kind) = MessageKind::from_raw(kind) else {
        bridge.reject_payload("message kind discriminant");
        return;
    };
    match unsafe { payload(message, length) } {
        Some(bytes) => bridge.on_friend_message(friend, kind, bytes),
        None => bridge.reject_payload("chat message pointer"),
    }
}

/// A lossless custom packet arrived from a friend.
///
/// # Safety
///
/// `data` must be null (with `length` 0) or point to `length` readable
/// bytes, only read for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn knot_notify_friend_lossless_packet(
    handle: u64,
    friend: u32,
    data: *const u8,
    length: usize,
) {
    let Some(bridge) = bridge_for(handle) else {
        return;
    };
    match unsafe { payload(data, length) } {
        Some(bytes) => bridge.on_friend_lossless_packet(friend, bytes),
        None => bridge.reject_payload("lossless packet pointer"),
    }
}
