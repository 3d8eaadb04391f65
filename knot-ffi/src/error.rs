//! Result codes returned by all `knot_*` functions.

/// Error codes for the C ABI surface.
///
/// Every `knot_*` function returning `i32` uses these values. The
/// notification hooks return nothing — the native core has no error
/// contract for its callbacks, so they always complete normally.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiResult {
    /// Success.
    Ok = 0,
    /// The handle does not exist in the global handle table.
    InvalidHandle = 1,
    /// A required argument was null or not valid UTF-8.
    InvalidArgument = 2,
    /// Shutdown has begun; the operation was rejected.
    ShuttingDown = 3,
    /// The peer is not in the registry.
    NotFound = 4,
    /// An internal error occurred (logged via tracing).
    Internal = 5,
}
