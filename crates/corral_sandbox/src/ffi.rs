//! C entry points.
//!
//! Four functions over the calling thread's [`slot`](crate::slot). Returned
//! pointers refer to text owned by the slot and stay valid until the next
//! `sandbox_eval`, `sandbox_init` or `sandbox_free` on the same thread.
//! No panic crosses the boundary: one is caught and reported as a failure.
//!
//! Every call must come from the thread that called `sandbox_init`. A host
//! that switches threads sees no live sandbox there: `sandbox_eval` returns
//! null and `sandbox_get_error` reads "Not initialized".

use crate::slot;
use std::ffi::{CStr, c_char};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Run `body`, turning a panic into `fallback`
fn guard<R>(fallback: R, body: impl FnOnce() -> R) -> R {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            tracing::error!(panic = %message, "panic caught at C boundary");
            fallback
        }
    }
}

/// Create the sandbox over an arena of `mem_size` bytes.
///
/// Any live sandbox is released first. Returns 1 on success and 0 if the
/// arena could not be allocated or the context could not be built on it.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn sandbox_init(mem_size: i32) -> i32 {
    guard(0, || i32::from(slot::init(i64::from(mem_size))))
}

/// Release the sandbox. Safe to call when none is live.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn sandbox_free() {
    guard((), slot::free);
}

/// Evaluate NUL-terminated source text.
///
/// Returns the result text, or null if the script threw or no sandbox is
/// live; the reason is then available from [`sandbox_get_error`]. A null
/// `code` is treated as empty source.
///
/// # Safety
///
/// `code` must be null or point to a NUL-terminated string that stays
/// valid for the duration of the call.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub unsafe extern "C" fn sandbox_eval(code: *const c_char) -> *const c_char {
    let source: &[u8] = if code.is_null() {
        &[]
    } else {
        // SAFETY: non-null and NUL-terminated per caller contract.
        unsafe { CStr::from_ptr(code) }.to_bytes()
    };

    guard(std::ptr::null(), || {
        slot::with(|slot| match slot.eval(source) {
            Some(text) => text.as_ptr(),
            None => std::ptr::null(),
        })
    })
}

/// Text of the last failure. Empty after a successful evaluation.
#[unsafe(no_mangle)]
#[allow(unsafe_code)]
pub extern "C" fn sandbox_get_error() -> *const c_char {
    guard(c"".as_ptr(), || slot::with(|slot| slot.last_error().as_ptr()))
}
