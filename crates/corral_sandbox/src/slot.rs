//! Per-thread sandbox slot behind the C entry points.
//!
//! The C interface has no handles: one sandbox lives in the slot, and the
//! text handed back is owned by the slot and stays readable until the next
//! call that rewrites it. Rust callers should own a [`Sandbox`] instead.
//!
//! The slot is per thread because an engine context cannot move between
//! threads. A host that initializes on one thread and evaluates on another
//! finds an empty slot there, and the evaluation fails with
//! "Not initialized".

use crate::marshal::EvalError;
use crate::sandbox::{Sandbox, SandboxConfig};
use std::cell::RefCell;
use std::ffi::{CStr, CString};

thread_local! {
    static SLOT: RefCell<SandboxSlot> = RefCell::new(SandboxSlot::new());
}

/// The live sandbox plus the last result and error texts
#[derive(Debug, Default)]
pub struct SandboxSlot {
    sandbox: Option<Sandbox>,
    result: CString,
    error: CString,
}

impl SandboxSlot {
    /// Empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any live sandbox with a fresh one over `arena_bytes`
    ///
    /// The previous sandbox is released before the new arena is requested.
    /// Returns false if allocation or construction failed, in which case
    /// the slot is left empty.
    pub fn init(&mut self, arena_bytes: i64) -> bool {
        self.free();
        let config = SandboxConfig::default().with_arena_bytes(arena_bytes);
        match Sandbox::new(config) {
            Ok(sandbox) => {
                self.sandbox = Some(sandbox);
                true
            }
            Err(err) => {
                tracing::warn!(arena_bytes, error = %err, "sandbox init failed");
                false
            }
        }
    }

    /// Release the live sandbox, if any
    pub fn free(&mut self) {
        self.sandbox = None;
    }

    /// Whether a sandbox is live
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.sandbox.is_some()
    }

    /// Evaluate `source` in the live sandbox
    ///
    /// Returns the result text on success. On failure returns `None` and
    /// the reason is readable through [`SandboxSlot::last_error`].
    pub fn eval(&mut self, source: &[u8]) -> Option<&CStr> {
        let Some(sandbox) = self.sandbox.as_mut() else {
            self.error = c_text(EvalError::NotInitialized.message());
            return None;
        };

        self.error = CString::default();
        self.result = CString::default();

        match sandbox.eval(source) {
            Ok(text) => {
                self.result = c_text(text.as_str());
                Some(self.result.as_c_str())
            }
            Err(err) => {
                self.error = c_text(err.message());
                None
            }
        }
    }

    /// Text of the most recent failure, empty after a success
    #[must_use]
    pub fn last_error(&self) -> &CStr {
        self.error.as_c_str()
    }
}

/// Run `f` against this thread's slot
pub fn with<R>(f: impl FnOnce(&mut SandboxSlot) -> R) -> R {
    SLOT.with(|slot| f(&mut slot.borrow_mut()))
}

/// Initialize this thread's sandbox
pub fn init(arena_bytes: i64) -> bool {
    with(|slot| slot.init(arena_bytes))
}

/// Release this thread's sandbox
pub fn free() {
    with(SandboxSlot::free);
}

/// Evaluate in this thread's sandbox, copying the result out
pub fn eval(source: &[u8]) -> Option<String> {
    with(|slot| {
        slot.eval(source)
            .map(|text| text.to_string_lossy().into_owned())
    })
}

/// Copy of this thread's last error text
pub fn last_error() -> String {
    with(|slot| slot.last_error().to_string_lossy().into_owned())
}

/// C string of `text`, cut at the first NUL
fn c_text(text: &str) -> CString {
    let bytes = text.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    CString::new(&bytes[..end]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{DEFAULT_ARENA_BYTES, MIN_ARENA_BYTES, live_arena_bytes};
    use proptest::prelude::*;

    fn live() -> SandboxSlot {
        let mut slot = SandboxSlot::new();
        assert!(slot.init(DEFAULT_ARENA_BYTES as i64));
        slot
    }

    #[test]
    fn test_eval_before_init() {
        let mut slot = SandboxSlot::new();
        assert!(slot.eval(b"1+1").is_none());
        assert_eq!(slot.last_error().to_str().unwrap(), "Not initialized");
    }

    #[test]
    fn test_eval_after_free() {
        let mut slot = live();
        slot.free();
        assert!(!slot.is_initialized());
        assert!(slot.eval(b"1+1").is_none());
        assert_eq!(slot.last_error().to_str().unwrap(), "Not initialized");
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut slot = SandboxSlot::new();
        slot.free();
        slot.free();
        assert!(!slot.is_initialized());
    }

    #[test]
    fn test_success_clears_error() {
        let mut slot = live();
        assert!(slot.eval(b"throw 'first'").is_none());
        assert_eq!(slot.last_error().to_str().unwrap(), "first");

        let text = slot.eval(b"1 + 2").unwrap().to_str().unwrap().to_owned();
        assert_eq!(text, "3");
        assert!(slot.last_error().to_bytes().is_empty());
    }

    #[test]
    fn test_init_replaces_live_sandbox() {
        let mut slot = live();
        assert!(slot.eval(b"var kept = 1; kept").is_some());
        assert!(slot.init(DEFAULT_ARENA_BYTES as i64));
        assert!(slot.eval(b"kept").is_none());
        assert!(slot.last_error().to_str().unwrap().starts_with("ReferenceError"));
    }

    #[test]
    fn test_failed_init_leaves_slot_empty() {
        let mut slot = live();
        assert!(!slot.init(-1));
        assert!(!slot.is_initialized());
        assert!(!slot.init(16));
        assert!(slot.eval(b"1").is_none());
        assert_eq!(slot.last_error().to_str().unwrap(), "Not initialized");
    }

    #[test]
    fn test_interior_nul_cuts_text() {
        let mut slot = live();
        let text = slot.eval(b"'ab' + String.fromCharCode(0) + 'cd'").unwrap();
        assert_eq!(text.to_bytes(), b"ab");
    }

    #[test]
    fn test_thread_slot_functions() {
        free();
        assert_eq!(eval(b"1"), None);
        assert_eq!(last_error(), "Not initialized");

        assert!(init(DEFAULT_ARENA_BYTES as i64));
        assert_eq!(eval(b"'hello' + ' ' + 'world'").as_deref(), Some("hello world"));
        assert_eq!(eval(b"throw new Error('x')"), None);
        assert_eq!(last_error(), "Error: x");
        free();
    }

    #[test]
    fn test_repeated_init() {
        let before = live_arena_bytes();
        let mut slot = SandboxSlot::new();
        for round in 0..16 {
            assert!(slot.init(DEFAULT_ARENA_BYTES as i64));
            // exactly one arena is held, whatever the previous round left
            assert_eq!(live_arena_bytes(), before + DEFAULT_ARENA_BYTES);
            let text = slot.eval(format!("{round} * 2").as_bytes()).unwrap();
            assert_eq!(text.to_str().unwrap(), (round * 2).to_string());
        }
        slot.free();
        assert_eq!(live_arena_bytes(), before);
    }

    #[test]
    fn test_failed_init_releases_previous_arena() {
        let before = live_arena_bytes();
        let mut slot = live();
        assert!(!slot.init(MIN_ARENA_BYTES as i64 - 1));
        assert_eq!(live_arena_bytes(), before);
    }

    #[test]
    fn test_other_thread_sees_empty_slot() {
        assert!(init(DEFAULT_ARENA_BYTES as i64));
        let (result, error) = std::thread::spawn(|| (eval(b"1"), last_error()))
            .join()
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(error, "Not initialized");
        assert_eq!(eval(b"1").as_deref(), Some("1"));
        free();
    }

    #[test]
    fn test_c_text() {
        assert_eq!(c_text("plain").to_bytes(), b"plain");
        assert_eq!(c_text("a\0b").to_bytes(), b"a");
        assert!(c_text("").to_bytes().is_empty());
    }

    proptest! {
        #[test]
        fn prop_undersized_arena_never_initializes(size in i64::MIN..MIN_ARENA_BYTES as i64) {
            let mut slot = SandboxSlot::new();
            prop_assert!(!slot.init(size));
            prop_assert!(slot.eval(b"1").is_none());
            prop_assert_eq!(slot.last_error().to_str().unwrap(), "Not initialized");
        }
    }
}
