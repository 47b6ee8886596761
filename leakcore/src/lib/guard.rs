use std::cell::Cell;
use std::marker::PhantomData;

// The tracker allocates on its own (capturing a stack, growing the
// registry, formatting a report). Those requests come back through the
// interposed entry points and must be forwarded, not tracked. Each thread
// owns its flag, so no lock is involved. The initializer is `const` and
// `bool` needs no destructor: reading the flag never allocates, not even
// while the thread is being torn down.
thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

#[inline(always)]
pub fn is_suppressed() -> bool {
    //! Unreachable thread-locals count as suppressed: better to miss an
    //! allocation than to recurse into the tracker.
    SUPPRESSED.try_with(|s| s.get()).unwrap_or(true)
}

/// Scoped suppression. The flag goes back to its previous value when this
/// is dropped, including during unwinding.
#[must_use]
pub struct Suppressed {
    prev:           bool,
    // Bound to the thread whose flag it flipped.
    _not_send:      PhantomData<*const ()>,
}

impl Drop for Suppressed {
    fn drop(&mut self) {
        let _ = SUPPRESSED.try_with(|s| s.set(self.prev));
    }
}

/// Suppresses tracking on the calling thread, whatever its current state.
pub fn suppress() -> Suppressed {
    let prev = SUPPRESSED.try_with(|s| s.replace(true)).unwrap_or(true);
    Suppressed { prev, _not_send: PhantomData }
}

/// Like [`suppress`], but yields `None` if tracking is already suppressed,
/// i.e. the caller is the tracker itself.
#[inline(always)]
pub fn enter() -> Option<Suppressed> {
    match SUPPRESSED.try_with(|s| s.replace(true)) {
        Ok(false)   => Some(Suppressed { prev: false, _not_send: PhantomData }),
        _           => None,
    }
}

pub fn with_guard<R>(f: impl FnOnce() -> R) -> R {
    let _quiet = suppress();
    f()
}
