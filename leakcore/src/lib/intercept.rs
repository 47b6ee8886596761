use std::cell::UnsafeCell;
use std::io::Write;
use std::mem::{size_of, MaybeUninit};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use once_cell::sync::Lazy;
use crate::bootstrap::BootstrapArena;
use crate::error::LeakError;
use crate::ffi::*;
use crate::guard;
use crate::report::ReportSummary;
use crate::stack::{self, MAX_DEPTH};
use crate::symbols::Symbolizer;
use crate::tracker::Tracker;

/// Handles to the allocator we sit in front of.
#[derive(Clone, Copy)]
pub struct Genuine {
    pub malloc:         CMalloc,
    pub calloc:         CCalloc,
    pub realloc:        CRealloc,
    pub memalign:       CMemalign,
    /// Older C libraries lack it; `memalign` stands in.
    pub aligned_alloc:  Option<CAlignedAlloc>,
    pub posix_memalign: CPosixMemalign,
    pub free:           CFree,
}

impl Genuine {
    /// The C library this crate was linked against. That is the genuine
    /// allocator whenever nothing is interposed, e.g. in tests.
    pub fn system() -> Self {
        Self {
            malloc:         libc::malloc,
            calloc:         libc::calloc,
            realloc:        libc::realloc,
            memalign:       memalign,
            aligned_alloc:  Some(aligned_alloc),
            posix_memalign: libc::posix_memalign,
            free:           libc::free,
        }
    }
}

/// Looks the genuine allocator up. May itself allocate (`dlsym` does), and
/// may fail, in which case the next call tries again.
pub type Resolver = fn() -> Result<Genuine, LeakError>;

const UNRESOLVED:   u8 = 0;
const RESOLVING:    u8 = 1;
const RESOLVED:     u8 = 2;

fn fresh_tracker() -> Mutex<Tracker> {
    Mutex::new(Tracker::new())
}

/// The tracking engine behind the allocation entry points. Meant to be a
/// `static`: everything is initialised on first use.
///
/// Until the resolver has succeeded, requests are served from a
/// [`BootstrapArena`] and never tracked. Afterwards, every call is
/// forwarded to the genuine allocator first, and bookkeeping happens with
/// tracking suppressed on the calling thread, so whatever the tracker
/// allocates for itself goes straight through.
pub struct Interceptor<const N: usize> {
    state:      AtomicU8,
    genuine:    UnsafeCell<MaybeUninit<Genuine>>,
    resolver:   Resolver,
    arena:      BootstrapArena<N>,
    tracker:    Lazy<Mutex<Tracker>, fn() -> Mutex<Tracker>>,
}

// `genuine` is written once, before `state` is released as RESOLVED, and
// only read after observing RESOLVED.
unsafe impl<const N: usize> Sync for Interceptor<N> {}

impl<const N: usize> Interceptor<N> {
    pub const fn new(resolver: Resolver) -> Self {
        Self {
            state:      AtomicU8::new(UNRESOLVED),
            genuine:    UnsafeCell::new(MaybeUninit::uninit()),
            resolver,
            arena:      BootstrapArena::new(),
            tracker:    Lazy::new(fresh_tracker),
        }
    }

    pub fn arena(&self) -> &BootstrapArena<N> {
        &self.arena
    }

    pub fn is_resolved(&self) -> bool {
        self.state.load(Ordering::Acquire) == RESOLVED
    }

    /// Resolves the genuine allocator if nobody has yet. `None` while the
    /// resolution is in flight, on this thread (the resolver allocating)
    /// or on another one.
    pub fn resolve(&self) -> Option<Genuine> {
        match self.state.compare_exchange(UNRESOLVED, RESOLVING, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_)           => {
                match (self.resolver)() {
                    Ok(genuine) => {
                        // SAFETY: RESOLVING is exclusive; nobody reads
                        // the slot before RESOLVED is published.
                        unsafe { (*self.genuine.get()).write(genuine); }
                        self.state.store(RESOLVED, Ordering::Release);
                        Some(genuine)
                    },
                    Err(_)      => {
                        self.state.store(UNRESOLVED, Ordering::Release);
                        None
                    }
                }
            },
            Err(RESOLVED)   => {
                // SAFETY: see `Sync` impl.
                Some(unsafe { (*self.genuine.get()).assume_init() })
            },
            Err(_)          => None,
        }
    }

    #[inline(always)]
    fn genuine(&self) -> Option<Genuine> {
        if self.is_resolved() {
            // SAFETY: see `Sync` impl.
            Some(unsafe { (*self.genuine.get()).assume_init() })
        } else {
            self.resolve()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tracker> {
        // A panic under the lock can't leave the registry half-linked in a
        // way that matters more than crashing the host would.
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the tracker, with tracking suppressed.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut Tracker) -> R) -> R {
        guard::with_guard(|| f(&mut self.lock()))
    }

    #[inline(never)]
    fn track(&self, p: *mut void, size: usize) {
        if p.is_null() {
            return;
        }
        let Some(_quiet) = guard::enter() else {
            return;
        };
        let stack = stack::capture(MAX_DEPTH);
        if stack.is_empty() {
            return;
        }
        // Fail-open: a record we can't store is counted and forgotten.
        let _ = self.lock().insert(p as usize, size, stack);
    }

    fn untrack(&self, p: *mut void) {
        if p.is_null() {
            return;
        }
        if let Some(_quiet) = guard::enter() {
            self.lock().remove(p as usize);
        }
    }

    fn bootstrap(&self, align: usize, size: usize) -> *mut void {
        let p = self.arena.alloc_aligned(align, size);
        if p.is_null() {
            unsafe { set_errno(libc::ENOMEM); }
        }

        p.cast()
    }

    pub unsafe fn malloc(&self, size: size_t) -> *mut void {
        let Some(genuine) = self.genuine() else {
            return self.bootstrap(1, size);
        };
        let p = (genuine.malloc)(size);
        self.track(p, size);

        p
    }

    pub unsafe fn calloc(&self, nobj: size_t, size: size_t) -> *mut void {
        let Some(genuine) = self.genuine() else {
            let p = self.arena.alloc(nobj, size);
            if p.is_null() {
                set_errno(libc::ENOMEM);
            }
            return p.cast();
        };
        let p = (genuine.calloc)(nobj, size);
        // Non-null means the product didn't overflow.
        self.track(p, nobj.saturating_mul(size));

        p
    }

    /// The old record goes first, whatever happens next. On success with a
    /// non-zero size, the new block is tracked with a stack captured *here*:
    /// after a `realloc`, the original `malloc` site is forgotten.
    pub unsafe fn realloc(&self, p: *mut void, size: size_t) -> *mut void {
        let Some(genuine) = self.genuine() else {
            let q = self.arena.realloc(p.cast(), size);
            if q.is_null() {
                set_errno(libc::ENOMEM);
            }
            return q.cast();
        };
        if self.arena.contains(p) {
            // Bootstrap block moving to the real heap. Nothing to untrack,
            // nothing to give back; a zero size is a free, and arena
            // blocks are never freed.
            if size == 0 {
                return ptr::null_mut();
            }
            let q = (genuine.malloc)(size);
            if !q.is_null() {
                let keep = self.arena.block_size(p.cast()).min(size);
                ptr::copy_nonoverlapping(p.cast::<u8>(), q.cast::<u8>(), keep);
                self.track(q, size);
            }
            return q;
        }
        // Untracking before the call keeps another thread from getting `p`
        // back from the allocator and having its new record removed by us.
        self.untrack(p);
        let q = (genuine.realloc)(p, size);
        if size > 0 {
            self.track(q, size);
        }

        q
    }

    pub unsafe fn memalign(&self, alignment: size_t, size: size_t) -> *mut void {
        let Some(genuine) = self.genuine() else {
            return self.bootstrap(alignment, size);
        };
        let p = (genuine.memalign)(alignment, size);
        self.track(p, size);

        p
    }

    pub unsafe fn aligned_alloc(&self, alignment: size_t, size: size_t) -> *mut void {
        let Some(genuine) = self.genuine() else {
            return self.bootstrap(alignment, size);
        };
        let p = match genuine.aligned_alloc {
            Some(aligned_alloc) => aligned_alloc(alignment, size),
            None                => (genuine.memalign)(alignment, size),
        };
        self.track(p, size);

        p
    }

    pub unsafe fn posix_memalign(&self, memptr: *mut *mut void, alignment: size_t, size: size_t) -> int {
        let Some(genuine) = self.genuine() else {
            if !alignment.is_power_of_two() || alignment % size_of::<*mut void>() != 0 {
                return libc::EINVAL;
            }
            let p = self.arena.alloc_aligned(alignment, size);
            if p.is_null() {
                return libc::ENOMEM;
            }
            *memptr = p.cast();
            return 0;
        };
        let res = (genuine.posix_memalign)(memptr, alignment, size);
        if res == 0 {
            self.track(*memptr, size);
        }

        res
    }

    pub unsafe fn free(&self, p: *mut void) {
        if p.is_null() || self.arena.contains(p) {
            return;
        }
        // Unresolved means `p` can't be from the genuine heap we'd forward to.
        let Some(genuine) = self.genuine() else {
            return;
        };
        self.untrack(p);
        (genuine.free)(p);
    }

    /// Scans the live allocations under the tracking lock and writes the
    /// report to `out`. Tracking is suppressed on the calling thread for
    /// the duration, so the report's own allocations don't show up in it.
    pub fn report<W: Write>(
        &self,
        filter_path:    &Path,
        symbolizer:     &dyn Symbolizer,
        out:            &mut W,
    ) -> Result<ReportSummary, LeakError> {
        guard::with_guard(|| self.lock().report(filter_path, symbolizer, out))
    }
}
