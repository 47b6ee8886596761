use std::cell::UnsafeCell;
use std::mem::size_of;
use std::ptr;
use std::sync::{Mutex, PoisonError};

/// Default arena size. `dlsym` only needs a few small buffers; everything
/// past that is slack for pathological loaders.
pub const ARENA_SIZE: usize = 64 * 1024;

// Every block is preceded by a header holding its requested size, so that
// a later `realloc` knows how much to copy. The header doubles as the
// minimum alignment, which is what `malloc` guarantees on 64-bit targets.
const HEADER: usize = 16;

#[repr(C, align(16))]
struct Buffer<const N: usize>([u8; N]);

/// Bump allocator over a static buffer. Blocks are never reclaimed, and
/// since the buffer starts zeroed and is never reused, every block is
/// zero-filled (which keeps `calloc` honest for free).
pub struct BootstrapArena<const N: usize = ARENA_SIZE> {
    buf:    UnsafeCell<Buffer<N>>,
    // High-water mark. Has its own lock, unrelated to the registry's.
    used:   Mutex<usize>,
}

// The buffer is only written through disjoint, lock-protected ranges.
unsafe impl<const N: usize> Sync for BootstrapArena<N> {}

impl<const N: usize> BootstrapArena<N> {
    pub const fn new() -> Self {
        Self {
            buf:    UnsafeCell::new(Buffer([0; N])),
            used:   Mutex::new(0),
        }
    }

    #[inline(always)]
    fn base(&self) -> *mut u8 {
        self.buf.get().cast::<u8>()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes consumed so far, headers and padding included.
    pub fn used(&self) -> usize {
        *self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `calloc`-shaped request. Null when `n * size` overflows or does not
    /// fit in what is left.
    pub fn alloc(&self, n: usize, size: usize) -> *mut u8 {
        match n.checked_mul(size) {
            Some(bytes) => self.alloc_aligned(HEADER, bytes),
            None        => ptr::null_mut(),
        }
    }

    /// Null when `align` is not a power of two, or when out of space.
    pub fn alloc_aligned(&self, align: usize, size: usize) -> *mut u8 {
        if !align.is_power_of_two() {
            return ptr::null_mut();
        }
        let align = align.max(HEADER);
        let base = self.base();
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);

        // Work on addresses for the alignment, on offsets for everything else.
        let Some(min_start) = (base as usize)
            .checked_add(*used)
            .and_then(|a| a.checked_add(HEADER)) else {
            return ptr::null_mut();
        };
        let Some(start) = min_start.checked_next_multiple_of(align) else {
            return ptr::null_mut();
        };
        let offset = start - base as usize;
        match offset.checked_add(size) {
            Some(end) if end <= N   => {
                *used = end;
                // SAFETY: `offset - size_of::<usize>() >= *used_before`, so
                // both the header and the block lie in unclaimed territory.
                unsafe {
                    let block = base.add(offset);
                    block.sub(size_of::<usize>()).cast::<usize>().write(size);
                    block
                }
            },
            _                       => ptr::null_mut(),
        }
    }

    pub fn contains<T>(&self, p: *const T) -> bool {
        let start = self.base() as usize;
        let a = p as usize;
        a >= start && a < start + N
    }

    /// Requested size of a block handed out by this arena.
    ///
    /// # Safety
    ///
    /// `p` must have been returned by this very arena.
    pub unsafe fn block_size(&self, p: *const u8) -> usize {
        p.sub(size_of::<usize>()).cast::<usize>().read()
    }

    /// `realloc` without ever giving memory back: a fresh block is carved
    /// and the old contents copied over.
    ///
    /// # Safety
    ///
    /// `p` must be null or a block of this arena.
    pub unsafe fn realloc(&self, p: *mut u8, size: usize) -> *mut u8 {
        let fresh = self.alloc(1, size);
        if !p.is_null() && !fresh.is_null() {
            let keep = self.block_size(p).min(size);
            ptr::copy_nonoverlapping(p, fresh, keep);
        }

        fresh
    }
}

impl<const N: usize> Default for BootstrapArena<N> {
    fn default() -> Self {
        Self::new()
    }
}
