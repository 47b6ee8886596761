use std::fmt;

/// Deepest stack kept per allocation.
pub const MAX_DEPTH: usize = 32;

/// Return addresses of one call stack, innermost first. Stored inline and
/// copied by value: capturing must not allocate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CapturedStack {
    frames: [usize; MAX_DEPTH],
    count:  u8,
}

impl CapturedStack {
    pub const fn empty() -> Self {
        Self { frames: [0; MAX_DEPTH], count: 0 }
    }

    /// Builds a stack out of known addresses, keeping at most
    /// [`MAX_DEPTH`] of them.
    pub fn from_frames(ips: &[usize]) -> Self {
        let mut res = Self::empty();
        for ip in ips.iter().take(MAX_DEPTH) {
            res.push(*ip);
        }

        res
    }

    #[inline(always)]
    fn push(&mut self, ip: usize) -> bool {
        if (self.count as usize) < MAX_DEPTH {
            self.frames[self.count as usize] = ip;
            self.count += 1;
            true
        } else { false }
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.count as usize]
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for CapturedStack {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for CapturedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for ip in self.frames() {
            list.entry(&format_args!("{ip:#x}"));
        }
        list.finish()
    }
}

/// Walks the calling thread's stack outwards and records up to `max_depth`
/// return addresses (never more than [`MAX_DEPTH`]). No symbol lookup
/// happens here; that is deferred to report time.
///
/// An empty result means the unwinder gave up, and the caller should
/// simply not track the allocation.
#[inline(never)]
pub fn capture(max_depth: usize) -> CapturedStack {
    let limit = max_depth.min(MAX_DEPTH);
    let mut stack = CapturedStack::empty();
    if limit == 0 {
        return stack;
    }
    // SAFETY: the synchronized flavour serializes every capturing thread
    // on one global lock. Unwinding through libgcc/libunwind on the
    // platforms we interpose on is thread-safe, so we skip that lock.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            let ip = frame.ip() as usize;
            if ip == 0 {
                return false;
            }
            stack.push(ip) && stack.len() < limit
        });
    }

    stack
}
