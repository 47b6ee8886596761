// C-reminiscent types.
pub type size_t     = libc::size_t;
pub type void       = libc::c_void;
pub type int        = libc::c_int;

// Type aliases for the several interposed functions.
pub type CMalloc        = unsafe extern "C" fn(size_t)                              -> *mut void;
pub type CFree          = unsafe extern "C" fn(*mut void);
pub type CCalloc        = unsafe extern "C" fn(nobj: size_t, size: size_t)          -> *mut void;
pub type CRealloc       = unsafe extern "C" fn(p: *mut void, size: size_t)          -> *mut void;
pub type CAlignedAlloc  = unsafe extern "C" fn(alignment: size_t, size: size_t)     -> *mut void;
pub type CMemalign      = unsafe extern "C" fn(align: size_t, size: size_t)         -> *mut void;
pub type CPosixMemalign = unsafe extern "C" fn( memptr: *mut *mut void,
                                                align:  size_t,
                                                size:   size_t)                     -> int;

// `libc` does not export these two on every target we care about.
#[link(name = "c")]
extern "C" {
    pub fn memalign(align: size_t, size: size_t) -> *mut void;
    pub fn aligned_alloc(alignment: size_t, size: size_t) -> *mut void;
}

#[inline(always)]
pub unsafe fn set_errno(code: int) {
    //! Allocation failures served by the tracker itself must look
    //! exactly like the ones reported by the real allocator.
    #[cfg(target_os = "android")]
    { *libc::__errno() = code; }
    #[cfg(not(target_os = "android"))]
    { *libc::__errno_location() = code; }
}
