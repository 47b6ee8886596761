pub use leakcore::ffi::*;

pub type char = libc::c_char;

// Linux utils.
pub use libc::{
    RTLD_NEXT,
    dlsym,
    dlerror,
    fputs,
};

pub unsafe fn print_dlerror() -> bool {
    //! Prints the pending `dlsym` error, if any, on stderr. Must not
    //! allocate: the genuine allocator may not be known yet.
    use libc_stdhandle::stderr;

    let eptr: *mut char = dlerror();
    if eptr.is_null() {
        return false;
    }
    fputs(eptr as *const char, stderr());
    fputs(c"\n".as_ptr(), stderr());

    true
}

pub unsafe fn clear_dlerror() {
    let _ = dlerror();
}
