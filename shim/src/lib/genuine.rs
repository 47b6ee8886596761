use std::ffi::CStr;
use std::mem;
use leakcore::{Genuine, LeakError};
use crate::ffi::*;

unsafe fn lookup<F: Copy>(name: &'static CStr) -> Result<F, LeakError> {
    //! Next definition of `name` in lookup order, i.e. the one our own
    //! export shadows. `dlsym` may call `calloc`, which then lands in
    //! the bootstrap arena.
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut void>());
    clear_dlerror();
    let address = dlsym(RTLD_NEXT, name.as_ptr());
    if address.is_null() {
        return Err(LeakError::Unresolved(name));
    }

    Ok(mem::transmute_copy::<*mut void, F>(&address))
}

unsafe fn required<F: Copy>(name: &'static CStr) -> Result<F, LeakError> {
    lookup(name).inspect_err(|_| {
        print_dlerror();
    })
}

/// Resolves every function we interpose. Nothing here may allocate on its
/// own behalf, nor log: it runs before there is a heap to speak of.
pub fn resolve() -> Result<Genuine, LeakError> {
    unsafe {
        let genuine = Genuine {
            malloc:         required(c"malloc")?,
            calloc:         required(c"calloc")?,
            realloc:        required(c"realloc")?,
            memalign:       required(c"memalign")?,
            // Missing from older C libraries.
            aligned_alloc:  lookup(c"aligned_alloc").ok(),
            posix_memalign: required(c"posix_memalign")?,
            free:           required(c"free")?,
        };
        clear_dlerror();

        Ok(genuine)
    }
}
