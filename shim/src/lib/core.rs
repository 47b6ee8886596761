use leakcore::bootstrap::ARENA_SIZE;
use leakcore::Interceptor;
use crate::ffi::*;
use crate::genuine;

/// The one tracking engine of the process.
pub static ENGINE: Interceptor<ARENA_SIZE> = Interceptor::new(genuine::resolve);

#[no_mangle]
/// Function interposition is used to catch all dynamic memory
/// allocation functions of the host process.
///
/// Every call is forwarded to the genuine allocator, then recorded
/// (or forgotten) by the engine. Calls made while the engine is doing
/// its own bookkeeping, or made by the report thread, are forwarded
/// untouched. Until `dlsym` has found the genuine functions, requests
/// are served from a static arena.
///
/// This logic holds across all 7 supported functions.
unsafe extern "C"
fn malloc(size: size_t) -> *mut void {
    ENGINE.malloc(size)
}

#[no_mangle]
unsafe extern "C"
fn free(p: *mut void) {
    ENGINE.free(p)
}

#[no_mangle]
unsafe extern "C"
fn calloc(nobj: size_t, size: size_t) -> *mut void {
    ENGINE.calloc(nobj, size)
}

#[no_mangle]
unsafe extern "C"
fn realloc(p: *mut void, size: size_t)  -> *mut void {
    ENGINE.realloc(p, size)
}

#[no_mangle]
unsafe extern "C"
fn aligned_alloc(alignment: size_t, size: size_t)  -> *mut void {
    ENGINE.aligned_alloc(alignment, size)
}

#[no_mangle]
unsafe extern "C"
fn memalign(alignment: size_t, size: size_t)  -> *mut void {
    ENGINE.memalign(alignment, size)
}

#[no_mangle]
unsafe extern "C"
fn posix_memalign(memptr: *mut *mut void, alignment: size_t, size: size_t)  -> int {
    ENGINE.posix_memalign(memptr, alignment, size)
}
