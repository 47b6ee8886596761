//! `LD_PRELOAD`-able leak finder. Exports the C allocation functions and
//! hands every call to the tracking engine of `leakcore`.
//!
//! ```text
//! MEMLEAK_CONFIG=/tmp/memleakconfig.txt LD_PRELOAD=libmemleak.so ./app &
//! kill -USR2 $!
//! ```

#[allow(non_camel_case_types)]
pub mod ffi;
mod genuine;
mod core;
mod trigger;

pub use trigger::memleak_report;
