//! Core of the leak finder: everything that can live outside of the
//! `LD_PRELOAD`-ed shim. The shim only exports the C symbols and hands
//! every call to an [`Interceptor`](intercept::Interceptor).
//!
//! Data flows one way during normal operation (interceptor → stack
//! capture → registry) and the other way on demand (registry → stack
//! filter → symbolication → report text).

/// C-reminiscent types and the signatures of the interposed functions.
#[allow(non_camel_case_types)]
pub mod ffi;

pub mod error;

/// Per-thread "don't track me" flag.
pub mod guard;

pub mod stack;

/// Static arena serving requests until the genuine allocator is known.
pub mod bootstrap;

pub mod registry;

pub mod symbols;

pub mod filter;

pub mod tracker;

mod report;

pub mod config;

/// The allocation entry points, minus the `#[no_mangle]`.
pub mod intercept;

pub use bootstrap::BootstrapArena;
pub use config::Settings;
pub use error::LeakError;
pub use filter::{StackFilter, FILTER_SIZE};
pub use intercept::{Genuine, Interceptor};
pub use registry::Registry;
pub use report::ReportSummary;
pub use stack::{capture, CapturedStack, MAX_DEPTH};
pub use symbols::{DlAddr, Symbol, Symbolizer};
pub use tracker::{AllocationRecord, Stats, Tracker};
