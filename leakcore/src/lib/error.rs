use std::collections::TryReserveError;
use std::ffi::CStr;
use std::io;
use std::path::PathBuf;
pub use thiserror::Error;

/// Everything that can go wrong inside the tracker. None of these ever
/// reach the monitored application: the interception paths swallow them
/// and only the reporter surfaces them, through the log.
#[derive(Error, Debug)]
pub enum LeakError {
    #[error("cannot read filter configuration {path:?}: {source}")]
    Config {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("report output failed: {0}")]
    Output(#[from] io::Error),

    #[error("bookkeeping allocation failed: {0}")]
    Bookkeeping(#[from] TryReserveError),

    #[error("registry is full ({0} records)")]
    Capacity(usize),

    #[error("genuine {0:?} could not be resolved")]
    Unresolved(&'static CStr),

    #[error("invalid value {value:?} for {key}")]
    Setting {
        key:    &'static str,
        value:  String,
    },
}
