//! Runtime settings. Read once, from the environment, when the shim is
//! loaded; the allow-list file they point to is re-read on every report.

use std::env;
use std::path::PathBuf;
use log::warn;
use crate::error::LeakError;

pub const ENV_CONFIG:   &str = "MEMLEAK_CONFIG";
pub const ENV_OUTPUT:   &str = "MEMLEAK_OUTPUT";
pub const ENV_SIGNAL:   &str = "MEMLEAK_SIGNAL";
pub const ENV_AT_EXIT:  &str = "MEMLEAK_AT_EXIT";
pub const ENV_LOG:      &str = "MEMLEAK_LOG";

#[cfg(target_os = "android")]
pub const DEFAULT_CONFIG: &str = "/data/local/tmp/memleakconfig.txt";
#[cfg(not(target_os = "android"))]
pub const DEFAULT_CONFIG: &str = "/tmp/memleakconfig.txt";

pub const DEFAULT_SIGNAL: libc::c_int = libc::SIGUSR2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Allow-list file.
    pub filter_path:    PathBuf,
    /// Report destination, appended to. `None` means stderr.
    pub output:         Option<PathBuf>,
    /// Signal that triggers a report.
    pub signal:         libc::c_int,
    /// Also report when the process exits.
    pub report_at_exit: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filter_path:    PathBuf::from(DEFAULT_CONFIG),
            output:         None,
            signal:         DEFAULT_SIGNAL,
            report_at_exit: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Bad values are logged and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut res = Self::default();
        if let Some(path) = lookup(ENV_CONFIG).filter(|s| !s.is_empty()) {
            res.filter_path = PathBuf::from(path);
        }
        res.output = lookup(ENV_OUTPUT)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        if let Some(raw) = lookup(ENV_SIGNAL) {
            match parse_signal(&raw) {
                Ok(sig) => { res.signal = sig; },
                Err(e)  => { warn!("{e}, using signal {DEFAULT_SIGNAL}"); }
            }
        }
        if let Some(raw) = lookup(ENV_AT_EXIT) {
            match parse_flag(&raw) {
                Ok(on)  => { res.report_at_exit = on; },
                Err(e)  => { warn!("{e}, at-exit report disabled"); }
            }
        }

        res
    }
}

/// A signal number, or one of the names of the user-defined signals.
pub fn parse_signal(raw: &str) -> Result<libc::c_int, LeakError> {
    let bad = || LeakError::Setting { key: ENV_SIGNAL, value: raw.to_owned() };
    let raw = raw.trim();
    let sig = match raw.trim_start_matches("SIG") {
        "USR1"  => libc::SIGUSR1,
        "USR2"  => libc::SIGUSR2,
        num     => num.parse().map_err(|_| bad())?,
    };
    // KILL and STOP can't be caught.
    if sig <= 0 || sig == libc::SIGKILL || sig == libc::SIGSTOP || sig >= 65 {
        return Err(bad());
    }

    Ok(sig)
}

fn parse_flag(raw: &str) -> Result<bool, LeakError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on"         => Ok(true),
        "0" | "false" | "no" | "off" | ""   => Ok(false),
        _                                   => Err(LeakError::Setting { key: ENV_AT_EXIT, value: raw.to_owned() }),
    }
}
