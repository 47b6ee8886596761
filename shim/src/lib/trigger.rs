//! Report triggering. A signal handler can't take the tracking lock (the
//! interrupted thread may hold it) nor allocate, so all it does is write
//! one byte to a pipe. A dedicated thread, with tracking suppressed for
//! its whole life, sleeps on the other end and runs the report.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read};
use std::os::fd::{FromRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::{mem, ptr, thread};
use env_logger::Env;
use log::{debug, error, info};
use once_cell::sync::OnceCell;
use leakcore::config::ENV_LOG;
use leakcore::{guard, DlAddr, LeakError, ReportSummary, Settings};
use crate::core::ENGINE;
use crate::ffi::*;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// Write end of the wake-up pipe; -1 until the listener runs.
static WAKE: AtomicI32 = AtomicI32::new(-1);

#[used]
#[link_section = ".init_array"]
static INIT: extern "C" fn() = init;

extern "C" fn init() {
    // Done here, before `main`, so the bootstrap window stays short.
    ENGINE.resolve();
    guard::with_guard(|| {
        init_logger();
        let settings = settings();
        debug!("{settings:?}");
        if let Err(e) = listen(settings.signal) {
            error!("no signal-triggered reports: {e}");
        }
        if settings.report_at_exit {
            unsafe { libc::atexit(at_exit); }
        }
    });
}

fn init_logger() {
    let _ = env_logger::Builder::from_env(Env::default().filter_or(ENV_LOG, "warn"))
        .format_timestamp(None)
        .try_init();
}

fn settings() -> &'static Settings {
    SETTINGS.get_or_init(Settings::from_env)
}

fn listen(signal: int) -> io::Result<()> {
    let mut fds: [RawFd; 2] = [-1; 2];
    unsafe {
        if libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
        // A full pipe already means "report pending"; the handler must
        // never block on it.
        let flags = libc::fcntl(fds[1], libc::F_GETFL);
        libc::fcntl(fds[1], libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
    let rx = unsafe { File::from_raw_fd(fds[0]) };
    thread::Builder::new()
        .name("memleak-report".into())
        .spawn(move || serve(rx))?;
    WAKE.store(fds[1], Ordering::Release);

    unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut sa.sa_mask as *mut libc::sigset_t);
        sa.sa_flags = libc::SA_RESTART;
        sa.sa_sigaction = on_signal as usize;
        if libc::sigaction(signal, &sa, ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    debug!("reports on signal {signal}");

    Ok(())
}

extern "C" fn on_signal(_: int) {
    //! Async-signal-safe: one `write`, errno preserved.
    let fd = WAKE.load(Ordering::Acquire);
    if fd < 0 {
        return;
    }
    let saved = io::Error::last_os_error().raw_os_error().unwrap_or(0);
    unsafe {
        libc::write(fd, [1u8].as_ptr().cast(), 1);
        set_errno(saved);
    }
}

fn serve(mut rx: File) {
    // Nothing this thread does is the application's doing.
    let _quiet = guard::suppress();
    // Signals arriving during a report collapse into the next one.
    let mut buf = [0u8; 64];
    loop {
        match rx.read(&mut buf) {
            Ok(0)   => break,
            Ok(_)   => emit(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)  => {
                error!("report trigger lost: {e}");
                break;
            }
        }
    }
}

fn write_report(settings: &Settings) -> Result<ReportSummary, LeakError> {
    match &settings.output {
        Some(path)  => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            ENGINE.report(&settings.filter_path, &DlAddr, &mut BufWriter::new(file))
        },
        None        => ENGINE.report(&settings.filter_path, &DlAddr, &mut io::stderr().lock()),
    }
}

fn emit() {
    guard::with_guard(|| {
        let settings = settings();
        match write_report(settings) {
            Ok(summary) => info!("{} leaks, {} bytes", summary.leaks, summary.bytes),
            Err(e)      => error!("leak report failed: {e}"),
        }
    });
}

extern "C" fn at_exit() {
    emit();
}

/// Writes a leak report right away, from the calling thread. For hosts
/// that would rather ask than signal.
#[no_mangle]
pub extern "C" fn memleak_report() {
    emit();
}
