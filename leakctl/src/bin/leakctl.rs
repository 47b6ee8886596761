use std::ffi::OsString;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{self, Command};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use leakcore::config::{self, parse_signal, ENV_AT_EXIT, ENV_CONFIG, ENV_OUTPUT, ENV_SIGNAL};
use leakcore::{StackFilter, FILTER_SIZE};

/// Driver for the `LD_PRELOAD` leak finder
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd:    Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run a program with the leak finder preloaded
    Run {
        /// Path to libmemleak.so
        #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
        preload:    PathBuf,

        /// Allow-list file
        #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
        config:     Option<PathBuf>,

        /// Append reports here instead of stderr
        #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
        output:     Option<PathBuf>,

        /// Signal that triggers a report
        #[arg(short, long, value_parser = parse_signal)]
        signal:     Option<libc::c_int>,

        /// Also report when the program exits
        #[arg(long)]
        at_exit:    bool,

        /// Program and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command:    Vec<OsString>,
    },
    /// Ask a running, preloaded process for a report
    Report {
        pid:        libc::pid_t,

        #[arg(short, long, value_parser = parse_signal, default_value_t = config::DEFAULT_SIGNAL)]
        signal:     libc::c_int,
    },
    /// Write an allow-list: only leaks with a frame in one of these
    /// modules get reported
    Filter {
        #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
        #[arg(default_value = config::DEFAULT_CONFIG)]
        config:     PathBuf,

        /// Module path fragments, e.g. `libfoo.so`
        #[arg(required = true)]
        modules:    Vec<String>,
    },
}

fn run(
    preload:    PathBuf,
    config:     Option<PathBuf>,
    output:     Option<PathBuf>,
    signal:     Option<libc::c_int>,
    at_exit:    bool,
    command:    Vec<OsString>,
) -> Result<i32> {
    let preload = preload
        .canonicalize()
        .with_context(|| format!("cannot find {}", preload.display()))?;
    let Some((program, args)) = command.split_first() else {
        bail!("nothing to run");
    };

    let mut ld_preload = OsString::from(preload);
    if let Some(prev) = std::env::var_os("LD_PRELOAD").filter(|p| !p.is_empty()) {
        ld_preload.push(":");
        ld_preload.push(prev);
    }
    let mut child = Command::new(program);
    child.args(args).env("LD_PRELOAD", ld_preload);
    if let Some(config) = config {
        child.env(ENV_CONFIG, config);
    }
    if let Some(output) = output {
        child.env(ENV_OUTPUT, output);
    }
    if let Some(signal) = signal {
        child.env(ENV_SIGNAL, signal.to_string());
    }
    if at_exit {
        child.env(ENV_AT_EXIT, "1");
    }

    let status = child
        .status()
        .with_context(|| format!("cannot run {program:?}"))?;

    Ok(match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(s)) => 128 + s,
        (None, None)    => 1,
    })
}

fn report(pid: libc::pid_t, signal: libc::c_int) -> Result<()> {
    if pid <= 0 {
        bail!("refusing to signal pid {pid}");
    }
    if unsafe { libc::kill(pid, signal) } < 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("cannot signal {pid}"));
    }

    Ok(())
}

fn filter(config: PathBuf, modules: Vec<String>) -> Result<()> {
    let tokens: Vec<&str> = modules.iter().flat_map(|m| m.split_whitespace()).collect();
    let filter = StackFilter::from_tokens(tokens.iter().copied());
    if tokens.len() > filter.len() {
        eprintln!("repeats dropped, only the first {FILTER_SIZE} entries are read");
    }
    let mut text = filter.entries().collect::<Vec<_>>().join("\n");
    text.push('\n');
    fs::write(&config, text).with_context(|| format!("cannot write {}", config.display()))?;
    println!("{} entries written to {}", filter.len(), config.display());

    Ok(())
}

fn main() -> Result<()> {
    match Args::parse().cmd {
        Cmd::Run { preload, config, output, signal, at_exit, command } => {
            let code = run(preload, config, output, signal, at_exit, command)?;
            process::exit(code);
        },
        Cmd::Report { pid, signal }     => report(pid, signal),
        Cmd::Filter { config, modules } => filter(config, modules),
    }
}
