use std::fs;
use std::process::Command;

fn leakctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_leakctl"))
}

#[test]
fn filter_writes_one_module_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("memleakconfig.txt");
    let out = leakctl()
        .args(["filter", "--config"])
        .arg(&cfg)
        .args(["libfoo.so", "libbar.so libfoo.so", "libbaz"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(fs::read_to_string(&cfg).unwrap(), "libfoo.so\nlibbar.so\nlibbaz\n");
}

#[test]
fn run_passes_the_exit_code_through() {
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("libmemleak.so");
    fs::write(&fake, b"").unwrap();
    let status = leakctl()
        .args(["run", "--preload"])
        .arg(&fake)
        .args(["--", "sh", "-c", "exit 3"])
        .env_remove("LD_PRELOAD")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));
}

#[test]
fn report_rejects_bad_input() {
    assert!(!leakctl().args(["report", "0"]).status().unwrap().success());
    assert!(!leakctl().args(["report", "1", "--signal", "KILL"]).status().unwrap().success());
}
