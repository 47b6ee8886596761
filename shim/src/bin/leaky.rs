//! Leaks a few blocks of recognizable sizes, says `ready`, then idles
//! until stdin is closed. Meant to be run with `libmemleak.so` preloaded
//! and `leaky` in the allow-list.

use std::hint::black_box;
use std::io::{self, Read, Write};

fn main() -> io::Result<()> {
    unsafe {
        black_box(libc::malloc(12345));
        black_box(libc::calloc(7, 111));
        let moved = black_box(libc::malloc(64));
        black_box(libc::realloc(moved, 4321));
        let freed = black_box(libc::malloc(9999));
        libc::free(freed);
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "ready")?;
    stdout.flush()?;
    drop(stdout);

    let mut sink = Vec::new();
    io::stdin().read_to_end(&mut sink)?;

    Ok(())
}
