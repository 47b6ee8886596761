use std::ffi::{c_void, CStr};
use std::mem::MaybeUninit;
use libc::{c_char, dladdr, Dl_info};

/// What a code address resolves to. Either half may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Symbol {
    /// Path of the loaded object (executable or shared library).
    pub module: Option<String>,
    /// Nearest symbol, demangled when possible.
    pub name:   Option<String>,
}

/// Address → {module, symbol} lookup, used by the stack filter and the
/// reporter. Only ever called with tracking suppressed.
pub trait Symbolizer {
    fn symbolicate(&self, ip: usize) -> Symbol;

    /// Module lookup alone; the filter doesn't need symbol names.
    fn module(&self, ip: usize) -> Option<String> {
        self.symbolicate(ip).module
    }

    /// The module the tracker itself lives in, if known. Leading frames
    /// from it are capture machinery and get trimmed from reports.
    fn own_module(&self) -> Option<String> {
        None
    }
}

/// Dynamic-linker based lookup (`dladdr`), falling back to the debug
/// info reader of the `backtrace` crate for symbols that aren't exported.
#[derive(Clone, Copy, Debug, Default)]
pub struct DlAddr;

impl DlAddr {
    fn info(ip: usize) -> Option<Dl_info> {
        let mut info = MaybeUninit::<Dl_info>::zeroed();
        // SAFETY: `dladdr` only inspects the loader's bookkeeping and
        // fills `info` on success.
        match unsafe { dladdr(ip as *const c_void, info.as_mut_ptr()) } {
            0   => None,
            _   => Some(unsafe { info.assume_init() }),
        }
    }
}

fn owned(s: *const c_char, demangle: bool) -> Option<String> {
    if s.is_null() {
        return None;
    }
    // SAFETY: non-null strings in `Dl_info` point into loader-owned,
    // NUL-terminated memory that outlives this call.
    let bytes = unsafe { CStr::from_ptr(s) }.to_bytes();
    match (bytes.is_empty(), demangle) {
        (true, _)       => None,
        (false, true)   => Some(backtrace::SymbolName::new(bytes).to_string()),
        (false, false)  => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

impl Symbolizer for DlAddr {
    fn symbolicate(&self, ip: usize) -> Symbol {
        let (module, mut name) = match Self::info(ip) {
            Some(info)  => (owned(info.dli_fname, false), owned(info.dli_sname, true)),
            None        => (None, None),
        };
        if name.is_none() {
            backtrace::resolve(ip as *mut c_void, |sym| {
                if name.is_none() {
                    name = sym.name().map(|n| n.to_string());
                }
            });
        }

        Symbol { module, name }
    }

    fn module(&self, ip: usize) -> Option<String> {
        Self::info(ip).and_then(|info| owned(info.dli_fname, false))
    }

    fn own_module(&self) -> Option<String> {
        self.module(crate::stack::capture as usize)
    }
}
