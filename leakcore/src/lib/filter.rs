use std::fs;
use std::io;
use std::path::Path;
use indexmap::IndexSet;
use log::{debug, warn};
use crate::error::LeakError;
use crate::stack::CapturedStack;
use crate::symbols::Symbolizer;

/// Most tokens kept from the configuration file.
pub const FILTER_SIZE: usize = 16;

/// Allow-list of module path substrings. A stack is reported only if one
/// of its frames lives in a module whose path contains one of these.
/// Stacks that don't match are *not* reported, which is the opposite of
/// a suppression list; empty means nothing is reported at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackFilter {
    entries: IndexSet<String>,
}

impl StackFilter {
    /// Reads at most [`FILTER_SIZE`] non-empty tokens; the rest are
    /// ignored. Repeats among them are kept once, in first-seen order.
    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let entries = tokens
            .into_iter()
            .filter_map(|t| {
                let t = t.as_ref().trim();
                (!t.is_empty()).then(|| t.to_owned())
            })
            .take(FILTER_SIZE)
            .collect::<IndexSet<_>>();

        Self { entries }
    }

    /// Whitespace and newlines both separate tokens.
    pub fn parse(text: &str) -> Self {
        Self::from_tokens(text.split_whitespace())
    }

    pub fn load(path: &Path) -> Result<Self, LeakError> {
        let text = fs::read_to_string(path).map_err(|source| LeakError::Config {
            path: path.to_owned(),
            source,
        })?;
        let res = Self::parse(&text);
        for token in res.entries() {
            debug!("filter token {token:?} (from {})", path.display());
        }

        Ok(res)
    }

    /// Replaces the current set with the contents of `path`. A missing or
    /// unreadable file leaves the filter empty.
    pub fn reload(&mut self, path: &Path) {
        *self = match Self::load(path) {
            Ok(f)   => f,
            Err(e)  => {
                match &e {
                    LeakError::Config { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                        warn!("no filter configuration at {}, nothing will be reported", path.display());
                    },
                    _ => { warn!("{e}, nothing will be reported"); }
                }
                Self::default()
            }
        };
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any frame's module path contains any entry. Frames that
    /// can't be resolved never match.
    pub fn matches(&self, stack: &CapturedStack, symbolizer: &dyn Symbolizer) -> bool {
        if self.is_empty() {
            return false;
        }
        stack.frames()
            .iter()
            .filter_map(|ip| symbolizer.module(*ip))
            .any(|module| self.entries().any(|e| module.contains(e)))
    }
}
