//! Globally interned symbols.
//!
//! Symbols are process-wide: interning the same text twice yields the same
//! key, so symbol identity and symbol text equality coincide. The decoder
//! leans on this: a symbol read back from a stream is automatically the
//! same object as any live symbol with that spelling.

use std::fmt;

use lasso::{Spur, ThreadedRodeo};
use once_cell::sync::Lazy;

static SYMBOLS: Lazy<ThreadedRodeo> = Lazy::new(ThreadedRodeo::default);

/// An interned identifier. Cheap to copy and compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(Spur);

impl Symbol {
    pub fn new(text: &str) -> Symbol {
        Symbol(SYMBOLS.get_or_intern(text))
    }

    pub fn as_str(&self) -> &'static str {
        SYMBOLS.resolve(&self.0)
    }

    /// UTF-8 byte length of the symbol text.
    pub fn byte_len(&self) -> usize {
        self.as_str().len()
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.as_str())
    }
}
