//! Process-wide string interning.
//!
//! Task names and workspace paths occur repeatedly in the graph, the cache
//! keys, and the scheduler's inner loop. Interning maps each distinct byte
//! sequence to a small stable [`Symbol`] handle, so equality is a single
//! integer comparison. The pool is append-only and lives for the whole
//! process; handles are never invalidated.

use std::collections::HashMap;
use std::fmt;
use std::sync::{LazyLock, RwLock};

/// A handle into the global interning pool.
///
/// `Symbol` is `Copy` and compares by handle. When an order is needed
/// (stable plan output, lexicographic tie-breaking) it compares by the
/// underlying byte sequence, not by insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

struct Pool {
    index: HashMap<&'static str, Symbol>,
    strings: Vec<&'static str>,
}

static POOL: LazyLock<RwLock<Pool>> = LazyLock::new(|| {
    RwLock::new(Pool {
        index: HashMap::new(),
        strings: Vec::new(),
    })
});

/// Intern a string, returning its stable handle.
///
/// Interning the same byte sequence twice returns the same handle. The
/// backing storage is leaked intentionally; the pool is never torn down.
pub fn intern(s: &str) -> Symbol {
    {
        let pool = POOL.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(&sym) = pool.index.get(s) {
            return sym;
        }
    }

    let mut pool = POOL.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    // A racing writer may have interned it between the two locks.
    if let Some(&sym) = pool.index.get(s) {
        return sym;
    }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    #[allow(clippy::cast_possible_truncation)]
    let sym = Symbol(pool.strings.len() as u32);
    pool.strings.push(leaked);
    pool.index.insert(leaked, sym);
    sym
}

impl Symbol {
    /// Intern a string. Convenience alias for [`intern`].
    #[must_use]
    pub fn new(s: &str) -> Self {
        intern(s)
    }

    /// The interned string this handle refers to.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        let pool = POOL.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        pool.strings[self.0 as usize]
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.0 == other.0 {
            std::cmp::Ordering::Equal
        } else {
            self.as_str().cmp(other.as_str())
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        intern(s)
    }
}
