use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::{DashMap, mapref::entry::Entry};
use once_cell::sync::Lazy;

// Process-wide intern table: name -> id, id -> name.
struct SymbolTable {
    ids: DashMap<Arc<str>, u32>,
    names: RwLock<Vec<Arc<str>>>,
}

static SYMBOLS: Lazy<SymbolTable> = Lazy::new(|| SymbolTable {
    ids: DashMap::new(),
    names: RwLock::new(Vec::new()),
});

/// Interned method or attribute name.
///
/// Two symbols are equal exactly when they were interned from the same text, so
/// guards compare names with a single integer comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn intern(name: &str) -> Self {
        if let Some(id) = SYMBOLS.ids.get(name) {
            return Symbol(*id);
        }
        match SYMBOLS.ids.entry(Arc::from(name)) {
            Entry::Occupied(slot) => Symbol(*slot.get()),
            Entry::Vacant(slot) => {
                let mut names = SYMBOLS.names.write().unwrap_or_else(PoisonError::into_inner);
                let id = names.len() as u32;
                names.push(slot.key().clone());
                slot.insert(id);
                Symbol(id)
            }
        }
    }

    /// The interned text of this symbol.
    pub fn name(self) -> Arc<str> {
        let names = SYMBOLS.names.read().unwrap_or_else(PoisonError::into_inner);
        names
            .get(self.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from("<unknown symbol>"))
    }

    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::intern(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.name())
    }
}
