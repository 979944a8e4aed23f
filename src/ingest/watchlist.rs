//! Monitored-symbol lookup and NSE symbol ↔ exchange scrip-code mapping.
//!
//! The persistent store lives outside this crate; adapters only see the trait.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

#[async_trait]
pub trait WatchlistResolver: Send + Sync {
    /// Watchlist ∪ holdings, upper-case NSE symbols.
    async fn monitored_symbols(&self) -> Vec<String>;
    async fn code_for_symbol(&self, symbol: &str) -> Option<String>;
    async fn symbol_for_code(&self, code: &str) -> Option<String>;
    async fn upsert_mapping(&self, symbol: &str, code: &str);
}

#[derive(Debug, Default)]
struct Inner {
    symbols: BTreeSet<String>,
    code_by_symbol: HashMap<String, String>,
    symbol_by_code: HashMap<String, String>,
}

/// Process-local resolver, seeded from config.
#[derive(Debug, Default)]
pub struct InMemoryWatchlist {
    inner: RwLock<Inner>,
}

impl InMemoryWatchlist {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wl = Self::default();
        {
            let mut g = wl.inner.write();
            for s in symbols {
                let s = s.as_ref().trim().to_ascii_uppercase();
                if !s.is_empty() {
                    g.symbols.insert(s);
                }
            }
        }
        wl
    }

    pub fn with_mapping(self, symbol: &str, code: &str) -> Self {
        self.insert_mapping(symbol, code);
        self
    }

    fn insert_mapping(&self, symbol: &str, code: &str) {
        let symbol = symbol.trim().to_ascii_uppercase();
        let code = code.trim().to_string();
        if symbol.is_empty() || code.is_empty() {
            return;
        }
        let mut g = self.inner.write();
        // Drop stale reverse entries so both directions stay one-to-one.
        if let Some(old_code) = g.code_by_symbol.insert(symbol.clone(), code.clone()) {
            if old_code != code {
                g.symbol_by_code.remove(&old_code);
            }
        }
        if let Some(old_sym) = g.symbol_by_code.insert(code, symbol.clone()) {
            if old_sym != symbol {
                g.code_by_symbol.remove(&old_sym);
            }
        }
    }
}

#[async_trait]
impl WatchlistResolver for InMemoryWatchlist {
    async fn monitored_symbols(&self) -> Vec<String> {
        self.inner.read().symbols.iter().cloned().collect()
    }

    async fn code_for_symbol(&self, symbol: &str) -> Option<String> {
        self.inner
            .read()
            .code_by_symbol
            .get(&symbol.trim().to_ascii_uppercase())
            .cloned()
    }

    async fn symbol_for_code(&self, code: &str) -> Option<String> {
        self.inner.read().symbol_by_code.get(code.trim()).cloned()
    }

    async fn upsert_mapping(&self, symbol: &str, code: &str) {
        self.insert_mapping(symbol, code);
    }
}
