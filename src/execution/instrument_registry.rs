use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use super::instrument_book::InstrumentBook;
use crate::config::InstrumentConfig;
use crate::error::BookError;

/// Books keyed by symbol
///
/// Configured books are created up front; symbols first seen on the account
/// feeds get an untracked book on demand.
#[derive(Default)]
pub struct InstrumentRegistry {
    books: BTreeMap<String, InstrumentBook>,
}

/// Registry handle shared by the loader, the feed router and executors
pub type SharedRegistry = Arc<RwLock<InstrumentRegistry>>;

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One book per configured instrument; any invalid entry aborts construction
    pub fn from_config(instruments: &[InstrumentConfig]) -> Result<Self, BookError> {
        let mut registry = Self::new();
        for config in instruments {
            if registry.books.contains_key(&config.symbol) {
                return Err(BookError::fatal_init(
                    &config.symbol,
                    "instrument configured twice",
                ));
            }
            let book = InstrumentBook::new(config.clone())?;
            info!(symbol = %config.symbol, intervals = ?config.intervals, "instrument book created");
            registry.books.insert(config.symbol.clone(), book);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, book: InstrumentBook) {
        self.books.insert(book.symbol().to_string(), book);
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentBook> {
        self.books.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut InstrumentBook> {
        self.books.get_mut(symbol)
    }

    /// Existing book, or a fresh untracked one
    pub fn get_or_create(&mut self, symbol: &str) -> &mut InstrumentBook {
        self.books.entry(symbol.to_string()).or_insert_with(|| {
            info!(symbol = %symbol, "creating untracked instrument book");
            InstrumentBook::untracked(symbol)
        })
    }

    pub fn require(&self, symbol: &str) -> Result<&InstrumentBook, BookError> {
        self.get(symbol)
            .ok_or_else(|| BookError::UnknownInstrument(symbol.to_string()))
    }

    pub fn require_mut(&mut self, symbol: &str) -> Result<&mut InstrumentBook, BookError> {
        self.get_mut(symbol)
            .ok_or_else(|| BookError::UnknownInstrument(symbol.to_string()))
    }

    /// Symbols in sorted order
    pub fn symbols(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    pub fn books(&self) -> impl Iterator<Item = &InstrumentBook> {
        self.books.values()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }
}

pub fn read_registry(shared: &SharedRegistry) -> Result<RwLockReadGuard<'_, InstrumentRegistry>, BookError> {
    shared.read().map_err(|_| BookError::LockPoisoned)
}

pub fn write_registry(shared: &SharedRegistry) -> Result<RwLockWriteGuard<'_, InstrumentRegistry>, BookError> {
    shared.write().map_err(|_| BookError::LockPoisoned)
}
