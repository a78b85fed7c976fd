// src/exec/store.rs

//! Per-slot data stores ("whiteboard").
//!
//! Each slot owns one [`EventStore`]; algorithms read their inputs from and
//! write their outputs to the store of the slot their event sits in. The
//! store is wiped when the slot takes a new event.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub type Product = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct EventStore {
    products: RwLock<HashMap<String, Product>>,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&String> = products.keys().collect();
        keys.sort();
        f.debug_struct("EventStore").field("products", &keys).finish()
    }
}

impl EventStore {
    pub fn put(&self, key: impl Into<String>, value: Product) {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Product> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Typed read; `None` if missing or of another type.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|p| p.downcast::<T>().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// One [`EventStore`] per slot.
#[derive(Debug)]
pub struct Whiteboard {
    stores: Vec<EventStore>,
}

impl Whiteboard {
    pub fn new(slots: usize) -> Self {
        Self {
            stores: (0..slots).map(|_| EventStore::default()).collect(),
        }
    }

    pub fn slots(&self) -> usize {
        self.stores.len()
    }

    /// Store of `slot`; out-of-range slots fall back to slot 0.
    pub fn select_store(&self, slot: usize) -> &EventStore {
        self.stores.get(slot).unwrap_or(&self.stores[0])
    }

    pub fn clear(&self, slot: usize) {
        if let Some(store) = self.stores.get(slot) {
            store.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_are_isolated_per_slot() {
        let board = Whiteboard::new(2);
        board.select_store(0).put("tracks", Arc::new(3usize));

        assert!(board.select_store(0).contains("tracks"));
        assert!(!board.select_store(1).contains("tracks"));
        assert_eq!(*board.select_store(0).get_as::<usize>("tracks").unwrap(), 3);
        assert!(board.select_store(0).get_as::<String>("tracks").is_none());
    }

    #[test]
    fn clear_empties_one_slot() {
        let board = Whiteboard::new(2);
        board.select_store(0).put("a", Arc::new(()));
        board.select_store(1).put("a", Arc::new(()));

        board.clear(0);

        assert!(board.select_store(0).is_empty());
        assert_eq!(board.select_store(1).len(), 1);
    }
}
