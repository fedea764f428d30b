//! Dense slot storage for enhanced symbols.
//!
//! Symbols live in a slot vector with an id-to-slot map on the side. `remove`
//! tombstones the slot so `get` reports absent and iteration skips it; freed
//! slots are reused by later inserts.

use crate::symbol::EnhancedSymbol;
use crate::types::SymbolId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SymbolStore {
    slots: Vec<Option<EnhancedSymbol>>,
    index: HashMap<SymbolId, u32>,
    free: Vec<u32>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Insert or replace the symbol stored under its id.
    pub fn insert(&mut self, symbol: EnhancedSymbol) {
        let id = symbol.id;
        if let Some(&slot) = self.index.get(&id) {
            self.slots[slot as usize] = Some(symbol);
            return;
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(symbol);
                slot
            }
            None => {
                self.slots.push(Some(symbol));
                (self.slots.len() - 1) as u32
            }
        };
        self.index.insert(id, slot);
    }

    pub fn get(&self, id: SymbolId) -> Option<&EnhancedSymbol> {
        let slot = *self.index.get(&id)?;
        self.slots[slot as usize].as_ref()
    }

    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut EnhancedSymbol> {
        let slot = *self.index.get(&id)?;
        self.slots[slot as usize].as_mut()
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.index.contains_key(&id)
    }

    /// Tombstone a slot and free it for reuse.
    pub fn remove(&mut self, id: SymbolId) -> Option<EnhancedSymbol> {
        let slot = self.index.remove(&id)?;
        let symbol = self.slots[slot as usize].take();
        self.free.push(slot);
        symbol
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Live symbol ids, skipping tombstones.
    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.index.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnhancedSymbol> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use crate::types::{FileId, Range, SymbolKind};

    fn sample(local: u32, name: &str) -> EnhancedSymbol {
        let file = FileId::new(1).unwrap();
        EnhancedSymbol::from_symbol(
            SymbolId::pack(file, local),
            file,
            Symbol::new(name, SymbolKind::Function, Range::new(local, 0, local + 2, 1)),
            Vec::new(),
            true,
        )
    }

    #[test]
    fn test_insert_get() {
        let mut store = SymbolStore::new();
        let sym = sample(1, "alpha");
        let id = sym.id;
        store.insert(sym);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().name.as_ref(), "alpha");
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut store = SymbolStore::new();
        store.insert(sample(1, "before"));
        store.insert(sample(1, "after"));

        assert_eq!(store.len(), 1);
        let id = SymbolId::pack(FileId::new(1).unwrap(), 1);
        assert_eq!(store.get(id).unwrap().name.as_ref(), "after");
    }

    #[test]
    fn test_remove_tombstones_slot() {
        let mut store = SymbolStore::new();
        store.insert(sample(1, "a"));
        store.insert(sample(2, "b"));

        let id1 = SymbolId::pack(FileId::new(1).unwrap(), 1);
        let removed = store.remove(id1).unwrap();
        assert_eq!(removed.name.as_ref(), "a");

        assert!(store.get(id1).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.ids().count(), 1);
        assert_eq!(store.iter().count(), 1);
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut store = SymbolStore::new();
        store.insert(sample(1, "a"));
        store.insert(sample(2, "b"));
        let id1 = SymbolId::pack(FileId::new(1).unwrap(), 1);
        store.remove(id1);

        store.insert(sample(3, "c"));
        // The freed slot was reused; backing storage did not grow.
        assert_eq!(store.len(), 2);
        let id3 = SymbolId::pack(FileId::new(1).unwrap(), 3);
        assert_eq!(store.get(id3).unwrap().name.as_ref(), "c");
    }

    #[test]
    fn test_get_mut() {
        let mut store = SymbolStore::new();
        store.insert(sample(1, "f"));
        let id = SymbolId::pack(FileId::new(1).unwrap(), 1);

        store.get_mut(id).unwrap().complexity = 7;
        assert_eq!(store.get(id).unwrap().complexity, 7);
    }

    #[test]
    fn test_clear() {
        let mut store = SymbolStore::new();
        store.insert(sample(1, "a"));
        store.clear();
        assert!(store.is_empty());
    }
}
