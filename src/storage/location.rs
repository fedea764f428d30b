//! O(1) symbol lookup by source position.
//!
//! Built during ingest as a per-file `(line, column) -> SymbolId` map. When
//! the exact position is not in the map the lookup falls back to a linear
//! containment scan over the file's symbols, breaking ties towards the
//! innermost (smallest) span.

use crate::symbol::EnhancedSymbol;
use crate::types::{FileId, SymbolId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SymbolLocationIndex {
    by_position: HashMap<FileId, HashMap<(u32, u16), SymbolId>>,
}

impl SymbolLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: FileId, line: u32, column: u16, id: SymbolId) {
        self.by_position
            .entry(file_id)
            .or_default()
            .insert((line, column), id);
    }

    pub fn remove_file(&mut self, file_id: FileId) {
        self.by_position.remove(&file_id);
    }

    pub fn clear(&mut self) {
        self.by_position.clear();
    }

    /// Exact-position hit only.
    pub fn get(&self, file_id: FileId, line: u32, column: u16) -> Option<SymbolId> {
        self.by_position
            .get(&file_id)?
            .get(&(line, column))
            .copied()
    }

    /// Exact hit first, then containment scan over `candidates` (the file's
    /// symbols). Among containing symbols the smallest span wins.
    pub fn find_symbol_at_position<'a, I>(
        &self,
        file_id: FileId,
        line: u32,
        column: u16,
        candidates: I,
    ) -> Option<SymbolId>
    where
        I: IntoIterator<Item = &'a EnhancedSymbol>,
    {
        if let Some(id) = self.get(file_id, line, column) {
            return Some(id);
        }

        candidates
            .into_iter()
            .filter(|s| s.file_id == file_id && s.range.contains(line, column))
            .min_by_key(|s| s.range.line_span())
            .map(|s| s.id)
    }
}
