//! Name-addressed secondary index over symbols.
//!
//! Definitions (functions, classes, methods, constants, interfaces, types)
//! and other occurrences are kept separately. Lookup is exact-match first,
//! falling back to case-insensitive substring search. Statistics are
//! maintained incrementally on every insert and removal; `finalize_stats`
//! builds the frequency Top-N at the end of bulk indexing.

use crate::symbol::EnhancedSymbol;
use crate::types::{CompactString, FileId, SymbolId, SymbolKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many names `finalize_stats` keeps in `top_symbols`.
pub const TOP_SYMBOL_COUNT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub total_symbols: u32,
    pub definition_count: u32,
    pub reference_count: u32,
    pub by_kind: HashMap<SymbolKind, u32>,
    /// Share of each kind in the total, recomputed by `finalize_stats`.
    pub distribution: HashMap<SymbolKind, f64>,
    pub entry_point_count: u32,
    pub exported_count: u32,
    /// `(name, occurrence count)`, descending. Built by `finalize_stats`.
    pub top_symbols: Vec<(String, u32)>,
}

/// Result of a name lookup: definition sites and other occurrences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLookup {
    pub definitions: Vec<SymbolId>,
    pub references: Vec<SymbolId>,
}

impl SymbolLookup {
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.references.is_empty()
    }
}

fn is_entry_point(symbol: &EnhancedSymbol) -> bool {
    let named_entry = symbol.name.as_ref() == "main" || symbol.name.as_ref() == "init";
    let exported_callable = symbol.is_exported
        && matches!(symbol.kind, SymbolKind::Function | SymbolKind::Method);
    named_entry || exported_callable
}

#[derive(Debug, Default)]
struct IndexInner {
    definitions: HashMap<CompactString, Vec<SymbolId>>,
    occurrences: HashMap<CompactString, Vec<SymbolId>>,
    name_frequency: HashMap<CompactString, u32>,
    entry_points: Vec<SymbolId>,
    exported: Vec<SymbolId>,
    stats: IndexStatistics,
}

impl IndexInner {
    fn add(&mut self, symbol: &EnhancedSymbol) {
        let bucket = if symbol.kind.is_definition() {
            self.stats.definition_count += 1;
            self.definitions.entry(symbol.name.clone()).or_default()
        } else {
            self.stats.reference_count += 1;
            self.occurrences.entry(symbol.name.clone()).or_default()
        };
        bucket.push(symbol.id);

        self.stats.total_symbols += 1;
        *self.stats.by_kind.entry(symbol.kind).or_insert(0) += 1;
        *self.name_frequency.entry(symbol.name.clone()).or_insert(0) += 1;

        if is_entry_point(symbol) {
            self.entry_points.push(symbol.id);
            self.stats.entry_point_count += 1;
        }
        if symbol.is_exported {
            self.exported.push(symbol.id);
            self.stats.exported_count += 1;
        }
    }

    fn remove_file(&mut self, file_id: FileId) -> usize {
        let mut removed = 0usize;

        for (map, definition) in [
            (&mut self.definitions, true),
            (&mut self.occurrences, false),
        ] {
            let mut emptied = Vec::new();
            for (name, ids) in map.iter_mut() {
                let before = ids.len();
                ids.retain(|id| id.file_id() != file_id);
                let dropped = (before - ids.len()) as u32;
                if dropped > 0 {
                    removed += dropped as usize;
                    self.stats.total_symbols -= dropped;
                    if definition {
                        self.stats.definition_count -= dropped;
                    } else {
                        self.stats.reference_count -= dropped;
                    }
                    if let Some(freq) = self.name_frequency.get_mut(name) {
                        *freq -= dropped;
                        if *freq == 0 {
                            self.name_frequency.remove(name);
                        }
                    }
                }
                if ids.is_empty() {
                    emptied.push(name.clone());
                }
            }
            for name in emptied {
                map.remove(&name);
            }
        }

        let before = self.entry_points.len();
        self.entry_points.retain(|id| id.file_id() != file_id);
        self.stats.entry_point_count -= (before - self.entry_points.len()) as u32;

        let before = self.exported.len();
        self.exported.retain(|id| id.file_id() != file_id);
        self.stats.exported_count -= (before - self.exported.len()) as u32;

        removed
    }

    /// `by_kind` tracks removals per id list owner; rebuilt here from the
    /// live id sets to stay consistent after file removal.
    fn rebuild_kind_counts(&mut self, kinds: &HashMap<SymbolId, SymbolKind>) {
        let mut by_kind: HashMap<SymbolKind, u32> = HashMap::new();
        for ids in self.definitions.values().chain(self.occurrences.values()) {
            for id in ids {
                if let Some(kind) = kinds.get(id) {
                    *by_kind.entry(*kind).or_insert(0) += 1;
                }
            }
        }
        self.stats.by_kind = by_kind;
    }

    fn finalize(&mut self) {
        let mut top: Vec<(String, u32)> = self
            .name_frequency
            .iter()
            .map(|(name, count)| (name.to_string(), *count))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(TOP_SYMBOL_COUNT);
        self.stats.top_symbols = top;

        self.stats.distribution = if self.stats.total_symbols == 0 {
            HashMap::new()
        } else {
            let total = f64::from(self.stats.total_symbols);
            self.stats
                .by_kind
                .iter()
                .map(|(kind, count)| (*kind, f64::from(*count) / total))
                .collect()
        };
    }
}

#[derive(Debug, Default)]
pub struct SymbolIndex {
    inner: RwLock<IndexInner>,
    /// Kind per indexed id, needed to keep `by_kind` exact across removals.
    kinds: RwLock<HashMap<SymbolId, SymbolKind>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&self, symbol: &EnhancedSymbol) {
        self.kinds.write().insert(symbol.id, symbol.kind);
        self.inner.write().add(symbol);
    }

    pub fn add_symbols<'a>(&self, symbols: impl IntoIterator<Item = &'a EnhancedSymbol>) {
        let mut kinds = self.kinds.write();
        let mut inner = self.inner.write();
        for symbol in symbols {
            kinds.insert(symbol.id, symbol.kind);
            inner.add(symbol);
        }
    }

    /// Drop every indexed symbol of a file, restoring the statistics to
    /// their pre-insert values. Returns how many entries were removed.
    pub fn remove_file_symbols(&self, file_id: FileId) -> usize {
        let mut kinds = self.kinds.write();
        kinds.retain(|id, _| id.file_id() != file_id);
        let mut inner = self.inner.write();
        let removed = inner.remove_file(file_id);
        inner.rebuild_kind_counts(&kinds);
        removed
    }

    /// Exact-match lookup first; when nothing matches, a case-insensitive
    /// substring pass over all indexed names.
    pub fn lookup(&self, name: &str) -> SymbolLookup {
        let inner = self.inner.read();

        let exact = SymbolLookup {
            definitions: inner
                .definitions
                .get(name)
                .cloned()
                .unwrap_or_default(),
            references: inner
                .occurrences
                .get(name)
                .cloned()
                .unwrap_or_default(),
        };
        if !exact.is_empty() {
            return exact;
        }

        let needle = name.to_lowercase();
        let mut fuzzy = SymbolLookup::default();
        for (candidate, ids) in &inner.definitions {
            if candidate.to_lowercase().contains(&needle) {
                fuzzy.definitions.extend_from_slice(ids);
            }
        }
        for (candidate, ids) in &inner.occurrences {
            if candidate.to_lowercase().contains(&needle) {
                fuzzy.references.extend_from_slice(ids);
            }
        }
        fuzzy.definitions.sort_unstable();
        fuzzy.references.sort_unstable();
        fuzzy
    }

    pub fn entry_points(&self) -> Vec<SymbolId> {
        self.inner.read().entry_points.clone()
    }

    pub fn exported_symbols(&self) -> Vec<SymbolId> {
        self.inner.read().exported.clone()
    }

    /// Build the Top-N frequency table and the kind distribution. Called at
    /// the end of bulk indexing.
    pub fn finalize_stats(&self) {
        self.inner.write().finalize();
    }

    pub fn stats(&self) -> IndexStatistics {
        self.inner.read().stats.clone()
    }

    pub fn clear(&self) {
        *self.inner.write() = IndexInner::default();
        self.kinds.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use crate::types::{FileId, Range};

    fn enhanced(
        file: u32,
        local: u32,
        name: &str,
        kind: SymbolKind,
        exported: bool,
    ) -> EnhancedSymbol {
        let file = FileId::new(file).unwrap();
        EnhancedSymbol::from_symbol(
            SymbolId::pack(file, local),
            file,
            Symbol::new(name, kind, Range::new(local, 0, local + 1, 0)),
            Vec::new(),
            exported,
        )
    }

    #[test]
    fn test_definitions_and_occurrences_split() {
        let index = SymbolIndex::new();
        index.add_symbol(&enhanced(1, 1, "handle", SymbolKind::Function, true));
        index.add_symbol(&enhanced(1, 2, "handle", SymbolKind::Variable, false));

        let result = index.lookup("handle");
        assert_eq!(result.definitions.len(), 1);
        assert_eq!(result.references.len(), 1);

        let stats = index.stats();
        assert_eq!(stats.total_symbols, 2);
        assert_eq!(stats.definition_count, 1);
        assert_eq!(stats.reference_count, 1);
    }

    #[test]
    fn test_case_insensitive_substring_fallback() {
        let index = SymbolIndex::new();
        index.add_symbol(&enhanced(1, 1, "calculateTotal", SymbolKind::Function, true));

        assert!(!index.lookup("calculateTotal").is_empty());
        assert_eq!(index.lookup("total").definitions.len(), 1);
        assert_eq!(index.lookup("TOTAL").definitions.len(), 1);
        assert!(index.lookup("missing").is_empty());
    }

    #[test]
    fn test_exact_match_shadows_substring() {
        let index = SymbolIndex::new();
        index.add_symbol(&enhanced(1, 1, "run", SymbolKind::Function, true));
        index.add_symbol(&enhanced(1, 2, "runServer", SymbolKind::Function, true));

        // Exact hit for "run" must not pull in "runServer".
        assert_eq!(index.lookup("run").definitions.len(), 1);
    }

    #[test]
    fn test_entry_points() {
        let index = SymbolIndex::new();
        index.add_symbol(&enhanced(1, 1, "main", SymbolKind::Function, false));
        index.add_symbol(&enhanced(1, 2, "Serve", SymbolKind::Method, true));
        index.add_symbol(&enhanced(1, 3, "helper", SymbolKind::Function, false));
        index.add_symbol(&enhanced(1, 4, "config", SymbolKind::Variable, true));

        assert_eq!(index.entry_points().len(), 2);
        assert_eq!(index.stats().entry_point_count, 2);
    }

    #[test]
    fn test_finalize_builds_top_symbols() {
        let index = SymbolIndex::new();
        for i in 0..3 {
            index.add_symbol(&enhanced(1, i + 1, "popular", SymbolKind::Variable, false));
        }
        index.add_symbol(&enhanced(1, 10, "rare", SymbolKind::Function, true));
        index.finalize_stats();

        let stats = index.stats();
        assert_eq!(stats.top_symbols[0], ("popular".to_string(), 3));
        assert_eq!(stats.top_symbols[1], ("rare".to_string(), 1));

        let dist: f64 = stats.distribution.values().sum();
        assert!((dist - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_restores_stats() {
        let index = SymbolIndex::new();
        index.add_symbol(&enhanced(1, 1, "keep", SymbolKind::Function, true));
        index.finalize_stats();
        let baseline = index.stats();

        index.add_symbol(&enhanced(2, 1, "gone", SymbolKind::Function, true));
        index.add_symbol(&enhanced(2, 2, "gone2", SymbolKind::Variable, false));
        assert_eq!(index.stats().total_symbols, 3);

        let removed = index.remove_file_symbols(FileId::new(2).unwrap());
        assert_eq!(removed, 2);
        index.finalize_stats();

        assert_eq!(index.stats(), baseline);
    }

    #[test]
    fn test_remove_missing_file_is_noop() {
        let index = SymbolIndex::new();
        index.add_symbol(&enhanced(1, 1, "stay", SymbolKind::Function, true));
        assert_eq!(index.remove_file_symbols(FileId::new(9).unwrap()), 0);
        assert_eq!(index.stats().total_symbols, 1);
    }
}
