//! Per-file import data and best-candidate resolution for name references.
//!
//! The import graph is name-based with no scope-sensitive resolution: a file
//! imports another file when one of its import strings matches the other
//! file's registered module path (exactly, or by last path segment). The
//! resolver picks the best target for a referenced name by preferring
//! candidates in imported files, then same-file candidates, then exported
//! cross-file candidates, then the first candidate as a last resort.

use crate::storage::SymbolStore;
use crate::types::{CompactString, FileId, SymbolId, compact_string};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One import statement, as extracted by the (external) import scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Module path being imported (e.g. `net/http`, `pkg.utils`).
    pub module: CompactString,
    /// Local alias, if any (`import x as y`).
    pub alias: Option<CompactString>,
}

impl ImportRecord {
    pub fn new(module: &str) -> Self {
        Self {
            module: compact_string(module),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(compact_string(alias));
        self
    }
}

/// All import data collected for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileImportData {
    pub imports: Vec<ImportRecord>,
}

/// Last segment of a module path, across `::`, `/` and `.` separators.
fn last_segment(module: &str) -> &str {
    module
        .rsplit(|c| c == '/' || c == '.' || c == ':')
        .next()
        .unwrap_or(module)
}

#[derive(Debug, Default)]
pub struct ImportResolver {
    /// Import records per file, staged before the graph is built.
    imports_by_file: HashMap<FileId, FileImportData>,
    /// Module path -> defining file.
    module_to_file: HashMap<CompactString, FileId>,
    /// Last module segment -> defining files (for loose matching).
    segment_to_files: HashMap<CompactString, Vec<FileId>>,
    /// file -> files it imports. Built by `build_import_graph`.
    import_graph: HashMap<FileId, HashSet<FileId>>,
}

impl ImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file under its module path (derived from its on-disk path
    /// by the caller).
    pub fn register_file(&mut self, file_id: FileId, module_path: &str) {
        self.module_to_file
            .insert(compact_string(module_path), file_id);
        self.segment_to_files
            .entry(compact_string(last_segment(module_path)))
            .or_default()
            .push(file_id);
    }

    /// Stage the import records extracted for a file.
    pub fn add_file_imports(&mut self, file_id: FileId, data: FileImportData) {
        self.imports_by_file.insert(file_id, data);
    }

    pub fn file_imports(&self, file_id: FileId) -> Option<&FileImportData> {
        self.imports_by_file.get(&file_id)
    }

    /// Resolve every staged import string to a file id. Single-threaded and
    /// run once, before reference resolution starts.
    pub fn build_import_graph(&mut self) {
        let mut graph: HashMap<FileId, HashSet<FileId>> = HashMap::new();

        for (&file_id, data) in &self.imports_by_file {
            let targets = graph.entry(file_id).or_default();
            for import in &data.imports {
                if let Some(&target) = self.module_to_file.get(import.module.as_ref()) {
                    targets.insert(target);
                    continue;
                }
                if let Some(candidates) =
                    self.segment_to_files.get(last_segment(&import.module))
                {
                    targets.extend(candidates.iter().copied());
                }
            }
            targets.remove(&file_id);
        }

        tracing::debug!(
            target: "imports",
            "import graph built: {} files with imports",
            graph.len()
        );
        self.import_graph = graph;
    }

    /// Files that `file_id` imports, per the built graph.
    pub fn imported_files(&self, file_id: FileId) -> Option<&HashSet<FileId>> {
        self.import_graph.get(&file_id)
    }

    /// Pick the best candidate for `name` referenced from `from_file`.
    ///
    /// Ranking: (1) a candidate defined in a file `from_file` imports,
    /// (2) a candidate in `from_file` itself, (3) an exported candidate in
    /// any other file, (4) the first candidate as a last resort.
    pub fn resolve_symbol_reference(
        &self,
        from_file: FileId,
        _name: &str,
        candidates: &[SymbolId],
        store: &SymbolStore,
    ) -> Option<SymbolId> {
        if candidates.is_empty() {
            return None;
        }

        if let Some(imported) = self.import_graph.get(&from_file) {
            if let Some(&id) = candidates
                .iter()
                .find(|id| imported.contains(&id.file_id()))
            {
                return Some(id);
            }
        }

        if let Some(&id) = candidates.iter().find(|id| id.file_id() == from_file) {
            return Some(id);
        }

        if let Some(&id) = candidates.iter().find(|id| {
            id.file_id() != from_file
                && store.get(**id).map(|s| s.is_exported).unwrap_or(false)
        }) {
            return Some(id);
        }

        candidates.first().copied()
    }

    pub fn remove_file(&mut self, file_id: FileId) {
        self.imports_by_file.remove(&file_id);
        self.module_to_file.retain(|_, &mut f| f != file_id);
        for files in self.segment_to_files.values_mut() {
            files.retain(|&f| f != file_id);
        }
        self.segment_to_files.retain(|_, files| !files.is_empty());
        self.import_graph.remove(&file_id);
        for targets in self.import_graph.values_mut() {
            targets.remove(&file_id);
        }
    }

    pub fn clear(&mut self) {
        self.imports_by_file.clear();
        self.module_to_file.clear();
        self.segment_to_files.clear();
        self.import_graph.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{EnhancedSymbol, Symbol};
    use crate::types::{Range, SymbolKind};

    fn fid(n: u32) -> FileId {
        FileId::new(n).unwrap()
    }

    fn store_with(symbols: Vec<(FileId, u32, &str, bool)>) -> SymbolStore {
        let mut store = SymbolStore::new();
        for (file, local, name, exported) in symbols {
            store.insert(EnhancedSymbol::from_symbol(
                SymbolId::pack(file, local),
                file,
                Symbol::new(name, SymbolKind::Function, Range::new(1, 0, 2, 0)),
                Vec::new(),
                exported,
            ));
        }
        store
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("net/http"), "http");
        assert_eq!(last_segment("pkg.utils"), "utils");
        assert_eq!(last_segment("crate::foo::bar"), "bar");
        assert_eq!(last_segment("plain"), "plain");
    }

    #[test]
    fn test_import_graph_exact_match() {
        let mut resolver = ImportResolver::new();
        resolver.register_file(fid(1), "app/main");
        resolver.register_file(fid(2), "app/db");

        resolver.add_file_imports(
            fid(1),
            FileImportData {
                imports: vec![ImportRecord::new("app/db")],
            },
        );
        resolver.build_import_graph();

        let imported = resolver.imported_files(fid(1)).unwrap();
        assert!(imported.contains(&fid(2)));
    }

    #[test]
    fn test_import_graph_segment_match() {
        let mut resolver = ImportResolver::new();
        resolver.register_file(fid(1), "app/main");
        resolver.register_file(fid(2), "vendor/lib/db");

        resolver.add_file_imports(
            fid(1),
            FileImportData {
                imports: vec![ImportRecord::new("db")],
            },
        );
        resolver.build_import_graph();

        assert!(resolver.imported_files(fid(1)).unwrap().contains(&fid(2)));
    }

    #[test]
    fn test_resolution_prefers_imported_file() {
        let mut resolver = ImportResolver::new();
        resolver.register_file(fid(1), "main");
        resolver.register_file(fid(2), "db");
        resolver.register_file(fid(3), "db_copy");
        resolver.add_file_imports(
            fid(1),
            FileImportData {
                imports: vec![ImportRecord::new("db")],
            },
        );
        resolver.build_import_graph();

        let store = store_with(vec![
            (fid(3), 1, "query", true),
            (fid(2), 1, "query", true),
        ]);
        let candidates = vec![SymbolId::pack(fid(3), 1), SymbolId::pack(fid(2), 1)];

        let resolved = resolver
            .resolve_symbol_reference(fid(1), "query", &candidates, &store)
            .unwrap();
        assert_eq!(resolved.file_id(), fid(2));
    }

    #[test]
    fn test_resolution_prefers_same_file_over_unimported() {
        let resolver = ImportResolver::new();
        let store = store_with(vec![
            (fid(2), 1, "helper", true),
            (fid(1), 1, "helper", false),
        ]);
        let candidates = vec![SymbolId::pack(fid(2), 1), SymbolId::pack(fid(1), 1)];

        let resolved = resolver
            .resolve_symbol_reference(fid(1), "helper", &candidates, &store)
            .unwrap();
        assert_eq!(resolved.file_id(), fid(1));
    }

    #[test]
    fn test_resolution_prefers_exported_cross_file() {
        let resolver = ImportResolver::new();
        let store = store_with(vec![
            (fid(2), 1, "internal", false),
            (fid(3), 1, "internal", true),
        ]);
        let candidates = vec![SymbolId::pack(fid(2), 1), SymbolId::pack(fid(3), 1)];

        let resolved = resolver
            .resolve_symbol_reference(fid(1), "internal", &candidates, &store)
            .unwrap();
        assert_eq!(resolved.file_id(), fid(3));
    }

    #[test]
    fn test_resolution_falls_back_to_first() {
        let resolver = ImportResolver::new();
        let store = store_with(vec![
            (fid(2), 1, "x", false),
            (fid(3), 1, "x", false),
        ]);
        let candidates = vec![SymbolId::pack(fid(2), 1), SymbolId::pack(fid(3), 1)];

        let resolved = resolver
            .resolve_symbol_reference(fid(1), "x", &candidates, &store)
            .unwrap();
        assert_eq!(resolved, candidates[0]);
    }

    #[test]
    fn test_empty_candidates() {
        let resolver = ImportResolver::new();
        let store = SymbolStore::new();
        assert!(
            resolver
                .resolve_symbol_reference(fid(1), "x", &[], &store)
                .is_none()
        );
    }

    #[test]
    fn test_remove_file_purges_graph() {
        let mut resolver = ImportResolver::new();
        resolver.register_file(fid(1), "main");
        resolver.register_file(fid(2), "db");
        resolver.add_file_imports(
            fid(1),
            FileImportData {
                imports: vec![ImportRecord::new("db")],
            },
        );
        resolver.build_import_graph();
        assert!(resolver.imported_files(fid(1)).unwrap().contains(&fid(2)));

        resolver.remove_file(fid(2));
        assert!(!resolver.imported_files(fid(1)).unwrap().contains(&fid(2)));

        resolver.remove_file(fid(1));
        assert!(resolver.imported_files(fid(1)).is_none());
        assert!(resolver.file_imports(fid(1)).is_none());
    }
}
