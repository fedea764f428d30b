//! The reference tracker: central owner of symbols, references, and scopes.
//!
//! Ingest is two-phase. `process_file` assigns ids, stores symbols, and
//! stages references into per-file backing arrays with their local ids
//! rewritten to global [`ReferenceId`]s. `process_all_references` then runs
//! exactly once per bulk cycle: it builds the import graph, resolves every
//! reference's source (by position) and target (by name through the import
//! resolver), rebuilds the bidirectional adjacency lists with deduplication,
//! recomputes per-symbol reference statistics, and finally runs the heuristic
//! implementor matcher.
//!
//! Adjacency lists hold only ids; the per-file backing arrays own the
//! `Reference` values. Removing a file drops its array wholesale, so no
//! aliased reference can outlive its file.

mod queries;

pub use queries::{
    CallStatsSummary, Direction, FunctionTreeNode, QualityRankedRef, ReferenceStatsSummary,
    TypeRelationships,
};

use crate::imports::{FileImportData, ImportResolver};
use crate::reference::{RefKind, RefQuality, RefStrength, Reference, ReferenceRecord};
use crate::scope::{ScopeChainBuilder, ScopeInfo};
use crate::storage::{SymbolLocationIndex, SymbolStore};
use crate::symbol::{EnhancedSymbol, GranularityBuckets, RefStats, Symbol};
use crate::types::{CompactString, FileId, ReferenceId, SymbolId, SymbolKind, compact_string};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Infer `is_exported` from the file extension when the parser left the
/// visibility undecided.
fn infer_exported(path: &str, name: &str) -> bool {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "go" => name.chars().next().is_some_and(|c| c.is_uppercase()),
        "py" | "rb" => !name.starts_with('_'),
        "js" | "ts" | "jsx" | "tsx" | "mjs" | "cjs" => {
            !name.starts_with('_') && !name.starts_with('#')
        }
        _ => true,
    }
}

/// Module path derived from an on-disk path: extension stripped, separators
/// normalized to `/`.
fn module_path_of(path: &str) -> String {
    let without_ext = match path.rfind('.') {
        Some(dot) if dot > path.rfind('/').map_or(0, |s| s + 1) => &path[..dot],
        _ => path,
    };
    without_ext.replace('\\', "/")
}

#[derive(Debug, Default)]
pub(crate) struct TrackerInner {
    pub(crate) store: SymbolStore,
    pub(crate) location: SymbolLocationIndex,
    pub(crate) imports: ImportResolver,
    /// Per-file contiguous backing arrays owning every reference.
    pub(crate) references: HashMap<FileId, Vec<Reference>>,
    /// Reference id -> slot in its file's backing array.
    pub(crate) ref_slots: HashMap<ReferenceId, u32>,
    pub(crate) symbols_by_file: HashMap<FileId, Vec<SymbolId>>,
    pub(crate) name_index: HashMap<CompactString, Vec<SymbolId>>,
    pub(crate) scopes_by_file: HashMap<FileId, Vec<ScopeInfo>>,
    pub(crate) file_paths: HashMap<FileId, CompactString>,
    scope_chains: ScopeChainBuilder,
    next_local_symbol: HashMap<FileId, u32>,
    next_local_ref: HashMap<FileId, u32>,
}

impl TrackerInner {
    pub(crate) fn reference(&self, id: ReferenceId) -> Option<&Reference> {
        let slot = *self.ref_slots.get(&id)?;
        self.references.get(&id.file_id())?.get(slot as usize)
    }

    fn next_symbol_id(&mut self, file_id: FileId) -> SymbolId {
        let counter = self.next_local_symbol.entry(file_id).or_insert(1);
        let id = SymbolId::pack(file_id, *counter);
        *counter += 1;
        id
    }

    fn next_reference_id(&mut self, file_id: FileId) -> ReferenceId {
        let counter = self.next_local_ref.entry(file_id).or_insert(1);
        let id = ReferenceId::pack(file_id, *counter);
        *counter += 1;
        id
    }

    fn ingest_file(
        &mut self,
        file_id: FileId,
        path: &str,
        symbols: Vec<Symbol>,
        refs: Vec<ReferenceRecord>,
        scopes: Vec<ScopeInfo>,
        complexity_by_line: Option<&HashMap<u32, u32>>,
    ) -> Vec<SymbolId> {
        self.file_paths.insert(file_id, compact_string(path));
        self.imports.register_file(file_id, &module_path_of(path));
        self.scopes_by_file.insert(file_id, scopes.clone());

        let mut assigned = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let id = self.next_symbol_id(file_id);
            let is_exported = symbol
                .visibility
                .is_exported
                .unwrap_or_else(|| infer_exported(path, &symbol.name));
            let chain =
                self.scope_chains
                    .chain_for(symbol.range.start_line, symbol.range.end_line, &scopes);

            let mut enhanced =
                EnhancedSymbol::from_symbol(id, file_id, symbol, chain, is_exported);
            if let Some(map) = complexity_by_line {
                enhanced.complexity = map
                    .iter()
                    .filter(|(line, _)| enhanced.range.contains_line(**line))
                    .map(|(_, c)| *c)
                    .sum();
            }

            self.location.insert(
                file_id,
                enhanced.range.start_line,
                enhanced.range.start_column,
                id,
            );
            self.name_index
                .entry(enhanced.name.clone())
                .or_default()
                .push(id);
            self.symbols_by_file.entry(file_id).or_default().push(id);
            self.store.insert(enhanced);
            assigned.push(id);
        }

        let backing = self.references.entry(file_id).or_default();
        backing.reserve(refs.len());
        for record in refs {
            let counter = self.next_local_ref.entry(file_id).or_insert(1);
            let id = ReferenceId::pack(file_id, *counter);
            *counter += 1;

            let reference = Reference {
                id,
                source_symbol: None,
                target_symbol: None,
                file_id,
                line: record.line,
                column: record.column,
                kind: record.kind,
                strength: record.strength,
                referenced_name: record.referenced_name,
                quality: record.quality,
            };
            self.ref_slots.insert(id, backing.len() as u32);
            backing.push(reference);
        }

        tracing::debug!(
            target: "tracker",
            "ingested {path}: {} symbols, {} references",
            assigned.len(),
            self.references.get(&file_id).map_or(0, Vec::len)
        );
        assigned
    }

    fn process_all_references(&mut self) {
        self.imports.build_import_graph();

        // Existing adjacency is rebuilt from scratch; the references
        // themselves stay in place.
        let ids: Vec<SymbolId> = self.store.ids().collect();
        for id in &ids {
            if let Some(sym) = self.store.get_mut(*id) {
                sym.incoming_refs.clear();
                sym.outgoing_refs.clear();
            }
        }

        // Resolution pass, immutable: decide source/target for every
        // reference in deterministic file order.
        let mut resolutions: Vec<(FileId, usize, Option<SymbolId>, Option<SymbolId>)> = Vec::new();
        let mut file_ids: Vec<FileId> = self.references.keys().copied().collect();
        file_ids.sort_unstable();

        for file_id in file_ids {
            let file_symbols: Vec<&EnhancedSymbol> = self
                .symbols_by_file
                .get(&file_id)
                .map(|ids| ids.iter().filter_map(|id| self.store.get(*id)).collect())
                .unwrap_or_default();

            for (idx, reference) in self.references[&file_id].iter().enumerate() {
                let source = reference.source_symbol.or_else(|| {
                    self.location.find_symbol_at_position(
                        file_id,
                        reference.line,
                        reference.column,
                        file_symbols.iter().copied(),
                    )
                });
                let target = reference.target_symbol.or_else(|| {
                    let candidates = self
                        .name_index
                        .get(reference.referenced_name.as_ref())?
                        .as_slice();
                    self.imports.resolve_symbol_reference(
                        file_id,
                        &reference.referenced_name,
                        candidates,
                        &self.store,
                    )
                });
                resolutions.push((file_id, idx, source, target));
            }
        }

        // Apply pass: write resolution back and re-link adjacency, skipping
        // duplicate ids on insert.
        for (file_id, idx, source, target) in resolutions {
            let ref_id = {
                let reference = &mut self
                    .references
                    .get_mut(&file_id)
                    .expect("file array present")[idx];
                reference.source_symbol = source;
                reference.target_symbol = target;
                reference.id
            };
            if let Some(source) = source {
                if let Some(sym) = self.store.get_mut(source) {
                    sym.add_outgoing(ref_id);
                }
            }
            if let Some(target) = target {
                if let Some(sym) = self.store.get_mut(target) {
                    sym.add_incoming(ref_id);
                }
            }
        }

        self.update_ref_stats();
        self.run_implementor_matcher();
    }

    fn update_ref_stats(&mut self) {
        let mut computed: Vec<(SymbolId, RefStats)> = Vec::with_capacity(self.store.len());

        for symbol in self.store.iter() {
            let mut stats = RefStats::default();
            let mut incoming_files = HashSet::new();
            let mut outgoing_files = HashSet::new();

            for ref_id in &symbol.incoming_refs {
                let Some(reference) = self.reference(*ref_id) else {
                    continue;
                };
                if reference.kind != RefKind::Import {
                    stats.incoming_count += 1;
                }
                incoming_files.insert(reference.file_id);
                *stats.by_type.entry(reference.kind).or_insert(0) += 1;
                stats.strength.bump(reference.strength);
            }
            for ref_id in &symbol.outgoing_refs {
                let Some(reference) = self.reference(*ref_id) else {
                    continue;
                };
                stats.outgoing_count += 1;
                if let Some(target) = reference.target_symbol {
                    outgoing_files.insert(target.file_id());
                }
                *stats.by_type.entry(reference.kind).or_insert(0) += 1;
                stats.strength.bump(reference.strength);
            }

            stats.incoming_files = incoming_files.len() as u32;
            stats.outgoing_files = outgoing_files.len() as u32;
            stats.buckets =
                GranularityBuckets::from_total(stats.incoming_count + stats.outgoing_count);
            computed.push((symbol.id, stats));
        }

        for (id, stats) in computed {
            if let Some(sym) = self.store.get_mut(id) {
                sym.ref_stats = stats;
            }
        }
    }

    /// Heuristic implementor matching: a type whose method-name set covers an
    /// interface's declared methods gets a synthesized `implements` edge
    /// (loose, heuristic). Explicit edges are not checked here; quality
    /// ranking downstream de-prefers the heuristic duplicate.
    fn run_implementor_matcher(&mut self) {
        // Interface -> declared method names (methods whose span falls
        // inside the interface's own span, same file).
        let mut interfaces: Vec<(SymbolId, FileId, CompactString, HashSet<CompactString>)> =
            Vec::new();
        for symbol in self.store.iter() {
            if symbol.kind != SymbolKind::Interface {
                continue;
            }
            let methods: HashSet<CompactString> = self
                .symbols_by_file
                .get(&symbol.file_id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| self.store.get(*id))
                        .filter(|m| {
                            matches!(m.kind, SymbolKind::Method | SymbolKind::Function)
                                && m.id != symbol.id
                                && symbol.range.contains_line(m.range.start_line)
                        })
                        .map(|m| m.name.clone())
                        .collect()
                })
                .unwrap_or_default();
            interfaces.push((symbol.id, symbol.file_id, symbol.name.clone(), methods));
        }

        // Receiver type name -> method names, across all files.
        let mut methods_by_receiver: HashMap<CompactString, HashSet<CompactString>> =
            HashMap::new();
        for symbol in self.store.iter() {
            if symbol.kind != SymbolKind::Method {
                continue;
            }
            if let Some(receiver) = symbol.normalized_receiver() {
                methods_by_receiver
                    .entry(compact_string(receiver))
                    .or_default()
                    .insert(symbol.name.clone());
            }
        }

        let mut synthesized: Vec<(SymbolId, SymbolId, CompactString)> = Vec::new();
        for symbol in self.store.iter() {
            if !symbol.kind.is_type_like() {
                continue;
            }
            let Some(type_methods) = methods_by_receiver.get(&symbol.name) else {
                continue;
            };
            for (iface_id, _, iface_name, iface_methods) in &interfaces {
                if iface_methods.is_empty() || *iface_id == symbol.id {
                    continue;
                }
                if !iface_methods.is_subset(type_methods) {
                    continue;
                }
                // One heuristic edge per (type, interface); re-running the
                // matcher must not duplicate it.
                let already = symbol.outgoing_refs.iter().any(|ref_id| {
                    self.reference(*ref_id).is_some_and(|r| {
                        r.kind == RefKind::Implements
                            && r.quality == RefQuality::Heuristic
                            && r.target_symbol == Some(*iface_id)
                    })
                });
                if already {
                    continue;
                }
                synthesized.push((symbol.id, *iface_id, iface_name.clone()));
            }
        }

        for (type_id, iface_id, iface_name) in synthesized {
            let Some(type_sym) = self.store.get(type_id) else {
                continue;
            };
            let (file_id, line, column) = (
                type_sym.file_id,
                type_sym.range.start_line,
                type_sym.range.start_column,
            );
            tracing::debug!(
                target: "tracker",
                "heuristic implements: {} -> {iface_name}",
                type_sym.name
            );

            let id = self.next_reference_id(file_id);
            let reference = Reference {
                id,
                source_symbol: Some(type_id),
                target_symbol: Some(iface_id),
                file_id,
                line,
                column,
                kind: RefKind::Implements,
                strength: RefStrength::Loose,
                referenced_name: iface_name,
                quality: RefQuality::Heuristic,
            };
            let backing = self.references.entry(file_id).or_default();
            self.ref_slots.insert(id, backing.len() as u32);
            backing.push(reference);

            if let Some(sym) = self.store.get_mut(type_id) {
                sym.add_outgoing(id);
            }
            if let Some(sym) = self.store.get_mut(iface_id) {
                sym.add_incoming(id);
            }
        }
    }

    fn insert_out_of_band(
        &mut self,
        file_id: FileId,
        record: ReferenceRecord,
        source: Option<SymbolId>,
        target: Option<SymbolId>,
        default_quality: RefQuality,
    ) -> ReferenceId {
        let quality = if record.quality == RefQuality::Unknown {
            default_quality
        } else {
            record.quality
        };

        let id = self.next_reference_id(file_id);
        let reference = Reference {
            id,
            source_symbol: source,
            target_symbol: target,
            file_id,
            line: record.line,
            column: record.column,
            kind: record.kind,
            strength: record.strength,
            referenced_name: record.referenced_name,
            quality,
        };
        let backing = self.references.entry(file_id).or_default();
        self.ref_slots.insert(id, backing.len() as u32);
        backing.push(reference);

        if let Some(source) = source {
            if let Some(sym) = self.store.get_mut(source) {
                sym.add_outgoing(id);
            }
        }
        if let Some(target) = target {
            if let Some(sym) = self.store.get_mut(target) {
                sym.add_incoming(id);
            }
        }
        id
    }

    fn remove_file(&mut self, file_id: FileId) {
        let symbol_ids = self.symbols_by_file.remove(&file_id).unwrap_or_default();
        let removed: HashSet<SymbolId> = symbol_ids.iter().copied().collect();

        // Unhook this file's references from peers in other files before the
        // backing array goes away.
        if let Some(refs) = self.references.remove(&file_id) {
            for reference in &refs {
                self.ref_slots.remove(&reference.id);
                if let Some(target) = reference.target_symbol {
                    if target.file_id() != file_id {
                        if let Some(sym) = self.store.get_mut(target) {
                            sym.incoming_refs.retain(|r| *r != reference.id);
                        }
                    }
                }
            }
        }

        // References owned by other files that resolved into this file
        // become unresolved again.
        for id in &symbol_ids {
            let Some(symbol) = self.store.get(*id) else {
                continue;
            };
            let foreign_incoming: Vec<ReferenceId> = symbol
                .incoming_refs
                .iter()
                .copied()
                .filter(|r| r.file_id() != file_id)
                .collect();
            for ref_id in foreign_incoming {
                if let Some(slot) = self.ref_slots.get(&ref_id).copied() {
                    if let Some(array) = self.references.get_mut(&ref_id.file_id()) {
                        if let Some(reference) = array.get_mut(slot as usize) {
                            if reference
                                .target_symbol
                                .is_some_and(|t| removed.contains(&t))
                            {
                                reference.target_symbol = None;
                            }
                        }
                    }
                }
            }
        }

        for id in &symbol_ids {
            self.store.remove(*id);
        }
        self.name_index.retain(|_, ids| {
            ids.retain(|id| !removed.contains(id));
            !ids.is_empty()
        });

        self.location.remove_file(file_id);
        self.scopes_by_file.remove(&file_id);
        self.file_paths.remove(&file_id);
        self.imports.remove_file(file_id);
        self.next_local_symbol.remove(&file_id);
        self.next_local_ref.remove(&file_id);

        tracing::debug!(
            target: "tracker",
            "removed file {}: {} symbols purged",
            file_id.value(),
            symbol_ids.len()
        );
    }

    fn clear(&mut self) {
        *self = TrackerInner::default();
    }
}

pub struct ReferenceTracker {
    pub(crate) inner: RwLock<TrackerInner>,
    bulk_indexing: AtomicBool,
    next_file_id: AtomicU32,
    path_to_file: RwLock<HashMap<CompactString, FileId>>,
}

impl Default for ReferenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TrackerInner::default()),
            bulk_indexing: AtomicBool::new(false),
            next_file_id: AtomicU32::new(1),
            path_to_file: RwLock::new(HashMap::new()),
        }
    }

    /// Assign (or recall) the file id for a path. Ids are stable for the
    /// file's lifetime in the index.
    pub fn file_id_for_path(&self, path: &str) -> FileId {
        if let Some(id) = self.path_to_file.read().get(path) {
            return *id;
        }
        let mut map = self.path_to_file.write();
        if let Some(id) = map.get(path) {
            return *id;
        }
        let raw = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        let id = FileId::new(raw).expect("file counter starts at 1");
        map.insert(compact_string(path), id);
        id
    }

    /// Enter or leave bulk indexing. While set there is exactly one ingest
    /// writer and snapshot-dependent reads return empty.
    pub fn set_bulk_indexing(&self, enabled: bool) {
        self.bulk_indexing.store(enabled, Ordering::SeqCst);
    }

    pub fn is_bulk_indexing(&self) -> bool {
        self.bulk_indexing.load(Ordering::SeqCst)
    }

    /// Ingest one parsed file: assign symbol ids, store symbols, index by
    /// name/file/position, build scope chains, and stage references.
    pub fn process_file(
        &self,
        file_id: FileId,
        path: &str,
        symbols: Vec<Symbol>,
        refs: Vec<ReferenceRecord>,
        scopes: Vec<ScopeInfo>,
    ) -> Vec<SymbolId> {
        self.inner
            .write()
            .ingest_file(file_id, path, symbols, refs, scopes, None)
    }

    /// Like [`process_file`], additionally copying parser-supplied per-line
    /// complexity into each symbol.
    ///
    /// [`process_file`]: Self::process_file
    pub fn process_file_with_complexity(
        &self,
        file_id: FileId,
        path: &str,
        symbols: Vec<Symbol>,
        refs: Vec<ReferenceRecord>,
        scopes: Vec<ScopeInfo>,
        complexity_by_line: &HashMap<u32, u32>,
    ) -> Vec<SymbolId> {
        self.inner.write().ingest_file(
            file_id,
            path,
            symbols,
            refs,
            scopes,
            Some(complexity_by_line),
        )
    }

    /// Stage import data for a file. Extraction happens outside any tracker
    /// lock; only the append is guarded.
    pub fn process_file_imports(&self, file_id: FileId, data: FileImportData) {
        self.inner.write().imports.add_file_imports(file_id, data);
    }

    /// Resolve every staged reference. Run exactly once after all files of a
    /// bulk cycle have been ingested.
    pub fn process_all_references(&self) {
        self.inner.write().process_all_references();
    }

    /// Inject an out-of-band reference for a synthetic relationship. Quality
    /// defaults to `heuristic` when unset.
    pub fn add_heuristic_reference(
        &self,
        file_id: FileId,
        record: ReferenceRecord,
        source: Option<SymbolId>,
        target: Option<SymbolId>,
    ) -> ReferenceId {
        self.inner
            .write()
            .insert_out_of_band(file_id, record, source, target, RefQuality::Heuristic)
    }

    /// Inject an out-of-band reference from test tooling. Quality defaults
    /// to `test` when unset.
    pub fn add_test_reference(
        &self,
        file_id: FileId,
        record: ReferenceRecord,
        source: Option<SymbolId>,
        target: Option<SymbolId>,
    ) -> ReferenceId {
        self.inner
            .write()
            .insert_out_of_band(file_id, record, source, target, RefQuality::Test)
    }

    /// Purge every symbol, reference, scope, and import record of a file.
    pub fn remove_file(&self, file_id: FileId) {
        self.path_to_file.write().retain(|_, id| *id != file_id);
        self.inner.write().remove_file(file_id);
    }

    /// Reset to an empty state; id counters restart at 1.
    pub fn clear(&self) {
        self.inner.write().clear();
        self.path_to_file.write().clear();
        self.next_file_id.store(1, Ordering::SeqCst);
    }
}
