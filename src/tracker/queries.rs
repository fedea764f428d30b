//! Read-side queries over the tracker: symbol lookup, reference traversal,
//! call-graph convenience accessors, type-hierarchy queries, and aggregate
//! statistics.
//!
//! Every query takes the shared lock. While `bulk_indexing` is set, queries
//! that need a consistent snapshot (name lookups and all type-hierarchy
//! queries) return empty instead of blocking the single ingest writer.

use super::{ReferenceTracker, TrackerInner};
use crate::reference::{RefKind, RefQuality, Reference};
use crate::symbol::EnhancedSymbol;
use crate::types::{FileId, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
    Both,
}

/// A type-hierarchy relation ranked by the quality of its evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRankedRef {
    pub id: SymbolId,
    pub quality: RefQuality,
    pub rank: u8,
}

/// The four type-hierarchy neighborhoods of one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRelationships {
    pub implements: Vec<SymbolId>,
    pub implemented_by: Vec<SymbolId>,
    pub extends: Vec<SymbolId>,
    pub extended_by: Vec<SymbolId>,
}

/// Call-tree node produced by [`ReferenceTracker::build_function_tree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionTreeNode {
    pub id: SymbolId,
    pub name: String,
    pub children: Vec<FunctionTreeNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceStatsSummary {
    pub total_references: u32,
    pub resolved_sources: u32,
    pub resolved_targets: u32,
    pub by_kind: HashMap<RefKind, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStatsSummary {
    pub total_calls: u32,
    pub unique_callers: u32,
    pub unique_callees: u32,
    /// `(name, incoming call count)`, descending, top 10.
    pub most_called: Vec<(String, u32)>,
    /// `(name, outgoing call count)`, descending, top 10.
    pub most_calling: Vec<(String, u32)>,
}

impl TrackerInner {
    fn callee_ids(&self, id: SymbolId) -> Vec<SymbolId> {
        let Some(symbol) = self.store.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        symbol
            .outgoing_refs
            .iter()
            .filter_map(|r| self.reference(*r))
            .filter(|r| r.kind == RefKind::Call)
            .filter_map(|r| r.target_symbol)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    fn caller_ids(&self, id: SymbolId) -> Vec<SymbolId> {
        let Some(symbol) = self.store.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        symbol
            .incoming_refs
            .iter()
            .filter_map(|r| self.reference(*r))
            .filter(|r| r.kind == RefKind::Call)
            .filter_map(|r| r.source_symbol)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Incoming relations of `kind`: the sources pointing at `id`.
    fn incoming_relation_sources(&self, id: SymbolId, kind: RefKind) -> Vec<SymbolId> {
        let Some(symbol) = self.store.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        symbol
            .incoming_refs
            .iter()
            .filter_map(|r| self.reference(*r))
            .filter(|r| r.kind == kind)
            .filter_map(|r| r.source_symbol)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Outgoing relations of `kind`: the targets `id` points at.
    fn outgoing_relation_targets(&self, id: SymbolId, kind: RefKind) -> Vec<SymbolId> {
        let Some(symbol) = self.store.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        symbol
            .outgoing_refs
            .iter()
            .filter_map(|r| self.reference(*r))
            .filter(|r| r.kind == kind)
            .filter_map(|r| r.target_symbol)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Like the plain relation queries, but keeping the best evidence per
    /// peer and sorting by quality rank, descending.
    fn ranked_relations(
        &self,
        id: SymbolId,
        kind: RefKind,
        incoming: bool,
    ) -> Vec<QualityRankedRef> {
        let Some(symbol) = self.store.get(id) else {
            return Vec::new();
        };
        let refs = if incoming {
            &symbol.incoming_refs
        } else {
            &symbol.outgoing_refs
        };

        let mut best: HashMap<SymbolId, RefQuality> = HashMap::new();
        for reference in refs.iter().filter_map(|r| self.reference(*r)) {
            if reference.kind != kind {
                continue;
            }
            let peer = if incoming {
                reference.source_symbol
            } else {
                reference.target_symbol
            };
            let Some(peer) = peer else { continue };
            let entry = best.entry(peer).or_insert(reference.quality);
            if reference.quality.rank() > entry.rank() {
                *entry = reference.quality;
            }
        }

        let mut ranked: Vec<QualityRankedRef> = best
            .into_iter()
            .map(|(id, quality)| QualityRankedRef {
                id,
                quality,
                rank: quality.rank(),
            })
            .collect();
        ranked.sort_by(|a, b| b.rank.cmp(&a.rank).then(a.id.cmp(&b.id)));
        ranked
    }

    fn function_tree(
        &self,
        id: SymbolId,
        depth: usize,
        max_depth: usize,
        visited: &mut HashSet<SymbolId>,
    ) -> Option<FunctionTreeNode> {
        let symbol = self.store.get(id)?;
        // The visited set is never unwound on return: a node reached once is
        // never expanded again, which breaks cycles.
        if !visited.insert(id) {
            return None;
        }

        let mut node = FunctionTreeNode {
            id,
            name: symbol.name.to_string(),
            children: Vec::new(),
        };
        if depth < max_depth {
            for callee in self.callee_ids(id) {
                if let Some(child) = self.function_tree(callee, depth + 1, max_depth, visited) {
                    node.children.push(child);
                }
            }
        }
        Some(node)
    }
}

impl ReferenceTracker {
    /// All symbols with this exact name. Empty during bulk indexing.
    pub fn find_symbols_by_name(&self, name: &str) -> Vec<EnhancedSymbol> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        let inner = self.inner.read();
        inner
            .name_index
            .get(name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.store.get(*id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First symbol with this name in a specific file. `None` during bulk
    /// indexing.
    pub fn find_symbol_by_file_and_name(
        &self,
        file_id: FileId,
        name: &str,
    ) -> Option<EnhancedSymbol> {
        if self.is_bulk_indexing() {
            return None;
        }
        let inner = self.inner.read();
        inner
            .name_index
            .get(name)?
            .iter()
            .filter_map(|id| inner.store.get(*id))
            .find(|s| s.file_id == file_id)
            .cloned()
    }

    pub fn get_enhanced_symbol(&self, id: SymbolId) -> Option<EnhancedSymbol> {
        self.inner.read().store.get(id).cloned()
    }

    pub fn get_file_enhanced_symbols(&self, file_id: FileId) -> Vec<EnhancedSymbol> {
        let inner = self.inner.read();
        inner
            .symbols_by_file
            .get(&file_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.store.get(*id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Innermost symbol whose line span covers `line`. No column precision.
    pub fn get_symbol_at_line(&self, file_id: FileId, line: u32) -> Option<EnhancedSymbol> {
        let inner = self.inner.read();
        inner
            .symbols_by_file
            .get(&file_id)?
            .iter()
            .filter_map(|id| inner.store.get(*id))
            .filter(|s| s.range.contains_line(line))
            .min_by_key(|s| s.range.line_span())
            .cloned()
    }

    pub fn get_symbol_references(&self, id: SymbolId, direction: Direction) -> Vec<Reference> {
        let inner = self.inner.read();
        let Some(symbol) = inner.store.get(id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if matches!(direction, Direction::Incoming | Direction::Both) {
            out.extend(
                symbol
                    .incoming_refs
                    .iter()
                    .filter_map(|r| inner.reference(*r))
                    .cloned(),
            );
        }
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            out.extend(
                symbol
                    .outgoing_refs
                    .iter()
                    .filter_map(|r| inner.reference(*r))
                    .cloned(),
            );
        }
        out
    }

    /// Union of every reference touching any symbol of the file, including
    /// references owned by other files that resolved into it.
    pub fn get_file_references(&self, file_id: FileId) -> Vec<Reference> {
        let inner = self.inner.read();
        let Some(ids) = inner.symbols_by_file.get(&file_id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for symbol in ids.iter().filter_map(|id| inner.store.get(*id)) {
            for ref_id in symbol.incoming_refs.iter().chain(&symbol.outgoing_refs) {
                if seen.insert(*ref_id) {
                    if let Some(reference) = inner.reference(*ref_id) {
                        out.push(reference.clone());
                    }
                }
            }
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub fn get_callee_ids(&self, id: SymbolId) -> Vec<SymbolId> {
        self.inner.read().callee_ids(id)
    }

    pub fn get_caller_ids(&self, id: SymbolId) -> Vec<SymbolId> {
        self.inner.read().caller_ids(id)
    }

    pub fn get_callee_names(&self, id: SymbolId) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .callee_ids(id)
            .into_iter()
            .filter_map(|c| inner.store.get(c))
            .map(|s| s.name.to_string())
            .collect()
    }

    pub fn get_caller_names(&self, id: SymbolId) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .caller_ids(id)
            .into_iter()
            .filter_map(|c| inner.store.get(c))
            .map(|s| s.name.to_string())
            .collect()
    }

    /// Types implementing this interface. Empty during bulk indexing.
    pub fn get_implementors(&self, interface_id: SymbolId) -> Vec<SymbolId> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        self.inner
            .read()
            .incoming_relation_sources(interface_id, RefKind::Implements)
    }

    /// Interfaces this type implements. Empty during bulk indexing.
    pub fn get_implemented_interfaces(&self, type_id: SymbolId) -> Vec<SymbolId> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        self.inner
            .read()
            .outgoing_relation_targets(type_id, RefKind::Implements)
    }

    /// Base types this type extends. Empty during bulk indexing.
    pub fn get_base_types(&self, type_id: SymbolId) -> Vec<SymbolId> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        self.inner
            .read()
            .outgoing_relation_targets(type_id, RefKind::Extends)
    }

    /// Types extending this one. Empty during bulk indexing.
    pub fn get_derived_types(&self, type_id: SymbolId) -> Vec<SymbolId> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        self.inner
            .read()
            .incoming_relation_sources(type_id, RefKind::Extends)
    }

    pub fn get_implementors_with_quality(&self, interface_id: SymbolId) -> Vec<QualityRankedRef> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        self.inner
            .read()
            .ranked_relations(interface_id, RefKind::Implements, true)
    }

    pub fn get_implemented_interfaces_with_quality(
        &self,
        type_id: SymbolId,
    ) -> Vec<QualityRankedRef> {
        if self.is_bulk_indexing() {
            return Vec::new();
        }
        self.inner
            .read()
            .ranked_relations(type_id, RefKind::Implements, false)
    }

    /// All four hierarchy neighborhoods at once. Empty during bulk indexing.
    pub fn get_type_relationships(&self, id: SymbolId) -> TypeRelationships {
        if self.is_bulk_indexing() {
            return TypeRelationships::default();
        }
        let inner = self.inner.read();
        TypeRelationships {
            implements: inner.outgoing_relation_targets(id, RefKind::Implements),
            implemented_by: inner.incoming_relation_sources(id, RefKind::Implements),
            extends: inner.outgoing_relation_targets(id, RefKind::Extends),
            extended_by: inner.incoming_relation_sources(id, RefKind::Extends),
        }
    }

    /// Depth-limited callee tree. The visited set persists across branches,
    /// so a symbol appears at most once in the whole tree and cycles cannot
    /// recurse.
    pub fn build_function_tree(
        &self,
        id: SymbolId,
        max_depth: usize,
    ) -> Option<FunctionTreeNode> {
        let inner = self.inner.read();
        let mut visited = HashSet::new();
        inner.function_tree(id, 0, max_depth, &mut visited)
    }

    pub fn get_reference_stats(&self) -> ReferenceStatsSummary {
        let inner = self.inner.read();
        let mut summary = ReferenceStatsSummary::default();
        for refs in inner.references.values() {
            for reference in refs {
                summary.total_references += 1;
                if reference.source_symbol.is_some() {
                    summary.resolved_sources += 1;
                }
                if reference.target_symbol.is_some() {
                    summary.resolved_targets += 1;
                }
                *summary.by_kind.entry(reference.kind).or_insert(0) += 1;
            }
        }
        summary
    }

    pub fn get_call_stats(&self) -> CallStatsSummary {
        let inner = self.inner.read();
        let mut incoming: HashMap<SymbolId, u32> = HashMap::new();
        let mut outgoing: HashMap<SymbolId, u32> = HashMap::new();
        let mut total = 0u32;

        for refs in inner.references.values() {
            for reference in refs.iter().filter(|r| r.kind == RefKind::Call) {
                total += 1;
                if let Some(target) = reference.target_symbol {
                    *incoming.entry(target).or_insert(0) += 1;
                }
                if let Some(source) = reference.source_symbol {
                    *outgoing.entry(source).or_insert(0) += 1;
                }
            }
        }

        let top = |map: &HashMap<SymbolId, u32>| -> Vec<(String, u32)> {
            let mut entries: Vec<(String, u32)> = map
                .iter()
                .filter_map(|(id, count)| {
                    inner.store.get(*id).map(|s| (s.name.to_string(), *count))
                })
                .collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            entries.truncate(10);
            entries
        };

        CallStatsSummary {
            total_calls: total,
            unique_callers: outgoing.len() as u32,
            unique_callees: incoming.len() as u32,
            most_called: top(&incoming),
            most_calling: top(&outgoing),
        }
    }
}
