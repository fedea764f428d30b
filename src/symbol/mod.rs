use crate::reference::{RefKind, RefStrength};
use crate::scope::ScopeInfo;
use crate::types::{
    CompactString, FileId, Range, ReferenceId, SymbolId, SymbolKind, Visibility,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parser-facing symbol record, before the tracker assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: CompactString,
    pub kind: SymbolKind,
    pub range: Range,
    /// Receiver type for methods (e.g. `*FileHandler` in Go). The heuristic
    /// implementor matcher strips the leading `*` when grouping.
    pub receiver_type: Option<CompactString>,
    pub visibility: Visibility,
    pub signature: Option<Box<str>>,
}

impl Symbol {
    pub fn new(name: impl Into<CompactString>, kind: SymbolKind, range: Range) -> Self {
        Self {
            name: name.into(),
            kind,
            range,
            receiver_type: None,
            visibility: Visibility::default(),
            signature: None,
        }
    }

    pub fn with_receiver(mut self, receiver_type: impl Into<CompactString>) -> Self {
        self.receiver_type = Some(receiver_type.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<Box<str>>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// Per-direction strength histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrengthCounts {
    pub tight: u32,
    pub loose: u32,
    pub transitive: u32,
}

impl StrengthCounts {
    pub fn bump(&mut self, strength: RefStrength) {
        match strength {
            RefStrength::Tight => self.tight += 1,
            RefStrength::Loose => self.loose += 1,
            RefStrength::Transitive => self.transitive += 1,
        }
    }
}

/// Granularity buckets for dashboard aggregation. All five named buckets
/// currently carry the same value as `total`; finer accounting is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranularityBuckets {
    pub folder: u32,
    pub file: u32,
    pub class: u32,
    pub function: u32,
    pub variable: u32,
    pub total: u32,
}

impl GranularityBuckets {
    pub fn from_total(total: u32) -> Self {
        Self {
            folder: total,
            file: total,
            class: total,
            function: total,
            variable: total,
            total,
        }
    }
}

/// Aggregated reference statistics for one symbol.
///
/// `incoming_count` excludes `Import` references so that "A imports module B"
/// does not inflate B's usage numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefStats {
    pub incoming_count: u32,
    pub outgoing_count: u32,
    pub incoming_files: u32,
    pub outgoing_files: u32,
    pub by_type: HashMap<RefKind, u32>,
    pub strength: StrengthCounts,
    pub buckets: GranularityBuckets,
}

/// A symbol as stored by the index: the parser record plus everything the
/// tracker derives. Owned exclusively by the symbol store; everything else
/// refers to it by [`SymbolId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSymbol {
    pub id: SymbolId,
    pub name: CompactString,
    pub kind: SymbolKind,
    pub file_id: FileId,
    pub range: Range,
    pub receiver_type: Option<CompactString>,
    pub signature: Option<Box<str>>,
    pub scope_chain: Vec<ScopeInfo>,
    pub incoming_refs: Vec<ReferenceId>,
    pub outgoing_refs: Vec<ReferenceId>,
    pub ref_stats: RefStats,
    pub is_exported: bool,
    pub complexity: u32,
}

impl EnhancedSymbol {
    pub fn from_symbol(
        id: SymbolId,
        file_id: FileId,
        symbol: Symbol,
        scope_chain: Vec<ScopeInfo>,
        is_exported: bool,
    ) -> Self {
        Self {
            id,
            name: symbol.name,
            kind: symbol.kind,
            file_id,
            range: symbol.range,
            receiver_type: symbol.receiver_type,
            signature: symbol.signature,
            scope_chain,
            incoming_refs: Vec::new(),
            outgoing_refs: Vec::new(),
            ref_stats: RefStats::default(),
            is_exported,
            complexity: 0,
        }
    }

    /// Receiver type with any leading `*` stripped, as used for method
    /// grouping.
    pub fn normalized_receiver(&self) -> Option<&str> {
        self.receiver_type
            .as_deref()
            .map(|r| r.trim_start_matches('*'))
    }

    /// Push a reference id onto an adjacency list, skipping duplicates.
    pub fn add_incoming(&mut self, ref_id: ReferenceId) {
        if !self.incoming_refs.contains(&ref_id) {
            self.incoming_refs.push(ref_id);
        }
    }

    pub fn add_outgoing(&mut self, ref_id: ReferenceId) {
        if !self.outgoing_refs.contains(&ref_id) {
            self.outgoing_refs.push(ref_id);
        }
    }
}
