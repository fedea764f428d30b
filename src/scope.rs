//! Scopes and scope-chain construction.
//!
//! A symbol at line `L` is inside scope `S` iff
//! `S.start_line <= L && (S.end_line == 0 || S.end_line >= L)`;
//! `end_line == 0` means open-ended (the file scope).

use crate::types::{CompactString, compact_string};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    File,
    Module,
    Function,
    Class,
    Interface,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub name: CompactString,
    pub kind: ScopeKind,
    pub start_line: u32,
    /// `0` means open-ended: the scope runs to the end of the file.
    pub end_line: u32,
}

impl ScopeInfo {
    pub fn new(name: &str, kind: ScopeKind, start_line: u32, end_line: u32) -> Self {
        Self {
            name: compact_string(name),
            kind,
            start_line,
            end_line,
        }
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && (self.end_line == 0 || self.end_line >= line)
    }
}

/// Builds scope chains for symbols and caches them.
///
/// The cache key hashes `(line, end_line, scope_count)`. Hash collisions are
/// possible, so each entry stores the original triple and a lookup only hits
/// on an exact match.
#[derive(Debug, Default)]
pub struct ScopeChainBuilder {
    cache: HashMap<u64, CachedChain>,
}

#[derive(Debug)]
struct CachedChain {
    line: u32,
    end_line: u32,
    scope_count: usize,
    chain: Vec<ScopeInfo>,
}

impl ScopeChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordered list of scopes enclosing a symbol spanning
    /// `line..=end_line`, in source order.
    pub fn chain_for(&mut self, line: u32, end_line: u32, scopes: &[ScopeInfo]) -> Vec<ScopeInfo> {
        let key = Self::cache_key(line, end_line, scopes.len());

        if let Some(entry) = self.cache.get(&key) {
            if entry.line == line && entry.end_line == end_line && entry.scope_count == scopes.len()
            {
                return entry.chain.clone();
            }
        }

        let chain: Vec<ScopeInfo> = scopes
            .iter()
            .filter(|s| s.contains_line(line))
            .cloned()
            .collect();

        self.cache.insert(
            key,
            CachedChain {
                line,
                end_line,
                scope_count: scopes.len(),
                chain: chain.clone(),
            },
        );

        chain
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn cache_key(line: u32, end_line: u32, scope_count: usize) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        line.hash(&mut hasher);
        end_line.hash(&mut hasher);
        scope_count.hash(&mut hasher);
        hasher.finish()
    }
}
