//! Trigram index: coarse textual candidate filtering.
//!
//! Every file's content is reduced to a set of 3-byte (pure ASCII) or 3-rune
//! windows that contain at least one alphanumeric rune. A pattern query
//! intersects the posting lists of the pattern's trigrams, which bounds the
//! set of files a precise search has to open. Extraction is deterministic and
//! bounded by `|content| - 2` windows.

use crate::types::FileId;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// Default number of deferred invalidations before a cleanup pass runs.
pub const DEFAULT_CLEANUP_THRESHOLD: usize = 100;

/// Maximum cached candidate queries.
const QUERY_CACHE_CAP: usize = 128;

/// A literal occurrence of a pattern inside an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLocation {
    pub file_id: FileId,
    pub offset: u32,
}

/// Extract `(trigram, offset)` pairs from content.
///
/// Windows without a single alphanumeric rune are skipped, so runs of
/// punctuation and whitespace do not pollute the posting lists.
pub fn extract_trigrams(content: &str, case_insensitive: bool) -> Vec<(u32, u32)> {
    if content.len() < 3 {
        return Vec::new();
    }

    if content.is_ascii() {
        let bytes = content.as_bytes();
        let mut out = Vec::with_capacity(bytes.len() - 2);
        for i in 0..bytes.len() - 2 {
            let (mut a, mut b, mut c) = (bytes[i], bytes[i + 1], bytes[i + 2]);
            if !(a.is_ascii_alphanumeric() || b.is_ascii_alphanumeric() || c.is_ascii_alphanumeric())
            {
                continue;
            }
            if case_insensitive {
                a = a.to_ascii_lowercase();
                b = b.to_ascii_lowercase();
                c = c.to_ascii_lowercase();
            }
            let gram = (u32::from(a) << 16) | (u32::from(b) << 8) | u32::from(c);
            out.push((gram, i as u32));
        }
        return out;
    }

    // Rune path: decode once, then slide a 3-rune window.
    let chars: Vec<(usize, char)> = content.char_indices().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(chars.len() - 2);
    for w in chars.windows(3) {
        let (offset, _) = w[0];
        if !w.iter().any(|(_, c)| c.is_alphanumeric()) {
            continue;
        }
        let mut gram: u32 = 0;
        for &(_, c) in w {
            let c = if case_insensitive {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                c
            };
            gram = gram.wrapping_mul(0x0100_0193).wrapping_add(c as u32);
        }
        out.push((gram, offset as u32));
    }
    out
}

fn build_postings(content: &str, case_insensitive: bool) -> HashMap<u32, Vec<u32>> {
    let mut postings: HashMap<u32, Vec<u32>> = HashMap::new();
    for (gram, offset) in extract_trigrams(content, case_insensitive) {
        postings.entry(gram).or_default().push(offset);
    }
    postings
}

#[derive(Debug, Default)]
struct FilePostings {
    /// Case-sensitive grams.
    exact: HashMap<u32, Vec<u32>>,
    /// Lowercased grams for case-insensitive queries.
    folded: HashMap<u32, Vec<u32>>,
}

#[derive(Debug, Default)]
struct QueryCache {
    entries: HashMap<(Box<str>, bool), Vec<FileId>>,
    order: VecDeque<(Box<str>, bool)>,
}

impl QueryCache {
    fn get(&self, pattern: &str, case_insensitive: bool) -> Option<Vec<FileId>> {
        self.entries
            .get(&(Box::from(pattern), case_insensitive))
            .cloned()
    }

    fn insert(&mut self, pattern: &str, case_insensitive: bool, result: Vec<FileId>) {
        let key = (Box::from(pattern), case_insensitive);
        if self.entries.insert(key.clone(), result).is_none() {
            self.order.push_back(key);
            while self.order.len() > QUERY_CACHE_CAP {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<FileId, FilePostings>,
    /// Files removed but not yet purged from `files`.
    removed: HashSet<FileId>,
    pending_invalidations: usize,
    cache: QueryCache,
}

impl Inner {
    fn cleanup(&mut self) {
        if self.removed.is_empty() {
            self.pending_invalidations = 0;
            return;
        }
        let purged = self.removed.len();
        for file_id in self.removed.drain() {
            self.files.remove(&file_id);
        }
        self.pending_invalidations = 0;
        tracing::debug!(target: "trigram", "cleanup purged {purged} invalidated files");
    }

    fn candidates(&self, pattern: &str, case_insensitive: bool) -> Vec<FileId> {
        let needle: Vec<u32> = {
            let mut grams: Vec<u32> = extract_trigrams(pattern, case_insensitive)
                .into_iter()
                .map(|(g, _)| g)
                .collect();
            grams.sort_unstable();
            grams.dedup();
            grams
        };
        if needle.is_empty() {
            return Vec::new();
        }

        let mut out: Vec<FileId> = self
            .files
            .iter()
            .filter(|(file_id, _)| !self.removed.contains(file_id))
            .filter(|(_, postings)| {
                let table = if case_insensitive {
                    &postings.folded
                } else {
                    &postings.exact
                };
                needle.iter().all(|g| table.contains_key(g))
            })
            .map(|(file_id, _)| *file_id)
            .collect();
        out.sort_unstable();
        out
    }
}

pub struct TrigramIndex {
    inner: RwLock<Inner>,
    bulk_indexing: AtomicBool,
    cleanup_threshold: usize,
}

impl Default for TrigramIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TrigramIndex {
    pub fn new() -> Self {
        Self::with_cleanup_threshold(DEFAULT_CLEANUP_THRESHOLD)
    }

    pub fn with_cleanup_threshold(cleanup_threshold: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            bulk_indexing: AtomicBool::new(false),
            cleanup_threshold: cleanup_threshold.max(1),
        }
    }

    /// Toggle bulk mode. While set there is exactly one writer, candidate
    /// queries return empty, and the pattern cache is not consulted.
    pub fn set_bulk_indexing(&self, enabled: bool) {
        self.bulk_indexing.store(enabled, Ordering::SeqCst);
    }

    pub fn is_bulk_indexing(&self) -> bool {
        self.bulk_indexing.load(Ordering::SeqCst)
    }

    pub fn index_file(&self, file_id: FileId, content: &str) {
        let exact = build_postings(content, false);
        let folded = build_postings(content, true);

        let mut inner = self.inner.write();
        inner.removed.remove(&file_id);
        inner.files.insert(file_id, FilePostings { exact, folded });
        inner.cache.clear();
    }

    /// Index many files at once during the initial build. Extraction runs in
    /// parallel; installation happens under one exclusive borrow, which is
    /// the single-writer hot path bulk mode promises.
    pub fn index_files_bulk(&mut self, items: &[(FileId, &str)]) {
        let extracted: Vec<(FileId, FilePostings)> = items
            .par_iter()
            .map(|(file_id, content)| {
                (
                    *file_id,
                    FilePostings {
                        exact: build_postings(content, false),
                        folded: build_postings(content, true),
                    },
                )
            })
            .collect();

        let inner = self.inner.get_mut();
        for (file_id, postings) in extracted {
            inner.removed.remove(&file_id);
            inner.files.insert(file_id, postings);
        }
        inner.cache.clear();
    }

    /// Replace a file's postings. Equivalent to `remove_file` followed by
    /// `index_file`, with a single batched cache invalidation.
    pub fn update_file(&self, file_id: FileId, _old: &str, new: &str) {
        let exact = build_postings(new, false);
        let folded = build_postings(new, true);

        let mut inner = self.inner.write();
        inner.files.insert(file_id, FilePostings { exact, folded });
        inner.removed.remove(&file_id);
        inner.pending_invalidations += 1;
        inner.cache.clear();
        if inner.pending_invalidations >= self.cleanup_threshold {
            inner.cleanup();
        }
    }

    /// Mark a file invalidated. The posting purge is deferred until
    /// `cleanup_threshold` invalidations accumulate or `force_cleanup` runs;
    /// queries stop returning the file immediately.
    pub fn remove_file(&self, file_id: FileId) {
        let mut inner = self.inner.write();
        if !inner.files.contains_key(&file_id) {
            return;
        }
        inner.removed.insert(file_id);
        inner.pending_invalidations += 1;
        inner.cache.clear();
        if inner.pending_invalidations >= self.cleanup_threshold {
            inner.cleanup();
        }
    }

    pub fn force_cleanup(&self) {
        self.inner.write().cleanup();
    }

    /// Files whose postings are still resident (after cleanup).
    pub fn indexed_file_count(&self) -> usize {
        let inner = self.inner.read();
        inner.files.len() - inner.removed.len()
    }

    /// Candidate files that may contain `pattern`. Patterns shorter than one
    /// trigram return empty: the index has nothing to say about them.
    pub fn find_candidates(&self, pattern: &str) -> Vec<FileId> {
        self.find_candidates_impl(pattern, false)
    }

    pub fn find_candidates_case_insensitive(&self, pattern: &str) -> Vec<FileId> {
        self.find_candidates_impl(pattern, true)
    }

    fn find_candidates_impl(&self, pattern: &str, case_insensitive: bool) -> Vec<FileId> {
        if pattern.chars().count() < 3 {
            return Vec::new();
        }
        if self.is_bulk_indexing() {
            return Vec::new();
        }

        {
            let inner = self.inner.read();
            if let Some(hit) = inner.cache.get(pattern, case_insensitive) {
                return hit;
            }
        }

        let mut inner = self.inner.write();
        if inner.pending_invalidations > 0 && inner.pending_invalidations >= self.cleanup_threshold
        {
            inner.cleanup();
        }
        let result = inner.candidates(pattern, case_insensitive);
        inner.cache.insert(pattern, case_insensitive, result.clone());
        result
    }

    /// Positions at which `pattern` literally occurs, using `file_provider`
    /// to fetch candidate contents. Missing files are skipped and logged; the
    /// result is best-effort over the files the provider could serve.
    pub fn find_match_locations<F>(
        &self,
        pattern: &str,
        case_insensitive: bool,
        file_provider: F,
    ) -> Vec<MatchLocation>
    where
        F: Fn(FileId) -> Option<String>,
    {
        let candidates = self.find_candidates_impl(pattern, case_insensitive);
        let needle = if case_insensitive {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };

        let mut out = Vec::new();
        for file_id in candidates {
            let Some(content) = file_provider(file_id) else {
                tracing::debug!(
                    target: "trigram",
                    "file {} missing from provider, skipping",
                    file_id.value()
                );
                continue;
            };
            let haystack = if case_insensitive {
                content.to_lowercase()
            } else {
                content
            };

            let mut from = 0;
            while let Some(pos) = haystack[from..].find(&needle) {
                let offset = from + pos;
                out.push(MatchLocation {
                    file_id,
                    offset: offset as u32,
                });
                // Advancing past the match keeps `from` on a char boundary.
                from = offset + needle.len();
            }
        }
        out
    }
}
