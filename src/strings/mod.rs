//! Interned string storage with range-aware substrings.
//!
//! The pool is the only globally shared mutable state in the crate. Interning
//! is idempotent and safe under concurrent callers: the fast path is a lock
//! read hit, the slow path double-checks under the reverse map's write guard
//! before assigning a fresh id. Ids start at 1; once minted, an id maps to
//! the same bytes until pool teardown.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

/// A view into a pooled string: `(pool id, byte start, byte length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRange {
    pub id: u32,
    pub start: u32,
    pub len: u32,
}

impl StringRange {
    /// A sub-view of this range. Pure arithmetic with no bounds check; the
    /// caller vouches for the offsets. Out-of-range views resolve to `None`
    /// (or clamp) at `get_range` time.
    pub fn subrange(&self, start: u32, len: u32) -> StringRange {
        StringRange {
            id: self.id,
            start: self.start + start,
            len,
        }
    }
}

/// A resolved range: owns the backing string and derefs to the slice.
#[derive(Debug, Clone)]
pub struct PooledStr {
    data: Arc<str>,
    start: usize,
    end: usize,
}

impl Deref for PooledStr {
    type Target = str;

    fn deref(&self) -> &str {
        &self.data[self.start..self.end]
    }
}

impl AsRef<str> for PooledStr {
    fn as_ref(&self) -> &str {
        self
    }
}

impl PartialEq<&str> for PooledStr {
    fn eq(&self, other: &&str) -> bool {
        &**self == *other
    }
}

impl std::fmt::Display for PooledStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self)
    }
}

#[derive(Debug, Default)]
pub struct StringPool {
    /// Forward storage, indexed by `id - 1`.
    strings: RwLock<Vec<Arc<str>>>,
    /// Reverse lookup for deduplication.
    lookup: DashMap<Arc<str>, u32>,
}

static GLOBAL: OnceLock<StringPool> = OnceLock::new();

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide shared pool.
    pub fn global() -> &'static StringPool {
        GLOBAL.get_or_init(StringPool::new)
    }

    /// Intern a string, returning its pool id. Idempotent: the same input
    /// always yields the same id.
    pub fn intern(&self, s: &str) -> u32 {
        if let Some(id) = self.lookup.get(s) {
            return *id;
        }

        // Slow path: the entry guard serializes racing inserters of the
        // same string; whoever wins assigns the id, the rest observe it.
        match self.lookup.entry(Arc::from(s)) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(v) => {
                let mut strings = self.strings.write();
                strings.push(v.key().clone());
                let id = strings.len() as u32;
                v.insert(id);
                id
            }
        }
    }

    /// Intern and return a range covering the whole string.
    pub fn intern_range(&self, s: &str) -> StringRange {
        StringRange {
            id: self.intern(s),
            start: 0,
            len: s.len() as u32,
        }
    }

    pub fn get(&self, id: u32) -> Option<Arc<str>> {
        if id == 0 {
            return None;
        }
        self.strings.read().get(id as usize - 1).cloned()
    }

    /// Resolve a range. A start past the end of the pooled string is "not
    /// found"; a length past the end is clamped to the entry's size.
    pub fn get_range(&self, range: StringRange) -> Option<PooledStr> {
        let data = self.get(range.id)?;
        let start = range.start as usize;
        if start > data.len() {
            return None;
        }
        let len = (range.len as usize).min(data.len() - start);
        Some(PooledStr {
            data,
            start,
            end: start + len,
        })
    }

    pub fn len(&self) -> usize {
        self.strings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.read().is_empty()
    }
}

/// Per-file view over the pool: the whole file interned once plus one
/// precomputed range per line. Newlines are excluded from each line's range;
/// the last line (with no trailing newline) is recorded too.
#[derive(Debug)]
pub struct FileStringPool {
    data: Arc<str>,
    content: StringRange,
    lines: Vec<StringRange>,
}

impl FileStringPool {
    pub fn new(pool: &StringPool, content: &str) -> Self {
        let range = pool.intern_range(content);
        let data = pool.get(range.id).expect("just interned");

        let bytes = content.as_bytes();
        let mut lines = Vec::new();
        let mut line_start = 0usize;

        for (i, &b) in bytes.iter().enumerate() {
            if b == b'\n' {
                let mut end = i;
                if end > line_start && bytes[end - 1] == b'\r' {
                    end -= 1;
                }
                lines.push(range.subrange(line_start as u32, (end - line_start) as u32));
                line_start = i + 1;
            }
        }
        if line_start < bytes.len() {
            lines.push(range.subrange(line_start as u32, (bytes.len() - line_start) as u32));
        }

        Self {
            data,
            content: range,
            lines,
        }
    }

    pub fn content_range(&self) -> StringRange {
        self.content
    }

    pub fn content(&self) -> &str {
        &self.data
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Zero-based line lookup.
    pub fn get_line(&self, index: usize) -> Option<&str> {
        let range = self.lines.get(index)?;
        let start = range.start as usize;
        Some(&self.data[start..start + range.len as usize])
    }

    /// Lines in `[lo, hi)`, both ends clamped to `[0, line_count)`.
    pub fn get_lines(&self, lo: usize, hi: usize) -> Vec<&str> {
        let hi = hi.min(self.lines.len());
        let lo = lo.min(hi);
        (lo..hi).filter_map(|i| self.get_line(i)).collect()
    }

    /// `before` lines above and `after` lines below `center`, inclusive of
    /// the center line, clamped to the file.
    pub fn get_context_lines(&self, center: usize, before: usize, after: usize) -> Vec<&str> {
        if self.lines.is_empty() {
            return Vec::new();
        }
        let center = center.min(self.lines.len() - 1);
        let lo = center.saturating_sub(before);
        let hi = (center + after + 1).min(self.lines.len());
        self.get_lines(lo, hi)
    }
}
