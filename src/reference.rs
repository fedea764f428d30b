//! Reference records: directed edges between symbols, or from a symbol to a
//! name that has not been resolved yet.

use crate::types::{CompactString, FileId, ReferenceId, SymbolId, compact_string};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Call,
    Import,
    Implements,
    Extends,
    Uses,
    Instantiates,
    TypeUse,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Import => "import",
            Self::Implements => "implements",
            Self::Extends => "extends",
            Self::Uses => "uses",
            Self::Instantiates => "instantiates",
            Self::TypeUse => "type_use",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefStrength {
    #[default]
    Tight,
    Loose,
    Transitive,
}

/// Confidence ranking over the evidence that produced a reference.
///
/// The string forms are a stable outbound contract:
/// `assigned`, `returned`, `cast`, `heuristic`, `test`, `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefQuality {
    Assigned,
    Returned,
    Cast,
    Heuristic,
    Test,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl RefQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Returned => "returned",
            Self::Cast => "cast",
            Self::Heuristic => "heuristic",
            Self::Test => "test",
            Self::Unknown => "",
        }
    }

    /// Total ordering used to rank evidence: assigned > returned > cast >
    /// heuristic. Test and unset evidence rank below all of those.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Assigned => 40,
            Self::Returned => 30,
            Self::Cast => 20,
            Self::Heuristic => 10,
            Self::Test => 5,
            Self::Unknown => 0,
        }
    }

    /// Attribution confidence for interface-call resolution.
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Assigned => 0.95,
            Self::Returned => 0.90,
            Self::Cast => 0.85,
            Self::Heuristic => 0.50,
            Self::Test | Self::Unknown => 0.30,
        }
    }
}

/// A directed reference. `source_symbol` and `target_symbol` may be unset at
/// ingest time; `ReferenceTracker::process_all_references` resolves them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub source_symbol: Option<SymbolId>,
    pub target_symbol: Option<SymbolId>,
    pub file_id: FileId,
    pub line: u32,
    pub column: u16,
    pub kind: RefKind,
    pub strength: RefStrength,
    pub referenced_name: CompactString,
    pub quality: RefQuality,
}

impl Reference {
    pub fn new(
        id: ReferenceId,
        file_id: FileId,
        line: u32,
        column: u16,
        kind: RefKind,
        referenced_name: &str,
    ) -> Self {
        Self {
            id,
            source_symbol: None,
            target_symbol: None,
            file_id,
            line,
            column,
            kind,
            strength: RefStrength::Tight,
            referenced_name: compact_string(referenced_name),
            quality: RefQuality::Unknown,
        }
    }

    pub fn with_strength(mut self, strength: RefStrength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_quality(mut self, quality: RefQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_target(mut self, target: SymbolId) -> Self {
        self.target_symbol = Some(target);
        self
    }

    pub fn with_source(mut self, source: SymbolId) -> Self {
        self.source_symbol = Some(source);
        self
    }
}

/// Parser-facing reference record, before global ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub line: u32,
    pub column: u16,
    pub kind: RefKind,
    pub strength: RefStrength,
    pub referenced_name: CompactString,
    pub quality: RefQuality,
}

impl ReferenceRecord {
    pub fn new(line: u32, column: u16, kind: RefKind, referenced_name: &str) -> Self {
        Self {
            line,
            column,
            kind,
            strength: RefStrength::Tight,
            referenced_name: compact_string(referenced_name),
            quality: RefQuality::Unknown,
        }
    }

    pub fn with_strength(mut self, strength: RefStrength) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_quality(mut self, quality: RefQuality) -> Self {
        self.quality = quality;
        self
    }
}
