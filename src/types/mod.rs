use serde::{Deserialize, Serialize};
use std::num::{NonZeroU32, NonZeroU64};

/// Identifier for an ingested file. Assigned on first ingest and stable for
/// the file's lifetime in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

/// Identifier for a symbol. Composite: the upper 32 bits are the owning
/// `FileId`, the lower 32 bits a per-file local id starting at 1.
///
/// All packing and unpacking goes through [`SymbolId::pack`],
/// [`SymbolId::file_id`] and [`SymbolId::local_id`]; no other code touches
/// the bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(NonZeroU64);

/// Identifier for a reference. Composite like [`SymbolId`]:
/// `(FileId << 32) | local`. Unique across all files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceId(NonZeroU64);

impl FileId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

impl SymbolId {
    /// Pack a file id and a per-file local id into a symbol id.
    pub fn pack(file_id: FileId, local_id: u32) -> Self {
        // file_id >= 1, so the upper half is never zero.
        let raw = (u64::from(file_id.value()) << 32) | u64::from(local_id);
        Self(NonZeroU64::new(raw).expect("file id is non-zero"))
    }

    pub fn from_raw(value: u64) -> Option<Self> {
        let id = Self(NonZeroU64::new(value)?);
        // The upper half must recover a valid FileId.
        FileId::new((value >> 32) as u32)?;
        Some(id)
    }

    pub fn value(&self) -> u64 {
        self.0.get()
    }

    /// The file this symbol belongs to, recovered without a lookup.
    pub fn file_id(&self) -> FileId {
        FileId::new((self.0.get() >> 32) as u32).expect("upper half is a valid file id")
    }

    /// The per-file local id.
    pub fn local_id(&self) -> u32 {
        (self.0.get() & 0xFFFF_FFFF) as u32
    }
}

impl ReferenceId {
    pub fn pack(file_id: FileId, local_id: u32) -> Self {
        let raw = (u64::from(file_id.value()) << 32) | u64::from(local_id);
        Self(NonZeroU64::new(raw).expect("file id is non-zero"))
    }

    pub fn from_raw(value: u64) -> Option<Self> {
        let id = Self(NonZeroU64::new(value)?);
        FileId::new((value >> 32) as u32)?;
        Some(id)
    }

    pub fn value(&self) -> u64 {
        self.0.get()
    }

    pub fn file_id(&self) -> FileId {
        FileId::new((self.0.get() >> 32) as u32).expect("upper half is a valid file id")
    }

    pub fn local_id(&self) -> u32 {
        (self.0.get() & 0xFFFF_FFFF) as u32
    }
}

/// Source position span of a symbol.
///
/// Invariant: `start_line <= end_line`; when equal, `start_column <= end_column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_column: u16,
    pub end_line: u32,
    pub end_column: u16,
}

impl Range {
    pub fn new(start_line: u32, start_column: u16, end_line: u32, end_column: u16) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn contains(&self, line: u32, column: u16) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }

        if line == self.start_line && column < self.start_column {
            return false;
        }

        if line == self.end_line && column > self.end_column {
            return false;
        }

        true
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Span size used for innermost-scope tie-breaking: smaller is inner.
    pub fn line_span(&self) -> u32 {
        self.end_line - self.start_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Struct,
    Enum,
    Interface,
    Class,
    TypeAlias,
    Module,
    Variable,
    Constant,
    Field,
    Parameter,
    Unknown,
}

impl SymbolKind {
    /// Kinds that count as definitions in the name index.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Self::Function
                | Self::Method
                | Self::Struct
                | Self::Enum
                | Self::Interface
                | Self::Class
                | Self::TypeAlias
                | Self::Module
                | Self::Constant
        )
    }

    /// Kinds that can implement an interface via the heuristic matcher.
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            Self::Struct | Self::Class | Self::TypeAlias | Self::Enum
        )
    }
}

/// Access level as reported by a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Public,
    Private,
    Protected,
    Package,
    #[default]
    Unknown,
}

/// Parser-supplied visibility. `is_exported == None` means the parser did
/// not decide and the tracker infers it from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Visibility {
    pub access: Access,
    pub is_exported: Option<bool>,
}

impl Visibility {
    pub fn exported() -> Self {
        Self {
            access: Access::Public,
            is_exported: Some(true),
        }
    }

    pub fn private() -> Self {
        Self {
            access: Access::Private,
            is_exported: Some(false),
        }
    }
}

pub type CompactString = Box<str>;

pub fn compact_string(s: &str) -> CompactString {
    s.into()
}
