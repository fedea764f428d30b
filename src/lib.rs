//! In-memory code intelligence index for large polyglot codebases.
//!
//! The crate answers questions of the form "what calls X", "what does X
//! depend on", "what implements interface Y", "which symbols are critical by
//! transitive reachability", and "how pure is this function" — for developer
//! tooling such as code search, LLM context assembly, and static-analysis
//! dashboards.
//!
//! Parsers are external collaborators: they emit per-file batches of
//! [`Symbol`], [`ReferenceRecord`], [`ScopeInfo`], and import records, which
//! the [`ReferenceTracker`] ingests and resolves. The [`GraphPropagator`]
//! and [`SideEffectPropagator`] derive attributes over the resulting graph,
//! the [`TrigramIndex`] accelerates textual candidate lookup, and the
//! [`ContextLookupEngine`] assembles read-side views.

pub mod config;
pub mod context;
pub mod effects;
pub mod error;
pub mod imports;
pub mod index;
pub mod logging;
pub mod propagate;
pub mod reference;
pub mod scope;
pub mod storage;
pub mod strings;
pub mod symbol;
pub mod tracker;
pub mod trigram;
pub mod types;

pub use config::{IndexingConfig, LoggingConfig, Settings};
pub use context::{CodeObjectContext, ContextConfig, ContextLookupEngine, Diagnostics};
pub use effects::{
    EffectCategories, PurityLevel, PurityReport, SideEffectConfig, SideEffectInfo,
    SideEffectPropagator,
};
pub use error::{ContextError, ErrorContext, IndexError, IndexResult, PropagationError};
pub use imports::{FileImportData, ImportRecord, ImportResolver};
pub use index::{IndexStatistics, SymbolIndex, SymbolLookup};
pub use propagate::{
    Annotation, AttrKind, AttributionMethod, CriticalPath, CustomRule, DependencyRule,
    GraphPropagator, InterfaceAttribution, LabelRule, PropagatedDependency, PropagatedLabel,
    PropagationConfig, PropagationDirection, PropagationMode, PropagationValue,
};
pub use reference::{RefKind, RefQuality, RefStrength, Reference, ReferenceRecord};
pub use scope::{ScopeInfo, ScopeKind};
pub use storage::{SymbolLocationIndex, SymbolStore};
pub use strings::{FileStringPool, PooledStr, StringPool, StringRange};
pub use symbol::{EnhancedSymbol, RefStats, Symbol};
pub use tracker::{
    CallStatsSummary, Direction, FunctionTreeNode, QualityRankedRef, ReferenceStatsSummary,
    ReferenceTracker, TypeRelationships,
};
pub use trigram::{MatchLocation, TrigramIndex};
pub use types::{FileId, Range, ReferenceId, SymbolId, SymbolKind, Visibility};
