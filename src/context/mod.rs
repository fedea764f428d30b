//! Read-side facade assembling "object context": everything a client needs
//! to show or reason about one symbol, gathered from the tracker, the symbol
//! index, and the propagators.
//!
//! Partial-failure contract: only a missing tracker, a missing symbol index,
//! or an invalid object id are fatal. Every other section failure lands in
//! the returned [`Diagnostics`] and the caller gets a best-effort context.

use crate::effects::SideEffectPropagator;
use crate::error::{ContextError, ContextResult};
use crate::index::SymbolIndex;
use crate::propagate::{GraphPropagator, PropagatedDependency, PropagatedLabel};
use crate::tracker::{ReferenceTracker, TypeRelationships};
use crate::types::{SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const ENTRY_CHAIN_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Labels whose presence marks a symbol as an entry-point chain anchor.
    pub entry_point_labels: Vec<String>,
    /// Labels contributing to the criticality score.
    pub critical_labels: Vec<String>,
    /// Attach the AI-context stub section.
    pub include_ai_context: bool,
}

impl ContextConfig {
    pub fn standard() -> Self {
        Self {
            entry_point_labels: vec!["api-endpoint".to_string()],
            critical_labels: vec!["critical".to_string(), "security".to_string()],
            include_ai_context: false,
        }
    }
}

/// Section failures and warnings accumulated while assembling a context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub failed_sections: Vec<String>,
}

impl Diagnostics {
    fn section_failed(&mut self, section: &str, reason: &str) {
        tracing::debug!(target: "context", "section {section} failed: {reason}");
        self.failed_sections.push(section.to_string());
        self.warnings.push(format!("{section}: {reason}"));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub signature: Option<String>,
    pub file_path: Option<String>,
    pub line: u32,
    pub column: u16,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipsSection {
    pub callers: Vec<String>,
    pub callees: Vec<String>,
    pub hierarchy: TypeRelationships,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariablesSection {
    /// Variables and constants declared within the symbol's span.
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticSection {
    /// Caller chains from this symbol up to an indexed entry point.
    pub entry_point_chains: Vec<Vec<String>>,
    pub propagation_labels: Vec<PropagatedLabel>,
    pub service_dependencies: Vec<PropagatedDependency>,
    /// Max strength across the configured critical labels.
    pub criticality: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSection {
    pub file_path: String,
    pub module_path: String,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub inheritance: TypeRelationships,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSection {
    pub fan_in: u32,
    pub fan_out: u32,
    pub complexity: u32,
    /// Rough 0..1 estimate of how widely a change would ripple.
    pub change_impact: f64,
    /// Test files that reference this symbol, by name only; no coverage is
    /// measured.
    pub discovered_test_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiContextSection {
    pub summary: String,
    pub hints: Vec<String>,
}

/// The assembled context for one symbol. JSON-serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObjectContext {
    pub id: SymbolId,
    pub basic: BasicInfo,
    pub relationships: Option<RelationshipsSection>,
    pub variables: Option<VariablesSection>,
    pub semantic: Option<SemanticSection>,
    pub structure: Option<StructureSection>,
    pub usage: Option<UsageSection>,
    pub ai_context: Option<AiContextSection>,
    pub diagnostics: Diagnostics,
}

pub struct ContextLookupEngine<'a> {
    tracker: Option<&'a ReferenceTracker>,
    symbol_index: Option<&'a SymbolIndex>,
    propagator: Option<&'a GraphPropagator<'a>>,
    effects: Option<&'a SideEffectPropagator<'a>>,
    config: ContextConfig,
}

impl<'a> ContextLookupEngine<'a> {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            tracker: None,
            symbol_index: None,
            propagator: None,
            effects: None,
            config,
        }
    }

    pub fn with_tracker(mut self, tracker: &'a ReferenceTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_symbol_index(mut self, index: &'a SymbolIndex) -> Self {
        self.symbol_index = Some(index);
        self
    }

    pub fn with_propagator(mut self, propagator: &'a GraphPropagator<'a>) -> Self {
        self.propagator = Some(propagator);
        self
    }

    pub fn with_effects(mut self, effects: &'a SideEffectPropagator<'a>) -> Self {
        self.effects = Some(effects);
        self
    }

    /// Assemble the full context for a symbol. Best-effort: section failures
    /// are reported in the diagnostics, not returned as errors.
    pub fn get_context(&self, object_id: SymbolId) -> ContextResult<CodeObjectContext> {
        let tracker = self.tracker.ok_or(ContextError::MissingTracker)?;
        let symbol_index = self.symbol_index.ok_or(ContextError::MissingSymbolIndex)?;
        let symbol = tracker
            .get_enhanced_symbol(object_id)
            .ok_or(ContextError::InvalidObjectId {
                raw: object_id.value(),
            })?;

        let mut diagnostics = Diagnostics::default();
        let file_path = tracker
            .inner
            .read()
            .file_paths
            .get(&symbol.file_id)
            .map(|p| p.to_string());

        let basic = BasicInfo {
            name: symbol.name.to_string(),
            kind: symbol.kind,
            signature: symbol.signature.as_deref().map(str::to_string),
            file_path: file_path.clone(),
            line: symbol.range.start_line,
            column: symbol.range.start_column,
            is_exported: symbol.is_exported,
        };

        let relationships = match self.relationships(tracker, object_id) {
            Ok(section) => Some(section),
            Err(reason) => {
                diagnostics.section_failed("relationships", &reason);
                None
            }
        };
        let variables = match self.variables(tracker, object_id) {
            Ok(section) => Some(section),
            Err(reason) => {
                diagnostics.section_failed("variables", &reason);
                None
            }
        };
        let semantic = match self.semantic(tracker, symbol_index, object_id) {
            Ok(section) => Some(section),
            Err(reason) => {
                diagnostics.section_failed("semantic", &reason);
                None
            }
        };
        let structure = match self.structure(tracker, object_id, file_path.as_deref()) {
            Ok(section) => Some(section),
            Err(reason) => {
                diagnostics.section_failed("structure", &reason);
                None
            }
        };
        let usage = match self.usage(tracker, object_id) {
            Ok(section) => Some(section),
            Err(reason) => {
                diagnostics.section_failed("usage", &reason);
                None
            }
        };
        let ai_context = if self.config.include_ai_context {
            Some(self.ai_context(&basic))
        } else {
            None
        };

        Ok(CodeObjectContext {
            id: object_id,
            basic,
            relationships,
            variables,
            semantic,
            structure,
            usage,
            ai_context,
            diagnostics,
        })
    }

    fn relationships(
        &self,
        tracker: &ReferenceTracker,
        id: SymbolId,
    ) -> Result<RelationshipsSection, String> {
        if tracker.is_bulk_indexing() {
            return Err("bulk indexing in progress".to_string());
        }
        Ok(RelationshipsSection {
            callers: tracker.get_caller_names(id),
            callees: tracker.get_callee_names(id),
            hierarchy: tracker.get_type_relationships(id),
        })
    }

    fn variables(
        &self,
        tracker: &ReferenceTracker,
        id: SymbolId,
    ) -> Result<VariablesSection, String> {
        let symbol = tracker
            .get_enhanced_symbol(id)
            .ok_or_else(|| "symbol vanished".to_string())?;
        let variables = tracker
            .get_file_enhanced_symbols(symbol.file_id)
            .into_iter()
            .filter(|s| {
                matches!(s.kind, SymbolKind::Variable | SymbolKind::Constant)
                    && symbol.range.contains_line(s.range.start_line)
            })
            .map(|s| s.name.to_string())
            .collect();
        Ok(VariablesSection { variables })
    }

    fn semantic(
        &self,
        tracker: &ReferenceTracker,
        symbol_index: &SymbolIndex,
        id: SymbolId,
    ) -> Result<SemanticSection, String> {
        let mut section = SemanticSection::default();

        if let Some(propagator) = self.propagator {
            section.propagation_labels = propagator.propagated_labels(id);
            section.service_dependencies = propagator.propagated_dependencies(id);

            let critical = if self.config.critical_labels.is_empty() {
                ContextConfig::standard().critical_labels
            } else {
                self.config.critical_labels.clone()
            };
            section.criticality = section
                .propagation_labels
                .iter()
                .filter(|l| critical.contains(&l.label))
                .map(|l| l.strength)
                .fold(0.0, f64::max);
        }

        let entry_points: HashSet<SymbolId> = symbol_index.entry_points().into_iter().collect();
        section.entry_point_chains =
            self.entry_chains(tracker, id, &entry_points, ENTRY_CHAIN_MAX_DEPTH);
        Ok(section)
    }

    /// Caller chains from `id` up to any entry point, depth-limited. The
    /// visited set is shared across branches to keep the walk linear.
    fn entry_chains(
        &self,
        tracker: &ReferenceTracker,
        id: SymbolId,
        entry_points: &HashSet<SymbolId>,
        max_depth: usize,
    ) -> Vec<Vec<String>> {
        let name_of = |id: SymbolId| {
            tracker
                .get_enhanced_symbol(id)
                .map(|s| s.name.to_string())
                .unwrap_or_else(|| id.value().to_string())
        };

        let mut chains = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(id, vec![id])];
        visited.insert(id);

        while let Some((current, path)) = stack.pop() {
            if entry_points.contains(&current) && path.len() > 1 {
                chains.push(path.iter().rev().map(|p| name_of(*p)).collect());
                continue;
            }
            if path.len() > max_depth {
                continue;
            }
            for caller in tracker.get_caller_ids(current) {
                if visited.insert(caller) {
                    let mut next = path.clone();
                    next.push(caller);
                    stack.push((caller, next));
                }
            }
        }
        chains
    }

    fn structure(
        &self,
        tracker: &ReferenceTracker,
        id: SymbolId,
        file_path: Option<&str>,
    ) -> Result<StructureSection, String> {
        let symbol = tracker
            .get_enhanced_symbol(id)
            .ok_or_else(|| "symbol vanished".to_string())?;
        let file_path = file_path.ok_or_else(|| "file path unknown".to_string())?;

        let inner = tracker.inner.read();
        let imports = inner
            .imports
            .file_imports(symbol.file_id)
            .map(|data| {
                data.imports
                    .iter()
                    .map(|i| i.module.to_string())
                    .collect()
            })
            .unwrap_or_default();
        drop(inner);

        let exports = tracker
            .get_file_enhanced_symbols(symbol.file_id)
            .into_iter()
            .filter(|s| s.is_exported && s.kind.is_definition())
            .map(|s| s.name.to_string())
            .collect();

        let module_path = file_path
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| file_path.to_string());

        Ok(StructureSection {
            file_path: file_path.to_string(),
            module_path,
            imports,
            exports,
            inheritance: tracker.get_type_relationships(id),
        })
    }

    fn usage(&self, tracker: &ReferenceTracker, id: SymbolId) -> Result<UsageSection, String> {
        let symbol = tracker
            .get_enhanced_symbol(id)
            .ok_or_else(|| "symbol vanished".to_string())?;
        let fan_in = symbol.ref_stats.incoming_count;
        let fan_out = symbol.ref_stats.outgoing_count;

        let change_impact = (f64::from(fan_in) / 10.0 * 0.7
            + f64::from(symbol.complexity) / 20.0 * 0.3)
            .min(1.0);

        let inner = tracker.inner.read();
        let mut test_files: Vec<String> = symbol
            .incoming_refs
            .iter()
            .filter_map(|r| inner.file_paths.get(&r.file_id()))
            .map(|p| p.to_string())
            .filter(|p| {
                let lower = p.to_lowercase();
                lower.contains("test") || lower.contains("spec")
            })
            .collect();
        test_files.sort_unstable();
        test_files.dedup();

        Ok(UsageSection {
            fan_in,
            fan_out,
            complexity: symbol.complexity,
            change_impact,
            discovered_test_files: test_files,
        })
    }

    fn ai_context(&self, basic: &BasicInfo) -> AiContextSection {
        let mut hints = Vec::new();
        if let Some(effects) = self.effects {
            let _ = effects;
            hints.push("purity data available via the side-effect propagator".to_string());
        }
        AiContextSection {
            summary: format!("{:?} {}", basic.kind, basic.name),
            hints,
        }
    }
}
