//! Transitive side-effect and purity propagation.
//!
//! Local side-effect records arrive from an external analyzer keyed by
//! symbol id. Each iteration pushes every symbol's effects (local and
//! transitive) into its callers, with confidence decaying per hop until it
//! reaches the configured floor. Category bits only ever grow, so the loop
//! terminates as soon as an iteration changes nothing; `max_iterations` is a
//! backstop, not an error condition.

use crate::tracker::ReferenceTracker;
use crate::types::SymbolId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
pub const DEFAULT_DECAY_FACTOR: f64 = 0.95;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EffectCategories: u16 {
        const IO = 1;
        const NETWORK = 1 << 1;
        const DATABASE = 1 << 2;
        const CHANNEL = 1 << 3;
        const THROWS = 1 << 4;
        const GLOBAL_WRITE = 1 << 5;
        const PARAM_WRITE = 1 << 6;
        const RECEIVER_WRITE = 1 << 7;
        const OBJECT_STATE = 1 << 8;
        const UNCERTAIN = 1 << 9;
    }
}

impl EffectCategories {
    /// Categories touching the world outside the process's own objects.
    pub fn external(self) -> bool {
        self.intersects(Self::IO | Self::NETWORK | Self::DATABASE | Self::CHANNEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurityLevel {
    Pure,
    InternallyPure,
    ObjectState,
    ModuleGlobal,
    ExternalDependency,
}

impl PurityLevel {
    pub fn score(&self) -> f64 {
        match self {
            Self::Pure => 1.0,
            Self::InternallyPure => 0.8,
            Self::ObjectState => 0.6,
            Self::ModuleGlobal => 0.3,
            Self::ExternalDependency => 0.0,
        }
    }

    /// Classify a combined category set, worst effect first.
    pub fn from_categories(categories: EffectCategories) -> Self {
        if categories.external() {
            Self::ExternalDependency
        } else if categories.contains(EffectCategories::GLOBAL_WRITE) {
            Self::ModuleGlobal
        } else if categories
            .intersects(EffectCategories::OBJECT_STATE | EffectCategories::RECEIVER_WRITE)
        {
            Self::ObjectState
        } else if categories
            .intersects(EffectCategories::PARAM_WRITE | EffectCategories::THROWS)
        {
            Self::InternallyPure
        } else {
            Self::Pure
        }
    }
}

/// Per-symbol side-effect record, local analysis plus propagated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectInfo {
    pub local_categories: EffectCategories,
    pub transitive_categories: EffectCategories,
    pub confidence: f64,
    pub transitive_confidence: f64,
    pub purity_level: PurityLevel,
    pub purity_score: f64,
    pub unresolved_calls: Vec<String>,
    /// Callee name -> true when its effects were folded in.
    pub dependent_functions: HashMap<String, bool>,
    pub reasons: Vec<String>,
}

impl Default for SideEffectInfo {
    fn default() -> Self {
        Self {
            local_categories: EffectCategories::empty(),
            transitive_categories: EffectCategories::empty(),
            confidence: 1.0,
            transitive_confidence: 1.0,
            purity_level: PurityLevel::Pure,
            purity_score: 1.0,
            unresolved_calls: Vec::new(),
            dependent_functions: HashMap::new(),
            reasons: Vec::new(),
        }
    }
}

impl SideEffectInfo {
    pub fn combined(&self) -> EffectCategories {
        self.local_categories | self.transitive_categories
    }

    pub fn is_pure(&self) -> bool {
        self.purity_level == PurityLevel::Pure
    }

    fn recompute_purity(&mut self) {
        self.purity_level = PurityLevel::from_categories(self.combined());
        self.purity_score = self.purity_level.score();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectConfig {
    pub max_iterations: u32,
    pub decay_factor: f64,
    pub min_confidence: f64,
    pub propagate_io: bool,
    pub propagate_network: bool,
    pub propagate_database: bool,
    pub propagate_channel: bool,
    pub propagate_throws: bool,
    pub propagate_global_writes: bool,
}

impl Default for SideEffectConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            decay_factor: DEFAULT_DECAY_FACTOR,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            propagate_io: true,
            propagate_network: true,
            propagate_database: true,
            propagate_channel: true,
            propagate_throws: true,
            propagate_global_writes: true,
        }
    }
}

impl SideEffectConfig {
    /// Which categories flow into callers. Parameter/receiver writes and
    /// uncertainty markers always propagate; object-state mutation stays
    /// local to the symbol that performs it.
    fn propagated_mask(&self) -> EffectCategories {
        let mut mask = EffectCategories::PARAM_WRITE
            | EffectCategories::RECEIVER_WRITE
            | EffectCategories::UNCERTAIN;
        if self.propagate_io {
            mask |= EffectCategories::IO;
        }
        if self.propagate_network {
            mask |= EffectCategories::NETWORK;
        }
        if self.propagate_database {
            mask |= EffectCategories::DATABASE;
        }
        if self.propagate_channel {
            mask |= EffectCategories::CHANNEL;
        }
        if self.propagate_throws {
            mask |= EffectCategories::THROWS;
        }
        if self.propagate_global_writes {
            mask |= EffectCategories::GLOBAL_WRITE;
        }
        mask
    }
}

/// Project-wide purity summary after propagation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurityReport {
    pub total_analyzed: u32,
    pub pure_count: u32,
    pub impure_count: u32,
    pub by_level: HashMap<PurityLevel, u32>,
    pub iterations_run: u32,
    pub converged: bool,
}

pub struct SideEffectPropagator<'a> {
    tracker: &'a ReferenceTracker,
    config: SideEffectConfig,
    records: HashMap<SymbolId, SideEffectInfo>,
}

impl<'a> SideEffectPropagator<'a> {
    pub fn new(tracker: &'a ReferenceTracker, config: SideEffectConfig) -> Self {
        Self {
            tracker,
            config,
            records: HashMap::new(),
        }
    }

    pub fn with_defaults(tracker: &'a ReferenceTracker) -> Self {
        Self::new(tracker, SideEffectConfig::default())
    }

    /// Install the locally-analyzed record for a symbol.
    pub fn set_local_effects(
        &mut self,
        symbol: SymbolId,
        categories: EffectCategories,
        confidence: f64,
        reasons: Vec<String>,
    ) {
        let info = self.records.entry(symbol).or_default();
        info.local_categories = categories;
        info.confidence = confidence;
        info.reasons = reasons;
        info.recompute_purity();
    }

    pub fn add_unresolved_call(&mut self, symbol: SymbolId, callee: &str) {
        let info = self.records.entry(symbol).or_default();
        info.unresolved_calls.push(callee.to_string());
        info.local_categories |= EffectCategories::UNCERTAIN;
        info.recompute_purity();
    }

    pub fn info(&self, symbol: SymbolId) -> Option<&SideEffectInfo> {
        self.records.get(&symbol)
    }

    /// Push effects upstream until nothing changes. Returns the report.
    pub fn propagate(&mut self) -> PurityReport {
        let mask = self.config.propagated_mask();
        let mut iterations_run = 0;
        let mut converged = false;

        for _ in 0..self.config.max_iterations {
            iterations_run += 1;
            let mut changed = false;

            let snapshot: Vec<(SymbolId, EffectCategories, f64, String)> = self
                .records
                .iter()
                .map(|(id, info)| {
                    let name = self
                        .tracker
                        .get_enhanced_symbol(*id)
                        .map(|s| s.name.to_string())
                        .unwrap_or_default();
                    let confidence = info.confidence.min(info.transitive_confidence);
                    (*id, info.combined() & mask, confidence, name)
                })
                .collect();

            for (id, effects, confidence, name) in snapshot {
                if effects.is_empty() {
                    continue;
                }
                let pushed_confidence = confidence * self.config.decay_factor;
                if pushed_confidence < self.config.min_confidence {
                    continue;
                }

                for caller in self.tracker.get_caller_ids(id) {
                    let caller_info = self.records.entry(caller).or_default();
                    let merged = caller_info.transitive_categories | effects;
                    if merged != caller_info.transitive_categories {
                        caller_info.transitive_categories = merged;
                        caller_info.transitive_confidence = pushed_confidence
                            .min(caller_info.transitive_confidence);
                        if !name.is_empty() {
                            caller_info.dependent_functions.insert(name.clone(), true);
                        }
                        changed = true;
                    }
                }
            }

            if !changed {
                converged = true;
                break;
            }
        }

        for info in self.records.values_mut() {
            info.recompute_purity();
        }

        let mut report = PurityReport {
            total_analyzed: self.records.len() as u32,
            iterations_run,
            converged,
            ..PurityReport::default()
        };
        for info in self.records.values() {
            if info.is_pure() {
                report.pure_count += 1;
            } else {
                report.impure_count += 1;
            }
            *report.by_level.entry(info.purity_level).or_insert(0) += 1;
        }

        tracing::debug!(
            target: "effects",
            "purity propagation: {} symbols, {} pure, {} iterations",
            report.total_analyzed,
            report.pure_count,
            report.iterations_run
        );
        report
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{RefKind, ReferenceRecord};
    use crate::symbol::Symbol;
    use crate::types::{Range, SymbolKind};

    /// handler -> service -> query, plus a pure leaf `format`.
    fn call_chain() -> (ReferenceTracker, HashMap<&'static str, SymbolId>) {
        let tracker = ReferenceTracker::new();
        let file = tracker.file_id_for_path("app.go");
        tracker.process_file(
            file,
            "app.go",
            vec![
                Symbol::new("handler", SymbolKind::Function, Range::new(1, 0, 9, 1)),
                Symbol::new("service", SymbolKind::Function, Range::new(11, 0, 19, 1)),
                Symbol::new("query", SymbolKind::Function, Range::new(21, 0, 29, 1)),
                Symbol::new("format", SymbolKind::Function, Range::new(31, 0, 39, 1)),
            ],
            vec![
                ReferenceRecord::new(2, 4, RefKind::Call, "service"),
                ReferenceRecord::new(12, 4, RefKind::Call, "query"),
                ReferenceRecord::new(13, 4, RefKind::Call, "format"),
            ],
            Vec::new(),
        );
        tracker.process_all_references();

        let mut ids = HashMap::new();
        for name in ["handler", "service", "query", "format"] {
            ids.insert(name, tracker.find_symbols_by_name(name).remove(0).id);
        }
        (tracker, ids)
    }

    #[test]
    fn test_purity_levels_from_categories() {
        assert_eq!(
            PurityLevel::from_categories(EffectCategories::empty()),
            PurityLevel::Pure
        );
        assert_eq!(
            PurityLevel::from_categories(EffectCategories::PARAM_WRITE),
            PurityLevel::InternallyPure
        );
        assert_eq!(
            PurityLevel::from_categories(EffectCategories::RECEIVER_WRITE),
            PurityLevel::ObjectState
        );
        assert_eq!(
            PurityLevel::from_categories(EffectCategories::GLOBAL_WRITE),
            PurityLevel::ModuleGlobal
        );
        assert_eq!(
            PurityLevel::from_categories(EffectCategories::DATABASE),
            PurityLevel::ExternalDependency
        );
        // External wins over everything else.
        assert_eq!(
            PurityLevel::from_categories(
                EffectCategories::IO | EffectCategories::RECEIVER_WRITE
            ),
            PurityLevel::ExternalDependency
        );
    }

    #[test]
    fn test_effects_flow_to_transitive_callers() {
        let (tracker, ids) = call_chain();
        let mut propagator = SideEffectPropagator::with_defaults(&tracker);
        propagator.set_local_effects(
            ids["query"],
            EffectCategories::DATABASE,
            1.0,
            vec!["executes SQL".to_string()],
        );

        let report = propagator.propagate();
        assert!(report.converged);

        let service = propagator.info(ids["service"]).unwrap();
        assert!(service.transitive_categories.contains(EffectCategories::DATABASE));
        assert_eq!(service.purity_level, PurityLevel::ExternalDependency);
        assert_eq!(service.purity_score, 0.0);
        assert_eq!(service.dependent_functions.get("query"), Some(&true));

        let handler = propagator.info(ids["handler"]).unwrap();
        assert!(handler.transitive_categories.contains(EffectCategories::DATABASE));

        // Confidence decayed one extra hop for handler.
        assert!(handler.transitive_confidence < service.transitive_confidence);
    }

    #[test]
    fn test_pure_symbol_stays_pure() {
        let (tracker, ids) = call_chain();
        let mut propagator = SideEffectPropagator::with_defaults(&tracker);
        propagator.set_local_effects(ids["format"], EffectCategories::empty(), 1.0, Vec::new());
        propagator.set_local_effects(ids["query"], EffectCategories::DATABASE, 1.0, Vec::new());
        propagator.propagate();

        let format = propagator.info(ids["format"]).unwrap();
        assert!(format.combined().is_empty());
        assert!(format.is_pure());
        assert_eq!(format.purity_score, 1.0);
    }

    #[test]
    fn test_category_mask_blocks_disabled_categories() {
        let (tracker, ids) = call_chain();
        let config = SideEffectConfig {
            propagate_throws: false,
            ..SideEffectConfig::default()
        };
        let mut propagator = SideEffectPropagator::new(&tracker, config);
        propagator.set_local_effects(
            ids["query"],
            EffectCategories::THROWS | EffectCategories::RECEIVER_WRITE,
            1.0,
            Vec::new(),
        );
        propagator.propagate();

        let service = propagator.info(ids["service"]).unwrap();
        // Receiver writes always propagate; throws was masked off.
        assert!(service.transitive_categories.contains(EffectCategories::RECEIVER_WRITE));
        assert!(!service.transitive_categories.contains(EffectCategories::THROWS));
    }

    #[test]
    fn test_object_state_stays_local() {
        let (tracker, ids) = call_chain();
        let mut propagator = SideEffectPropagator::with_defaults(&tracker);
        propagator.set_local_effects(
            ids["query"],
            EffectCategories::OBJECT_STATE,
            1.0,
            Vec::new(),
        );
        propagator.propagate();

        let query = propagator.info(ids["query"]).unwrap();
        assert_eq!(query.purity_level, PurityLevel::ObjectState);

        // Object-state mutation never travels to callers.
        assert!(
            propagator
                .info(ids["service"])
                .is_none_or(|i| i.transitive_categories.is_empty())
        );
        assert!(
            propagator
                .info(ids["handler"])
                .is_none_or(|i| i.transitive_categories.is_empty())
        );
    }

    #[test]
    fn test_confidence_floor_stops_propagation() {
        let (tracker, ids) = call_chain();
        let config = SideEffectConfig {
            decay_factor: 0.5,
            min_confidence: 0.4,
            ..SideEffectConfig::default()
        };
        let mut propagator = SideEffectPropagator::new(&tracker, config);
        propagator.set_local_effects(ids["query"], EffectCategories::IO, 1.0, Vec::new());
        propagator.propagate();

        // query -> service arrives at 0.5; service -> handler would arrive
        // at 0.25 which is under the floor.
        assert!(propagator.info(ids["service"]).is_some());
        assert!(
            propagator
                .info(ids["handler"])
                .is_none_or(|i| i.transitive_categories.is_empty())
        );
    }

    #[test]
    fn test_unresolved_calls_mark_uncertainty() {
        let (tracker, ids) = call_chain();
        let mut propagator = SideEffectPropagator::with_defaults(&tracker);
        propagator.add_unresolved_call(ids["service"], "mystery");
        propagator.propagate();

        let service = propagator.info(ids["service"]).unwrap();
        assert_eq!(service.unresolved_calls, vec!["mystery".to_string()]);
        assert!(service.local_categories.contains(EffectCategories::UNCERTAIN));
        // Uncertainty alone does not make a function impure.
        assert!(service.is_pure());

        let handler = propagator.info(ids["handler"]).unwrap();
        assert!(handler.transitive_categories.contains(EffectCategories::UNCERTAIN));
    }

    #[test]
    fn test_report_counts() {
        let (tracker, ids) = call_chain();
        let mut propagator = SideEffectPropagator::with_defaults(&tracker);
        propagator.set_local_effects(ids["query"], EffectCategories::DATABASE, 1.0, Vec::new());
        propagator.set_local_effects(ids["format"], EffectCategories::empty(), 1.0, Vec::new());

        let report = propagator.propagate();
        assert_eq!(report.total_analyzed, 4);
        assert_eq!(report.pure_count, 1);
        assert_eq!(report.impure_count, 3);
        assert_eq!(
            report.by_level.get(&PurityLevel::ExternalDependency),
            Some(&3)
        );
        assert!(report.iterations_run >= 2);
    }

    #[test]
    fn test_propagation_converges_on_cycles() {
        let tracker = ReferenceTracker::new();
        let file = tracker.file_id_for_path("cycle.go");
        tracker.process_file(
            file,
            "cycle.go",
            vec![
                Symbol::new("ping", SymbolKind::Function, Range::new(1, 0, 5, 1)),
                Symbol::new("pong", SymbolKind::Function, Range::new(11, 0, 15, 1)),
            ],
            vec![
                ReferenceRecord::new(2, 4, RefKind::Call, "pong"),
                ReferenceRecord::new(12, 4, RefKind::Call, "ping"),
            ],
            Vec::new(),
        );
        tracker.process_all_references();
        let ping = tracker.find_symbols_by_name("ping").remove(0).id;

        let mut propagator = SideEffectPropagator::with_defaults(&tracker);
        propagator.set_local_effects(ping, EffectCategories::NETWORK, 1.0, Vec::new());
        let report = propagator.propagate();

        assert!(report.converged);
        assert!(report.iterations_run < DEFAULT_MAX_ITERATIONS);
    }
}
