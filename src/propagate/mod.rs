//! Iterative attribute propagation over the reference tracker's graph.
//!
//! Nodes are symbols; edges are calls plus, when a rule opts in, the type
//! hierarchy (implements/extends). Label rules propagate under one of four
//! modes (reachability, accumulation, decay, max); dependency rules aggregate
//! with a weight function; custom rules run a small trigger/action language
//! over the state after each iteration.
//!
//! The loop is deterministic given identical seed state and rule order: rule
//! tables and state use insertion-ordered maps, and neighbor lists come back
//! from the tracker in adjacency order. Hitting `max_iterations` without
//! convergence is not an error; callers inspect `iterations_run` and
//! `converged` on the summary.

pub mod dsl;
pub mod rules;

pub use rules::{
    AggregationOp, CustomRule, DependencyRule, LabelRule, PropagationConfig,
    PropagationDirection, PropagationMode, WeightFunction,
};

use crate::error::PropagationError;
use crate::reference::RefQuality;
use crate::tracker::ReferenceTracker;
use crate::types::SymbolId;
use dsl::{Action, EvalContext, Trigger};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Tag keys whose numeric value seeds the initial strength.
const NUMERIC_TAG_KEYS: [&str; 4] = ["priority", "level", "weight", "value"];

const DECAY_MULTIPLIER_KEY: &str = "decay_multiplier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    Label,
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropKey {
    pub symbol: SymbolId,
    pub attr: String,
    pub kind: AttrKind,
}

/// One propagated attribute on one symbol. `path` begins at `source` and
/// ends at the holder; its length is always `hops + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationValue {
    pub strength: f64,
    pub source: SymbolId,
    pub hops: u32,
    pub path: Vec<SymbolId>,
    pub metadata: HashMap<String, String>,
    pub last_updated_iteration: u32,
}

impl PropagationValue {
    fn seed(symbol: SymbolId, strength: f64) -> Self {
        Self {
            strength,
            source: symbol,
            hops: 0,
            path: vec![symbol],
            metadata: HashMap::new(),
            last_updated_iteration: 0,
        }
    }

    fn step(&self, to: SymbolId, strength: f64, iteration: u32) -> Self {
        let mut path = self.path.clone();
        path.push(to);
        Self {
            strength,
            source: self.source,
            hops: self.hops + 1,
            path,
            metadata: self.metadata.clone(),
            last_updated_iteration: iteration,
        }
    }

    fn decay_multiplier(&self) -> f64 {
        self.metadata
            .get(DECAY_MULTIPLIER_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0)
    }
}

/// A direct annotation on a symbol: a category (label or dependency name)
/// plus free-form tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub category: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Annotation {
    pub fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Initial strength: the first parseable numeric tag among
    /// priority/level/weight/value, else 1.0.
    pub fn initial_strength(&self) -> f64 {
        for key in NUMERIC_TAG_KEYS {
            if let Some(value) = self.tags.get(key) {
                if let Ok(parsed) = value.parse::<f64>() {
                    return parsed;
                }
            }
        }
        1.0
    }
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    by_symbol: IndexMap<SymbolId, Vec<Annotation>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotate(&mut self, symbol: SymbolId, annotation: Annotation) {
        self.by_symbol.entry(symbol).or_default().push(annotation);
    }

    pub fn annotations(&self, symbol: SymbolId) -> &[Annotation] {
        self.by_symbol
            .get(&symbol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_category(&self, symbol: SymbolId, category: &str) -> bool {
        self.annotations(symbol)
            .iter()
            .any(|a| a.category == category)
    }

    pub fn has_tag(&self, symbol: SymbolId, needle: &str) -> bool {
        self.annotations(symbol)
            .iter()
            .any(|a| a.tags.iter().any(|(k, v)| k == needle || v == needle))
    }

    fn seed_strength(&self, symbol: SymbolId, category: &str) -> Option<f64> {
        self.annotations(symbol)
            .iter()
            .find(|a| a.category == category)
            .map(Annotation::initial_strength)
    }

    fn seeds(&self, category: &str) -> Vec<(SymbolId, f64)> {
        self.by_symbol
            .iter()
            .filter_map(|(symbol, annotations)| {
                annotations
                    .iter()
                    .find(|a| a.category == category)
                    .map(|a| (*symbol, a.initial_strength()))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.by_symbol.clear();
    }
}

/// Outbound shape: one propagated label on one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedLabel {
    pub label: String,
    pub strength: f64,
    pub source: SymbolId,
    pub path: Vec<SymbolId>,
    pub hops: u32,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedDependency {
    pub dependency: String,
    pub strength: f64,
    pub source: SymbolId,
    pub path: Vec<SymbolId>,
    pub hops: u32,
    pub confidence: f64,
}

/// Strongest propagation path that delivered `label` to `symbol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub symbol: SymbolId,
    pub label: String,
    pub strength: f64,
    pub path: Vec<SymbolId>,
    pub hops: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    CodeAnalysis,
    Heuristic,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationAttribution {
    pub impl_id: SymbolId,
    pub confidence: f64,
    pub quality: RefQuality,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceAttribution {
    pub method: AttributionMethod,
    pub implementations: Vec<ImplementationAttribution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationSummary {
    pub iterations_run: u32,
    pub converged: bool,
}

/// A graph neighbor, remembering whether the edge came from the type
/// hierarchy and with what evidence quality (implements edges only).
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    id: SymbolId,
    hierarchy_quality: Option<RefQuality>,
}

pub struct GraphPropagator<'a> {
    tracker: &'a ReferenceTracker,
    config: PropagationConfig,
    annotations: AnnotationStore,
    state: IndexMap<PropKey, PropagationValue>,
    compiled_rules: Vec<(Trigger, Vec<Action>)>,
    iterations_run: u32,
    converged: bool,
    /// Scale strength across heuristic interface attributions.
    attribution_scaling: bool,
}

impl<'a> GraphPropagator<'a> {
    pub fn new(tracker: &'a ReferenceTracker, config: PropagationConfig) -> Self {
        Self {
            tracker,
            config,
            annotations: AnnotationStore::new(),
            state: IndexMap::new(),
            compiled_rules: Vec::new(),
            iterations_run: 0,
            converged: false,
            attribution_scaling: false,
        }
    }

    pub fn with_defaults(tracker: &'a ReferenceTracker) -> Self {
        Self::new(tracker, PropagationConfig::default())
    }

    pub fn annotate(&mut self, symbol: SymbolId, annotation: Annotation) {
        self.annotations.annotate(symbol, annotation);
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn iterations_run(&self) -> u32 {
        self.iterations_run
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Raw state access for invariant checks and dashboards.
    pub fn value(&self, symbol: SymbolId, attr: &str, kind: AttrKind) -> Option<&PropagationValue> {
        self.state.get(&PropKey {
            symbol,
            attr: attr.to_string(),
            kind,
        })
    }

    /// Run every rule to convergence (or `max_iterations`). Idempotent for a
    /// fixed graph: a second run from the same annotations produces the same
    /// state.
    pub fn propagate_all(&mut self) -> Result<PropagationSummary, PropagationError> {
        self.attribution_scaling = false;
        self.run()
    }

    /// Like [`propagate_all`], but strength crossing an implements edge whose
    /// only evidence is heuristic is scaled by the attribution confidence;
    /// code-analysis edges keep full strength.
    ///
    /// [`propagate_all`]: Self::propagate_all
    pub fn propagate_with_interface_attribution(
        &mut self,
    ) -> Result<PropagationSummary, PropagationError> {
        self.attribution_scaling = true;
        self.run()
    }

    fn run(&mut self) -> Result<PropagationSummary, PropagationError> {
        self.config.validate()?;
        self.compile_custom_rules()?;
        self.seed_state();
        self.converged = false;
        self.iterations_run = 0;

        for iteration in 1..=self.config.max_iterations {
            let snapshot = self.state.clone();
            let mut next = snapshot.clone();

            for rule in &self.config.label_rules {
                self.apply_label_rule(rule, &snapshot, &mut next, iteration);
            }
            for rule in &self.config.dependency_rules {
                self.apply_dependency_rule(rule, &snapshot, &mut next, iteration);
            }
            self.apply_custom_rules(&mut next, iteration);

            let (delta_sum, changed) = Self::diff(&snapshot, &next);
            self.state = next;
            self.iterations_run = iteration;

            if changed == 0 || delta_sum / (changed as f64) < self.config.convergence_threshold {
                self.converged = true;
                break;
            }
        }

        tracing::debug!(
            target: "propagate",
            "propagation finished: {} iterations, converged={}, {} state entries",
            self.iterations_run,
            self.converged,
            self.state.len()
        );
        Ok(PropagationSummary {
            iterations_run: self.iterations_run,
            converged: self.converged,
        })
    }

    /// Reset derived state, keeping annotations and configuration.
    pub fn reset(&mut self) {
        self.state.clear();
        self.iterations_run = 0;
        self.converged = false;
    }

    fn compile_custom_rules(&mut self) -> Result<(), PropagationError> {
        self.compiled_rules.clear();
        for rule in &self.config.custom_rules {
            let trigger =
                dsl::parse_trigger(&rule.trigger).map_err(|reason| PropagationError::DslParse {
                    rule: rule.name.clone(),
                    reason,
                })?;
            let actions =
                dsl::parse_actions(&rule.action).map_err(|reason| PropagationError::DslParse {
                    rule: rule.name.clone(),
                    reason,
                })?;
            self.compiled_rules.push((trigger, actions));
        }
        Ok(())
    }

    fn seed_state(&mut self) {
        self.state.clear();
        for rule in &self.config.label_rules {
            for (symbol, strength) in self.annotations.seeds(&rule.label) {
                self.state.insert(
                    PropKey {
                        symbol,
                        attr: rule.label.clone(),
                        kind: AttrKind::Label,
                    },
                    PropagationValue::seed(symbol, strength),
                );
            }
        }
        for rule in &self.config.dependency_rules {
            for (symbol, strength) in self.annotations.seeds(&rule.dependency) {
                self.state.insert(
                    PropKey {
                        symbol,
                        attr: rule.dependency.clone(),
                        kind: AttrKind::Dependency,
                    },
                    PropagationValue::seed(symbol, strength),
                );
            }
        }
    }

    fn connected(
        &self,
        symbol: SymbolId,
        direction: PropagationDirection,
        include_type_hierarchy: bool,
    ) -> Vec<Neighbor> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |id: SymbolId, quality: Option<RefQuality>, out: &mut Vec<Neighbor>| {
            if seen.insert(id) {
                out.push(Neighbor {
                    id,
                    hierarchy_quality: quality,
                });
            }
        };

        let downstream = matches!(
            direction,
            PropagationDirection::Downstream | PropagationDirection::Bidirectional
        );
        let upstream = matches!(
            direction,
            PropagationDirection::Upstream | PropagationDirection::Bidirectional
        );

        if downstream {
            for id in self.tracker.get_callee_ids(symbol) {
                push(id, None, &mut out);
            }
            if include_type_hierarchy {
                for ranked in self.tracker.get_implementors_with_quality(symbol) {
                    push(ranked.id, Some(ranked.quality), &mut out);
                }
                for id in self.tracker.get_derived_types(symbol) {
                    push(id, None, &mut out);
                }
            }
        }
        if upstream {
            for id in self.tracker.get_caller_ids(symbol) {
                push(id, None, &mut out);
            }
            if include_type_hierarchy {
                for ranked in self.tracker.get_implemented_interfaces_with_quality(symbol) {
                    push(ranked.id, Some(ranked.quality), &mut out);
                }
                for id in self.tracker.get_base_types(symbol) {
                    push(id, None, &mut out);
                }
            }
        }
        out
    }

    fn attribution_scale(&self, neighbor: &Neighbor) -> f64 {
        if !self.attribution_scaling {
            return 1.0;
        }
        match neighbor.hierarchy_quality {
            Some(RefQuality::Heuristic) => RefQuality::Heuristic.confidence(),
            _ => 1.0,
        }
    }

    fn matches_any_condition(&self, symbol: SymbolId, conditions: &[String], attr: &str) -> bool {
        if conditions.is_empty() {
            return false;
        }
        let name = self
            .tracker
            .get_enhanced_symbol(symbol)
            .map(|s| (s.name.to_lowercase(), s.is_exported));
        for condition in conditions {
            if condition == "public" {
                if name.as_ref().is_some_and(|(_, exported)| *exported) {
                    return true;
                }
                continue;
            }
            if condition == attr {
                return true;
            }
            if self.annotations.has_category(symbol, condition)
                || self.annotations.has_tag(symbol, condition)
            {
                return true;
            }
            if let Some((name, _)) = &name {
                if name.contains(&condition.to_lowercase()) {
                    return true;
                }
            }
        }
        false
    }

    fn apply_label_rule(
        &self,
        rule: &LabelRule,
        snapshot: &IndexMap<PropKey, PropagationValue>,
        next: &mut IndexMap<PropKey, PropagationValue>,
        iteration: u32,
    ) {
        if rule.mode == PropagationMode::Accumulation {
            self.apply_accumulation(rule, snapshot, next, iteration);
            return;
        }

        for (key, value) in snapshot {
            if key.kind != AttrKind::Label || key.attr != rule.label {
                continue;
            }
            if rule.max_hops > 0 && value.hops >= rule.max_hops {
                continue;
            }

            for neighbor in
                self.connected(key.symbol, rule.direction, rule.include_type_hierarchy)
            {
                if neighbor.id == key.symbol || value.path.contains(&neighbor.id) {
                    continue;
                }
                let scale = self.attribution_scale(&neighbor);

                let mut strength = match rule.mode {
                    PropagationMode::Reachability => 1.0,
                    PropagationMode::Decay => {
                        value.strength * rule.decay * value.decay_multiplier()
                    }
                    PropagationMode::Max => value.strength,
                    PropagationMode::Accumulation => unreachable!("handled above"),
                };
                strength *= scale;

                // Reachability ignores boost.
                if rule.mode != PropagationMode::Reachability
                    && rule.boost > 0.0
                    && self.matches_any_condition(neighbor.id, &rule.conditions, &rule.label)
                {
                    strength *= rule.boost;
                }

                if rule.mode == PropagationMode::Decay && strength < rule.min_strength {
                    continue;
                }

                let target_key = PropKey {
                    symbol: neighbor.id,
                    attr: rule.label.clone(),
                    kind: AttrKind::Label,
                };
                // Targets keep the strongest path; equal-strength arrivals
                // keep the first (shortest by construction).
                match next.get(&target_key) {
                    None => {
                        next.insert(target_key, value.step(neighbor.id, strength, iteration));
                    }
                    Some(existing) if strength > existing.strength => {
                        next.insert(target_key, value.step(neighbor.id, strength, iteration));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    /// Accumulation recomputes each target once per iteration from the full
    /// reverse-direction neighborhood, so repeated iterations never
    /// double-count a contributor.
    fn apply_accumulation(
        &self,
        rule: &LabelRule,
        snapshot: &IndexMap<PropKey, PropagationValue>,
        next: &mut IndexMap<PropKey, PropagationValue>,
        iteration: u32,
    ) {
        let mut targets: Vec<SymbolId> = Vec::new();
        let mut seen = HashSet::new();
        for (key, value) in snapshot {
            if key.kind != AttrKind::Label || key.attr != rule.label {
                continue;
            }
            if rule.max_hops > 0 && value.hops >= rule.max_hops {
                continue;
            }
            for neighbor in
                self.connected(key.symbol, rule.direction, rule.include_type_hierarchy)
            {
                if seen.insert(neighbor.id) {
                    targets.push(neighbor.id);
                }
            }
        }

        for target in targets {
            let mut sum = self
                .annotations
                .seed_strength(target, &rule.label)
                .unwrap_or(0.0);
            let mut strongest: Option<&PropagationValue> = None;

            for contributor in self.connected(
                target,
                rule.direction.reverse(),
                rule.include_type_hierarchy,
            ) {
                let key = PropKey {
                    symbol: contributor.id,
                    attr: rule.label.clone(),
                    kind: AttrKind::Label,
                };
                let Some(value) = snapshot.get(&key) else {
                    continue;
                };
                if rule.max_hops > 0 && value.hops + 1 > rule.max_hops {
                    continue;
                }
                if value.path.contains(&target) {
                    continue;
                }
                sum += value.strength * self.attribution_scale(&contributor);
                if strongest.is_none_or(|best| value.strength > best.strength) {
                    strongest = Some(value);
                }
            }

            if sum <= 0.0 {
                continue;
            }
            if rule.boost > 0.0
                && self.matches_any_condition(target, &rule.conditions, &rule.label)
            {
                sum *= rule.boost;
            }

            let new_value = match strongest {
                Some(best) => {
                    let mut value = best.step(target, sum, iteration);
                    value.strength = sum;
                    value
                }
                None => {
                    let mut value = PropagationValue::seed(target, sum);
                    value.last_updated_iteration = iteration;
                    value
                }
            };

            let target_key = PropKey {
                symbol: target,
                attr: rule.label.clone(),
                kind: AttrKind::Label,
            };
            let changed = next
                .get(&target_key)
                .is_none_or(|existing| (existing.strength - new_value.strength).abs() > f64::EPSILON);
            if changed {
                next.insert(target_key, new_value);
            }
        }
    }

    fn apply_dependency_rule(
        &self,
        rule: &DependencyRule,
        snapshot: &IndexMap<PropKey, PropagationValue>,
        next: &mut IndexMap<PropKey, PropagationValue>,
        iteration: u32,
    ) {
        let mut targets: Vec<SymbolId> = Vec::new();
        let mut seen = HashSet::new();
        for (key, value) in snapshot {
            if key.kind != AttrKind::Dependency || key.attr != rule.dependency {
                continue;
            }
            if rule.max_hops > 0 && value.hops >= rule.max_hops {
                continue;
            }
            for neighbor in
                self.connected(key.symbol, rule.direction, rule.include_type_hierarchy)
            {
                if seen.insert(neighbor.id) {
                    targets.push(neighbor.id);
                }
            }
        }

        for target in targets {
            let own_seed = self.annotations.seed_strength(target, &rule.dependency);
            let mut contributions: Vec<(f64, f64, &PropagationValue)> = Vec::new();
            let mut sources: HashSet<SymbolId> = HashSet::new();

            for contributor in self.connected(
                target,
                rule.direction.reverse(),
                rule.include_type_hierarchy,
            ) {
                let key = PropKey {
                    symbol: contributor.id,
                    attr: rule.dependency.clone(),
                    kind: AttrKind::Dependency,
                };
                let Some(value) = snapshot.get(&key) else {
                    continue;
                };
                if rule.max_hops > 0 && value.hops + 1 > rule.max_hops {
                    continue;
                }
                if value.path.contains(&target) {
                    continue;
                }
                let weighted = value.strength * rule.weight_function.weight(value.hops + 1);
                contributions.push((value.strength, weighted, value));
                sources.insert(value.source);
            }

            if contributions.is_empty() && own_seed.is_none() {
                continue;
            }

            let strength = match rule.aggregation {
                AggregationOp::Sum => {
                    own_seed.unwrap_or(0.0)
                        + contributions.iter().map(|(raw, _, _)| raw).sum::<f64>()
                }
                AggregationOp::WeightedSum => {
                    own_seed.unwrap_or(0.0)
                        + contributions.iter().map(|(_, w, _)| w).sum::<f64>()
                }
                AggregationOp::Max => contributions
                    .iter()
                    .map(|(raw, _, _)| *raw)
                    .chain(own_seed)
                    .fold(0.0, f64::max),
                AggregationOp::Unique => {
                    (sources.len() + usize::from(own_seed.is_some())) as f64
                }
                AggregationOp::Concat => {
                    own_seed.unwrap_or(0.0)
                        + contributions.iter().map(|(raw, _, _)| raw).sum::<f64>()
                }
            };
            if strength <= 0.0 {
                continue;
            }

            let strongest = contributions
                .iter()
                .max_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, _, value)| *value);
            let mut new_value = match strongest {
                Some(best) => best.step(target, strength, iteration),
                None => {
                    let mut value = PropagationValue::seed(target, strength);
                    value.last_updated_iteration = iteration;
                    value
                }
            };
            if rule.aggregation == AggregationOp::Concat {
                let mut names: Vec<String> = sources
                    .iter()
                    .map(|s| s.value().to_string())
                    .collect();
                names.sort_unstable();
                new_value
                    .metadata
                    .insert("sources".to_string(), names.join(","));
            }

            let target_key = PropKey {
                symbol: target,
                attr: rule.dependency.clone(),
                kind: AttrKind::Dependency,
            };
            let changed = next
                .get(&target_key)
                .is_none_or(|existing| (existing.strength - new_value.strength).abs() > f64::EPSILON);
            if changed {
                next.insert(target_key, new_value);
            }
        }
    }

    fn apply_custom_rules(&self, next: &mut IndexMap<PropKey, PropagationValue>, iteration: u32) {
        if self.compiled_rules.is_empty() {
            return;
        }

        // Per-symbol attribute sets, visible to has_label/has_dependency.
        let mut labels: HashMap<SymbolId, HashSet<String>> = HashMap::new();
        let mut dependencies: HashMap<SymbolId, HashSet<String>> = HashMap::new();
        for key in next.keys() {
            match key.kind {
                AttrKind::Label => labels
                    .entry(key.symbol)
                    .or_default()
                    .insert(key.attr.clone()),
                AttrKind::Dependency => dependencies
                    .entry(key.symbol)
                    .or_default()
                    .insert(key.attr.clone()),
            };
        }
        let empty = HashSet::new();

        for (key, value) in next.iter_mut() {
            let ctx = EvalContext {
                strength: value.strength,
                hops: value.hops,
                kind: key.kind,
                labels: labels.get(&key.symbol).unwrap_or(&empty),
                dependencies: dependencies.get(&key.symbol).unwrap_or(&empty),
            };
            for (trigger, actions) in &self.compiled_rules {
                if !trigger.matches(&ctx) {
                    continue;
                }
                for action in actions {
                    match action {
                        Action::MultiplyStrength(f) => value.strength *= f,
                        Action::AddStrength(x) => value.strength += x,
                        Action::SetStrength(x) => value.strength = *x,
                        Action::MultiplyDecay(f) => {
                            let current = value.decay_multiplier();
                            value.metadata.insert(
                                DECAY_MULTIPLIER_KEY.to_string(),
                                (current * f).to_string(),
                            );
                        }
                    }
                }
                value.strength = value.strength.max(0.0);
                value.last_updated_iteration = iteration;
            }
        }
    }

    fn diff(
        snapshot: &IndexMap<PropKey, PropagationValue>,
        next: &IndexMap<PropKey, PropagationValue>,
    ) -> (f64, usize) {
        let mut delta_sum = 0.0;
        let mut changed = 0usize;
        for (key, value) in next {
            let delta = match snapshot.get(key) {
                Some(old) => (value.strength - old.strength).abs(),
                None => value.strength.abs(),
            };
            if delta > 0.0 {
                delta_sum += delta;
                changed += 1;
            }
        }
        (delta_sum, changed)
    }

    /// Labels on a symbol after propagation, sorted by strength descending.
    /// `confidence = strength * 0.9^hops`.
    pub fn propagated_labels(&self, symbol: SymbolId) -> Vec<PropagatedLabel> {
        let mut out: Vec<PropagatedLabel> = self
            .state
            .iter()
            .filter(|(key, _)| key.symbol == symbol && key.kind == AttrKind::Label)
            .map(|(key, value)| PropagatedLabel {
                label: key.attr.clone(),
                strength: value.strength,
                source: value.source,
                path: value.path.clone(),
                hops: value.hops,
                confidence: value.strength * 0.9f64.powi(value.hops as i32),
            })
            .collect();
        out.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        out
    }

    pub fn propagated_dependencies(&self, symbol: SymbolId) -> Vec<PropagatedDependency> {
        let mut out: Vec<PropagatedDependency> = self
            .state
            .iter()
            .filter(|(key, _)| key.symbol == symbol && key.kind == AttrKind::Dependency)
            .map(|(key, value)| PropagatedDependency {
                dependency: key.attr.clone(),
                strength: value.strength,
                source: value.source,
                path: value.path.clone(),
                hops: value.hops,
                confidence: value.strength * 0.9f64.powi(value.hops as i32),
            })
            .collect();
        out.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        out
    }

    /// Every holder of `label`, strongest first.
    pub fn critical_paths(&self, label: &str) -> Vec<CriticalPath> {
        let mut out: Vec<CriticalPath> = self
            .state
            .iter()
            .filter(|(key, _)| key.kind == AttrKind::Label && key.attr == label)
            .map(|(key, value)| CriticalPath {
                symbol: key.symbol,
                label: label.to_string(),
                strength: value.strength,
                path: value.path.clone(),
                hops: value.hops,
            })
            .collect();
        out.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        out
    }

    /// Resolve an interface-typed call site to its concrete implementations,
    /// ranked by evidence confidence.
    pub fn get_interface_call_implementations(
        &self,
        interface_id: SymbolId,
    ) -> InterfaceAttribution {
        let ranked = self.tracker.get_implementors_with_quality(interface_id);

        let method = if ranked.iter().any(|r| {
            matches!(
                r.quality,
                RefQuality::Assigned | RefQuality::Returned | RefQuality::Cast
            )
        }) {
            AttributionMethod::CodeAnalysis
        } else if ranked.iter().any(|r| r.quality == RefQuality::Heuristic) {
            AttributionMethod::Heuristic
        } else {
            AttributionMethod::None
        };

        let mut implementations: Vec<ImplementationAttribution> = ranked
            .into_iter()
            .map(|r| ImplementationAttribution {
                impl_id: r.id,
                confidence: r.quality.confidence(),
                quality: r.quality,
                evidence: match r.quality {
                    RefQuality::Unknown => "unranked reference".to_string(),
                    q => format!("{} reference", q.as_str()),
                },
            })
            .collect();
        implementations.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.impl_id.cmp(&b.impl_id))
        });

        InterfaceAttribution {
            method,
            implementations,
        }
    }
}
