//! Propagation rules: label rules, dependency rules, and the configuration
//! that carries them. The shipped default rule-set covers the common labels
//! (critical, security, database-call, api-endpoint, ui-relevance,
//! memory-allocation).

use crate::error::PropagationError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 0.001;
pub const DEFAULT_DECAY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationDirection {
    Upstream,
    Downstream,
    Bidirectional,
}

impl PropagationDirection {
    /// The direction a target's contributions arrive from.
    pub fn reverse(&self) -> Self {
        match self {
            Self::Upstream => Self::Downstream,
            Self::Downstream => Self::Upstream,
            Self::Bidirectional => Self::Bidirectional,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Binary: anything connected gets strength 1. No decay, no boost.
    Reachability,
    /// Sums all incoming values in a single pass per target.
    Accumulation,
    /// PageRank-style strength falloff. A UI ranking heuristic, not a
    /// semantic property.
    Decay,
    /// Target takes the maximum over incoming path strengths.
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationOp {
    Sum,
    Max,
    Unique,
    Concat,
    WeightedSum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFunction {
    Linear,
    Exponential,
    Log,
}

impl WeightFunction {
    /// Weight applied to a contribution that arrives over `hops` hops.
    pub fn weight(&self, hops: u32) -> f64 {
        let h = f64::from(hops);
        match self {
            Self::Linear => (1.0 - 0.2 * h).max(0.0),
            Self::Exponential => 0.8f64.powf(h),
            Self::Log => {
                if hops == 0 {
                    1.0
                } else {
                    1.0 / (h + 1.0).ln()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRule {
    pub label: String,
    pub direction: PropagationDirection,
    pub mode: PropagationMode,
    /// Strength multiplier per hop in `Decay` mode.
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// Decay stops once strength falls below this.
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_hops: u32,
    #[serde(default)]
    pub include_type_hierarchy: bool,
    /// Multiplier applied when the target matches any condition. 0 disables.
    /// Ignored by `Reachability`.
    #[serde(default)]
    pub boost: f64,
    #[serde(default)]
    pub conditions: Vec<String>,
}

fn default_decay() -> f64 {
    DEFAULT_DECAY
}

fn default_min_strength() -> f64 {
    0.1
}

impl LabelRule {
    pub fn new(label: &str, direction: PropagationDirection, mode: PropagationMode) -> Self {
        Self {
            label: label.to_string(),
            direction,
            mode,
            decay: DEFAULT_DECAY,
            min_strength: default_min_strength(),
            max_hops: 0,
            include_type_hierarchy: false,
            boost: 0.0,
            conditions: Vec::new(),
        }
    }

    pub fn with_decay(mut self, decay: f64, min_strength: f64) -> Self {
        self.decay = decay;
        self.min_strength = min_strength;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_type_hierarchy(mut self) -> Self {
        self.include_type_hierarchy = true;
        self
    }

    pub fn with_boost(mut self, boost: f64, conditions: Vec<String>) -> Self {
        self.boost = boost;
        self.conditions = conditions;
        self
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        if self.decay <= 0.0 || self.decay > 1.0 {
            return Err(PropagationError::InvalidRule {
                rule: self.label.clone(),
                field: "decay".to_string(),
                reason: format!("{} is outside (0, 1]", self.decay),
            });
        }
        if !(0.0..=1.0).contains(&self.min_strength) {
            return Err(PropagationError::InvalidRule {
                rule: self.label.clone(),
                field: "min_strength".to_string(),
                reason: format!("{} is outside [0, 1]", self.min_strength),
            });
        }
        if self.boost < 0.0 {
            return Err(PropagationError::InvalidRule {
                rule: self.label.clone(),
                field: "boost".to_string(),
                reason: "boost must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub dependency: String,
    pub direction: PropagationDirection,
    pub aggregation: AggregationOp,
    #[serde(default = "default_weight_function")]
    pub weight_function: WeightFunction,
    #[serde(default)]
    pub max_hops: u32,
    #[serde(default)]
    pub include_type_hierarchy: bool,
}

fn default_weight_function() -> WeightFunction {
    WeightFunction::Linear
}

impl DependencyRule {
    pub fn new(dependency: &str, direction: PropagationDirection, aggregation: AggregationOp) -> Self {
        Self {
            dependency: dependency.to_string(),
            direction,
            aggregation,
            weight_function: WeightFunction::Linear,
            max_hops: 0,
            include_type_hierarchy: false,
        }
    }
}

/// A runtime-parsed trigger/action rule. The strings hold the DSL source;
/// parsing happens when the propagator compiles its rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub name: String,
    pub trigger: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
    #[serde(default = "default_decay")]
    pub default_decay: f64,
    #[serde(default)]
    pub label_rules: Vec<LabelRule>,
    #[serde(default)]
    pub dependency_rules: Vec<DependencyRule>,
    #[serde(default)]
    pub custom_rules: Vec<CustomRule>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_convergence_threshold() -> f64 {
    DEFAULT_CONVERGENCE_THRESHOLD
}

impl Default for PropagationConfig {
    /// The shipped rule-set.
    fn default() -> Self {
        use PropagationDirection::*;
        use PropagationMode::*;

        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
            default_decay: DEFAULT_DECAY,
            label_rules: vec![
                LabelRule::new("critical", Upstream, Reachability).with_type_hierarchy(),
                LabelRule::new("security", Upstream, Reachability).with_type_hierarchy(),
                LabelRule::new("database-call", Upstream, Accumulation).with_type_hierarchy(),
                LabelRule::new("api-endpoint", Downstream, Reachability)
                    .with_max_hops(10)
                    .with_type_hierarchy(),
                LabelRule::new("ui-relevance", Bidirectional, Decay)
                    .with_decay(0.7, 0.15)
                    .with_max_hops(5),
                LabelRule::new("memory-allocation", Upstream, Accumulation)
                    .with_type_hierarchy(),
            ],
            dependency_rules: Vec::new(),
            custom_rules: Vec::new(),
        }
    }
}

impl PropagationConfig {
    pub fn validate(&self) -> Result<(), PropagationError> {
        if self.max_iterations == 0 {
            return Err(PropagationError::InvalidRule {
                rule: "config".to_string(),
                field: "max_iterations".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.convergence_threshold) {
            return Err(PropagationError::InvalidRule {
                rule: "config".to_string(),
                field: "convergence_threshold".to_string(),
                reason: format!("{} is outside [0, 1)", self.convergence_threshold),
            });
        }
        if self.default_decay <= 0.0 || self.default_decay > 1.0 {
            return Err(PropagationError::InvalidRule {
                rule: "config".to_string(),
                field: "default_decay".to_string(),
                reason: format!("{} is outside (0, 1]", self.default_decay),
            });
        }
        for rule in &self.label_rules {
            rule.validate()?;
        }
        for rule in &self.custom_rules {
            super::dsl::parse_trigger(&rule.trigger).map_err(|reason| {
                PropagationError::DslParse {
                    rule: rule.name.clone(),
                    reason,
                }
            })?;
            super::dsl::parse_actions(&rule.action).map_err(|reason| {
                PropagationError::DslParse {
                    rule: rule.name.clone(),
                    reason,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_functions() {
        assert_eq!(WeightFunction::Linear.weight(0), 1.0);
        assert!((WeightFunction::Linear.weight(2) - 0.6).abs() < 1e-9);
        assert_eq!(WeightFunction::Linear.weight(10), 0.0);

        assert!((WeightFunction::Exponential.weight(2) - 0.64).abs() < 1e-9);

        assert_eq!(WeightFunction::Log.weight(0), 1.0);
        assert!((WeightFunction::Log.weight(1) - 1.0 / 2.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_direction_reverse() {
        assert_eq!(
            PropagationDirection::Upstream.reverse(),
            PropagationDirection::Downstream
        );
        assert_eq!(
            PropagationDirection::Bidirectional.reverse(),
            PropagationDirection::Bidirectional
        );
    }

    #[test]
    fn test_default_rule_set() {
        let config = PropagationConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.convergence_threshold, 0.001);
        assert_eq!(config.label_rules.len(), 6);

        let critical = &config.label_rules[0];
        assert_eq!(critical.label, "critical");
        assert_eq!(critical.mode, PropagationMode::Reachability);
        assert_eq!(critical.max_hops, 0);
        assert!(critical.include_type_hierarchy);

        let ui = config
            .label_rules
            .iter()
            .find(|r| r.label == "ui-relevance")
            .unwrap();
        assert_eq!(ui.mode, PropagationMode::Decay);
        assert_eq!(ui.direction, PropagationDirection::Bidirectional);
        assert_eq!(ui.decay, 0.7);
        assert_eq!(ui.max_hops, 5);
        assert!(!ui.include_type_hierarchy);

        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let mut config = PropagationConfig::default();
        config.convergence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PropagationConfig::default();
        config.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = PropagationConfig::default();
        config.label_rules[0].decay = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_dsl() {
        let mut config = PropagationConfig::default();
        config.custom_rules.push(CustomRule {
            name: "broken".to_string(),
            trigger: "has_label(".to_string(),
            action: "set_strength(0.5)".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PropagationConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: PropagationConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
