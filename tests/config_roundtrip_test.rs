//! Configuration round-trips through its on-disk representation, layers
//! file and environment overrides, and rejects invalid rule sets.

use codeintel::propagate::{
    AggregationOp, CustomRule, DependencyRule, LabelRule, PropagationDirection, PropagationMode,
};
use codeintel::{IndexError, Settings};
use std::io::Write;

fn elaborate_settings() -> Settings {
    let mut settings = Settings::default();
    settings.logging.default = "info".to_string();
    settings
        .logging
        .modules
        .insert("tracker".to_string(), "debug".to_string());
    settings.indexing.cleanup_threshold = 42;
    settings.propagation.label_rules.push(
        LabelRule::new(
            "payment-path",
            PropagationDirection::Upstream,
            PropagationMode::Decay,
        )
        .with_decay(0.8, 0.05)
        .with_max_hops(7)
        .with_boost(1.5, vec!["payment".to_string(), "public".to_string()]),
    );
    settings.propagation.dependency_rules.push(DependencyRule::new(
        "cache-access",
        PropagationDirection::Upstream,
        AggregationOp::WeightedSum,
    ));
    settings.propagation.custom_rules.push(CustomRule {
        name: "dampen-distant".to_string(),
        trigger: "has_label(payment-path) AND hops > 3".to_string(),
        action: "multiply_strength(0.5)".to_string(),
    });
    settings
}

#[test]
fn parse_of_serialize_is_identity() {
    let settings = elaborate_settings();
    settings.validate().unwrap();

    let text = toml::to_string(&settings).unwrap();
    let parsed: Settings = toml::from_str(&text).unwrap();
    assert_eq!(settings, parsed);

    // And again, to rule out serialize-order drift.
    let text2 = toml::to_string(&parsed).unwrap();
    assert_eq!(text, text2);
}

#[test]
fn file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[effects]
decay_factor = 0.9
min_confidence = 0.2

[[propagation.label_rules]]
label = "audit"
direction = "upstream"
mode = "reachability"
include_type_hierarchy = true
"#
    )
    .unwrap();

    let settings = Settings::load(Some(file.path())).unwrap();
    assert_eq!(settings.effects.decay_factor, 0.9);
    assert_eq!(settings.effects.min_confidence, 0.2);
    // A label_rules table in the file replaces the default set.
    assert_eq!(settings.propagation.label_rules.len(), 1);
    assert_eq!(settings.propagation.label_rules[0].label, "audit");
}

#[test]
fn invalid_rules_fail_loading() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[[propagation.custom_rules]]
name = "broken"
trigger = "has_label(x) AND"
action = "set_strength(0.5)"
"#
    )
    .unwrap();

    match Settings::load(Some(file.path())) {
        Err(IndexError::ConfigError { reason }) => {
            assert!(reason.contains("broken"), "{reason}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn unknown_direction_fails_loading() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[[propagation.label_rules]]
label = "x"
direction = "sideways"
mode = "reachability"
"#
    )
    .unwrap();

    assert!(matches!(
        Settings::load(Some(file.path())),
        Err(IndexError::ConfigError { .. })
    ));
}
