//! Transitive purity: local side-effect records flow upstream with decaying
//! confidence, and purity recomputation follows the category table.

use codeintel::effects::{EffectCategories, PurityLevel, SideEffectPropagator};
use codeintel::reference::{RefKind, ReferenceRecord};
use codeintel::symbol::Symbol;
use codeintel::types::{Range, SymbolId, SymbolKind};
use codeintel::ReferenceTracker;

/// api -> service -> {store, render}; store writes to the database, render
/// mutates its receiver.
fn project() -> (ReferenceTracker, impl Fn(&str) -> SymbolId) {
    let tracker = ReferenceTracker::new();
    let file = tracker.file_id_for_path("app.go");
    tracker.process_file(
        file,
        "app.go",
        vec![
            Symbol::new("api", SymbolKind::Function, Range::new(1, 0, 9, 1)),
            Symbol::new("service", SymbolKind::Function, Range::new(11, 0, 19, 1)),
            Symbol::new("store", SymbolKind::Function, Range::new(21, 0, 29, 1)),
            Symbol::new("render", SymbolKind::Function, Range::new(31, 0, 39, 1)),
        ],
        vec![
            ReferenceRecord::new(2, 4, RefKind::Call, "service"),
            ReferenceRecord::new(12, 4, RefKind::Call, "store"),
            ReferenceRecord::new(13, 4, RefKind::Call, "render"),
        ],
        Vec::new(),
    );
    tracker.process_all_references();

    let lookup = {
        let names: Vec<(String, SymbolId)> = ["api", "service", "store", "render"]
            .iter()
            .map(|n| (n.to_string(), tracker.find_symbols_by_name(n).remove(0).id))
            .collect();
        move |name: &str| {
            names
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, id)| *id)
                .unwrap()
        }
    };
    (tracker, lookup)
}

#[test]
fn empty_effect_set_means_pure() {
    let (tracker, id) = project();
    let mut propagator = SideEffectPropagator::with_defaults(&tracker);
    propagator.set_local_effects(id("render"), EffectCategories::empty(), 1.0, Vec::new());
    propagator.propagate();

    let info = propagator.info(id("render")).unwrap();
    assert!(info.combined().is_empty());
    assert!(info.is_pure());
    assert_eq!(info.purity_score, 1.0);
}

#[test]
fn worst_effect_dominates_purity() {
    let (tracker, id) = project();
    let mut propagator = SideEffectPropagator::with_defaults(&tracker);
    propagator.set_local_effects(
        id("store"),
        EffectCategories::DATABASE,
        1.0,
        vec!["INSERT statement".to_string()],
    );
    propagator.set_local_effects(
        id("render"),
        EffectCategories::RECEIVER_WRITE,
        1.0,
        vec!["mutates buffer".to_string()],
    );

    let report = propagator.propagate();
    assert!(report.converged);

    // render alone is object-state.
    assert_eq!(
        propagator.info(id("render")).unwrap().purity_level,
        PurityLevel::ObjectState
    );
    assert_eq!(propagator.info(id("render")).unwrap().purity_score, 0.6);

    // service combines database (worst) and receiver writes.
    let service = propagator.info(id("service")).unwrap();
    assert_eq!(service.purity_level, PurityLevel::ExternalDependency);
    assert_eq!(service.purity_score, 0.0);
    assert!(service.dependent_functions.contains_key("store"));
    assert!(service.dependent_functions.contains_key("render"));

    // api inherits transitively, two hops from the leaves.
    let api = propagator.info(id("api")).unwrap();
    assert_eq!(api.purity_level, PurityLevel::ExternalDependency);
    assert!(
        api.transitive_categories
            .contains(EffectCategories::DATABASE | EffectCategories::RECEIVER_WRITE)
    );
}

#[test]
fn confidence_decays_per_hop() {
    let (tracker, id) = project();
    let mut propagator = SideEffectPropagator::with_defaults(&tracker);
    propagator.set_local_effects(id("store"), EffectCategories::IO, 1.0, Vec::new());
    propagator.propagate();

    let service = propagator.info(id("service")).unwrap();
    let api = propagator.info(id("api")).unwrap();
    assert!((service.transitive_confidence - 0.95).abs() < 1e-9);
    assert!(api.transitive_confidence < service.transitive_confidence);
}

#[test]
fn global_write_maps_to_module_global() {
    let (tracker, id) = project();
    let mut propagator = SideEffectPropagator::with_defaults(&tracker);
    propagator.set_local_effects(
        id("store"),
        EffectCategories::GLOBAL_WRITE,
        1.0,
        Vec::new(),
    );
    propagator.propagate();

    let store = propagator.info(id("store")).unwrap();
    assert_eq!(store.purity_level, PurityLevel::ModuleGlobal);
    assert_eq!(store.purity_score, 0.3);
}

#[test]
fn report_summarizes_project_purity() {
    let (tracker, id) = project();
    let mut propagator = SideEffectPropagator::with_defaults(&tracker);
    propagator.set_local_effects(id("store"), EffectCategories::NETWORK, 1.0, Vec::new());
    propagator.set_local_effects(id("render"), EffectCategories::empty(), 1.0, Vec::new());

    let report = propagator.propagate();
    assert_eq!(report.total_analyzed, 4);
    assert_eq!(report.pure_count, 1);
    assert_eq!(report.impure_count, 3);
    assert!(report.converged);
    assert!(report.iterations_run < 100);
}
