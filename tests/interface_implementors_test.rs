//! Interface implementor resolution: explicit references with quality
//! ranking, plus the heuristic implementor matcher.

use codeintel::propagate::AttributionMethod;
use codeintel::reference::{RefKind, RefQuality, RefStrength, ReferenceRecord};
use codeintel::symbol::Symbol;
use codeintel::types::{Range, SymbolKind};
use codeintel::{GraphPropagator, ReferenceTracker};

/// Handler interface at L10-15, FileHandler struct at L20-25 (assigned
/// implements), NetHandler struct at L30-35 (heuristic implements).
fn handler_project() -> ReferenceTracker {
    let tracker = ReferenceTracker::new();
    let file = tracker.file_id_for_path("test.go");

    tracker.process_file(
        file,
        "test.go",
        vec![
            Symbol::new("Handler", SymbolKind::Interface, Range::new(10, 0, 15, 1)),
            Symbol::new("FileHandler", SymbolKind::Struct, Range::new(20, 0, 25, 1)),
            Symbol::new("NetHandler", SymbolKind::Struct, Range::new(30, 0, 35, 1)),
        ],
        vec![
            ReferenceRecord::new(20, 0, RefKind::Implements, "Handler")
                .with_quality(RefQuality::Assigned),
            ReferenceRecord::new(30, 0, RefKind::Implements, "Handler")
                .with_quality(RefQuality::Heuristic)
                .with_strength(RefStrength::Loose),
        ],
        Vec::new(),
    );
    tracker.process_all_references();
    tracker
}

#[test]
fn implementors_include_both_qualities() {
    let tracker = handler_project();
    let handler = tracker.find_symbols_by_name("Handler").remove(0).id;
    let file_handler = tracker.find_symbols_by_name("FileHandler").remove(0).id;
    let net_handler = tracker.find_symbols_by_name("NetHandler").remove(0).id;

    let implementors = tracker.get_implementors(handler);
    assert_eq!(implementors.len(), 2);
    assert!(implementors.contains(&file_handler));
    assert!(implementors.contains(&net_handler));

    assert_eq!(tracker.get_implemented_interfaces(file_handler), vec![handler]);
}

#[test]
fn quality_ranking_prefers_assigned_evidence() {
    let tracker = handler_project();
    let handler = tracker.find_symbols_by_name("Handler").remove(0).id;
    let file_handler = tracker.find_symbols_by_name("FileHandler").remove(0).id;

    let ranked = tracker.get_implementors_with_quality(handler);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].id, file_handler);
    assert_eq!(ranked[0].quality, RefQuality::Assigned);
    assert!(ranked[0].rank > ranked[1].rank);
}

#[test]
fn attribution_method_is_code_analysis_when_explicit_evidence_exists() {
    let tracker = handler_project();
    let handler = tracker.find_symbols_by_name("Handler").remove(0).id;

    let propagator = GraphPropagator::with_defaults(&tracker);
    let attribution = propagator.get_interface_call_implementations(handler);
    assert_eq!(attribution.method, AttributionMethod::CodeAnalysis);
    assert_eq!(attribution.implementations.len(), 2);
    assert_eq!(attribution.implementations[0].confidence, 0.95);
    assert_eq!(attribution.implementations[1].confidence, 0.50);
}

/// A type whose method set covers an interface's declared methods gets
/// exactly one synthesized implements edge (loose, heuristic).
#[test]
fn heuristic_matcher_synthesizes_implements() {
    let tracker = ReferenceTracker::new();
    let file = tracker.file_id_for_path("store.go");

    tracker.process_file(
        file,
        "store.go",
        vec![
            Symbol::new("Store", SymbolKind::Interface, Range::new(1, 0, 6, 1)),
            Symbol::new("Get", SymbolKind::Method, Range::new(2, 4, 2, 30)),
            Symbol::new("Put", SymbolKind::Method, Range::new(3, 4, 3, 30)),
            Symbol::new("MemStore", SymbolKind::Struct, Range::new(10, 0, 12, 1)),
            Symbol::new("Get", SymbolKind::Method, Range::new(20, 0, 24, 1))
                .with_receiver("*MemStore"),
            Symbol::new("Put", SymbolKind::Method, Range::new(26, 0, 30, 1))
                .with_receiver("*MemStore"),
            // HalfStore only has Get, so it must not match.
            Symbol::new("HalfStore", SymbolKind::Struct, Range::new(40, 0, 42, 1)),
            Symbol::new("Get", SymbolKind::Method, Range::new(44, 0, 46, 1))
                .with_receiver("HalfStore"),
        ],
        Vec::new(),
        Vec::new(),
    );
    tracker.process_all_references();

    let store = tracker.find_symbols_by_name("Store").remove(0).id;
    let mem_store = tracker.find_symbols_by_name("MemStore").remove(0).id;

    let implementors = tracker.get_implementors(store);
    assert_eq!(implementors, vec![mem_store]);

    let ranked = tracker.get_implementors_with_quality(store);
    assert_eq!(ranked[0].quality, RefQuality::Heuristic);

    // Re-running resolution must not duplicate the synthesized edge.
    tracker.process_all_references();
    assert_eq!(tracker.get_implementors(store).len(), 1);

    let edges: Vec<_> = tracker
        .get_symbol_references(mem_store, codeintel::Direction::Outgoing)
        .into_iter()
        .filter(|r| r.kind == RefKind::Implements)
        .collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].strength, RefStrength::Loose);
    assert_eq!(edges[0].quality, RefQuality::Heuristic);
}

/// The matcher does not suppress itself when an explicit edge exists; both
/// coexist and quality ranking de-prefers the heuristic one.
#[test]
fn explicit_and_heuristic_edges_coexist() {
    let tracker = ReferenceTracker::new();
    let file = tracker.file_id_for_path("dual.go");

    tracker.process_file(
        file,
        "dual.go",
        vec![
            Symbol::new("Codec", SymbolKind::Interface, Range::new(1, 0, 4, 1)),
            Symbol::new("Encode", SymbolKind::Method, Range::new(2, 4, 2, 30)),
            Symbol::new("JsonCodec", SymbolKind::Struct, Range::new(10, 0, 12, 1)),
            Symbol::new("Encode", SymbolKind::Method, Range::new(14, 0, 18, 1))
                .with_receiver("JsonCodec"),
        ],
        vec![
            ReferenceRecord::new(10, 0, RefKind::Implements, "Codec")
                .with_quality(RefQuality::Assigned),
        ],
        Vec::new(),
    );
    tracker.process_all_references();

    let codec = tracker.find_symbols_by_name("Codec").remove(0).id;
    let json_codec = tracker.find_symbols_by_name("JsonCodec").remove(0).id;

    // One implementor, two edges with different qualities.
    assert_eq!(tracker.get_implementors(codec), vec![json_codec]);
    let edges: Vec<_> = tracker
        .get_symbol_references(json_codec, codeintel::Direction::Outgoing)
        .into_iter()
        .filter(|r| r.kind == RefKind::Implements)
        .collect();
    assert_eq!(edges.len(), 2);

    // The ranked view keeps the best evidence.
    let ranked = tracker.get_implementors_with_quality(codec);
    assert_eq!(ranked[0].quality, RefQuality::Assigned);
}
