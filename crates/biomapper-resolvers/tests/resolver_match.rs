// biomapper-resolvers/tests/resolver_match.rs
// ============================================================================
// Module: Resolver Match Action Tests
// Description: The generic mapper bridge over the resolver registry.
// Purpose: Pin candidate selection, thresholds, and the mapper contract.
// Dependencies: biomapper-resolvers, biomapper-core, tempfile
// ============================================================================
//! ## Overview
//! Validates `RESOLVER_MATCH` over a table resolver: best-candidate
//! selection, the minimum-confidence threshold, the raw candidate dataset,
//! and conformance to the canonical mapping result model.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::float_cmp,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use biomapper_core::Action;
use biomapper_core::CellValue;
use biomapper_core::Dataset;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionContext;
use biomapper_core::JobId;
use biomapper_core::Record;
use biomapper_core::StrategyName;
use biomapper_core::Timestamp;
use biomapper_core::confidence;
use biomapper_resolvers::ResolverMatch;
use biomapper_resolvers::ResolverRegistry;
use biomapper_resolvers::ResolverShell;
use biomapper_resolvers::TableResolver;

/// Builds a context seeded with a three-identifier dataset.
fn seeded_context() -> ExecutionContext {
    let mut ctx = ExecutionContext::new(
        JobId::new("job-resolver-match"),
        StrategyName::new("test_strategy"),
        Timestamp::from_unix_millis(0),
        std::env::temp_dir(),
        BTreeMap::new(),
        BTreeMap::new(),
    );
    let mut dataset = Dataset::new(vec!["uniprot".to_string()]);
    for id in ["P12345", "Q11111", "Z00000"] {
        let mut row = Record::new();
        row.insert("uniprot".to_string(), CellValue::text(id));
        dataset.push_row(row).unwrap();
    }
    ctx.insert_dataset("proteins".into(), dataset).unwrap();
    ctx
}

/// Builds a registry with one table resolver behind a shell.
fn registry() -> Arc<ResolverRegistry> {
    let resolver = TableResolver::from_pairs(
        "historical",
        "historical_api",
        confidence::HISTORICAL,
        [
            ("P12345".to_string(), "UKBB_1".to_string()),
            ("P12345".to_string(), "UKBB_2".to_string()),
            ("Q11111".to_string(), "UKBB_3".to_string()),
        ],
    );
    let mut registry = ResolverRegistry::new();
    registry.register(ResolverShell::new(Arc::new(resolver), 1_000));
    Arc::new(registry)
}

/// Invokes the action through its schema, as the executor does.
fn invoke(
    action: &ResolverMatch,
    params: serde_json::Value,
    ctx: &mut ExecutionContext,
) -> Result<biomapper_core::ActionOutcome, biomapper_core::EngineError> {
    let raw: BTreeMap<String, serde_json::Value> = params
        .as_object()
        .map(|entries| entries.clone().into_iter().collect())
        .unwrap_or_default();
    let validated = action.parameters_schema().validate(&raw)?;
    action.execute(&validated, ctx)
}

/// Verifies candidates map into canonical results, best candidate first.
#[test]
fn maps_best_candidate_per_source() {
    let action = ResolverMatch::new(registry());
    let mut ctx = seeded_context();
    let outcome = invoke(
        &action,
        serde_json::json!({
            "input_key": "proteins",
            "identifier_column": "uniprot",
            "resolver": "historical",
        }),
        &mut ctx,
    )
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.mapping_results.len(), 2);
    for result in &outcome.mapping_results {
        result.validate().unwrap();
        assert_eq!(result.confidence, confidence::HISTORICAL);
        assert_eq!(result.match_method, "historical_api");
    }
    // Z00000 has no candidates and stays absent from the results.
    assert!(outcome.mapping_results.iter().all(|result| result.source_id != "Z00000"));
}

/// Verifies expanded rows stamp composite provenance onto their records.
#[test]
fn composite_rows_stamp_provenance() {
    let action = ResolverMatch::new(registry());
    let mut ctx = ExecutionContext::new(
        JobId::new("job-composite-provenance"),
        StrategyName::new("test_strategy"),
        Timestamp::from_unix_millis(0),
        std::env::temp_dir(),
        BTreeMap::new(),
        BTreeMap::new(),
    );
    // An expanded dataset: P12345 came out of a two-component composite,
    // Q11111 out of a degenerate single-component expansion, Z00000 never
    // passed through expansion.
    let mut dataset = Dataset::new(vec![
        "uniprot".to_string(),
        biomapper_core::ORIGINAL_COMPOSITE_COLUMN.to_string(),
        biomapper_core::EXPANSION_COUNT_COLUMN.to_string(),
    ]);
    for (id, original, count) in [
        ("P12345", Some("P12345,P99999"), 2.0),
        ("Q11111", Some("Q11111"), 1.0),
        ("Z00000", None, 0.0),
    ] {
        let mut row = Record::new();
        row.insert("uniprot".to_string(), CellValue::text(id));
        row.insert(
            biomapper_core::ORIGINAL_COMPOSITE_COLUMN.to_string(),
            original.map_or(CellValue::Null, CellValue::text),
        );
        row.insert(
            biomapper_core::EXPANSION_COUNT_COLUMN.to_string(),
            if original.is_some() { CellValue::Number(count) } else { CellValue::Null },
        );
        dataset.push_row(row).unwrap();
    }
    ctx.insert_dataset("proteins".into(), dataset).unwrap();

    let outcome = invoke(
        &action,
        serde_json::json!({
            "input_key": "proteins",
            "identifier_column": "uniprot",
            "resolver": "historical",
        }),
        &mut ctx,
    )
    .unwrap();

    let by_source: BTreeMap<&str, &biomapper_core::StandardMappingResult> = outcome
        .mapping_results
        .iter()
        .map(|result| (result.source_id.as_str(), result))
        .collect();
    let composite = by_source.get("P12345").unwrap();
    assert!(composite.is_composite);
    assert_eq!(composite.parsed_value.as_deref(), Some("P12345"));
    assert!(composite.details.as_deref().unwrap().contains("P12345,P99999"));
    // Single-component expansions stay composite for provenance.
    let degenerate = by_source.get("Q11111").unwrap();
    assert!(degenerate.is_composite);
    assert_eq!(degenerate.parsed_value.as_deref(), Some("Q11111"));
    for result in &outcome.mapping_results {
        result.validate().unwrap();
    }
}

/// Verifies the confidence threshold filters candidates out.
#[test]
fn min_confidence_threshold_applies() {
    let action = ResolverMatch::new(registry());
    let mut ctx = seeded_context();
    let outcome = invoke(
        &action,
        serde_json::json!({
            "input_key": "proteins",
            "identifier_column": "uniprot",
            "resolver": "historical",
            "min_confidence": 0.95,
        }),
        &mut ctx,
    )
    .unwrap();
    assert!(outcome.mapping_results.is_empty());
}

/// Verifies the raw candidate dataset lands when requested.
#[test]
fn raw_candidates_persist_when_requested() {
    let action = ResolverMatch::new(registry());
    let mut ctx = seeded_context();
    invoke(
        &action,
        serde_json::json!({
            "input_key": "proteins",
            "identifier_column": "uniprot",
            "resolver": "historical",
            "raw_output_key": "historical_raw",
        }),
        &mut ctx,
    )
    .unwrap();
    let raw = ctx.dataset(&"historical_raw".into()).unwrap();
    // P12345 has two candidates, Q11111 one.
    assert_eq!(raw.len(), 3);
}

/// Verifies an unregistered resolver surfaces as retriable unavailability.
#[test]
fn unknown_resolver_is_unavailable() {
    let action = ResolverMatch::new(Arc::new(ResolverRegistry::new()));
    let mut ctx = seeded_context();
    let error = invoke(
        &action,
        serde_json::json!({
            "input_key": "proteins",
            "identifier_column": "uniprot",
            "resolver": "missing",
        }),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::ResolverUnavailable);
    assert!(error.retriable);
}
