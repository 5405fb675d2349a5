// biomapper-actions/tests/set_overlap.rs
// ============================================================================
// Module: Set Overlap Tests
// Description: Two-way overlap scenario and Jaccard properties.
// Purpose: Pin overlap statistics and the Jaccard bound laws.
// Dependencies: biomapper-actions, biomapper-core, proptest
// ============================================================================
//! ## Overview
//! Validates the cohort overlap fixture (two protein panels sharing two
//! accessions) and the Jaccard laws: bounded in `[0, 1]`, 1 only for equal
//! non-empty sets, 0 only for disjoint sets, and symmetric.

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

mod common;

use std::collections::BTreeSet;

use biomapper_actions::CalculateSetOverlap;
use biomapper_actions::jaccard;
use common::column_dataset;
use common::invoke;
use common::test_context;
use proptest::prelude::*;

/// Verifies the two-cohort overlap fixture end to end.
#[test]
fn two_way_overlap_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.insert_dataset(
        "ukbb".into(),
        column_dataset(
            "uniprot",
            &[Some("P12345"), Some("P67890"), Some("Q11111"), Some("Q22222")],
        ),
    )
    .unwrap();
    ctx.insert_dataset(
        "hpa".into(),
        column_dataset(
            "uniprot",
            &[Some("P12345"), Some("Q11111"), Some("Q33333"), Some("Q44444")],
        ),
    )
    .unwrap();

    let outcome = invoke(
        &CalculateSetOverlap,
        serde_json::json!({
            "inputs": {"ukbb": "uniprot", "hpa": "uniprot"},
            "persist_sets": true,
        }),
        &mut ctx,
    )
    .unwrap();
    assert!(outcome.success);

    let stats = ctx.statistics.get("set_overlap").unwrap();
    assert_eq!(stats["intersection_size"], serde_json::json!(2));
    assert_eq!(stats["union_size"], serde_json::json!(6));
    assert_eq!(stats["sets"]["ukbb"]["size"], serde_json::json!(4));
    assert_eq!(stats["sets"]["ukbb"]["unique_to_set"], serde_json::json!(2));
    assert_eq!(stats["sets"]["hpa"]["unique_to_set"], serde_json::json!(2));

    let pairwise = stats["pairwise"].as_array().unwrap();
    assert_eq!(pairwise.len(), 1);
    let jaccard_value = pairwise[0]["jaccard"].as_f64().unwrap();
    assert!((jaccard_value - 1.0 / 3.0).abs() < 1e-12);

    // Persisted sets land as single-column datasets.
    let intersection = ctx.dataset(&"set_overlap_intersection".into()).unwrap();
    assert_eq!(intersection.len(), 2);
    let unique_ukbb = ctx.dataset(&"set_overlap_unique_ukbb".into()).unwrap();
    assert_eq!(unique_ukbb.len(), 2);
}

/// Verifies fewer than two inputs are rejected.
#[test]
fn requires_two_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.insert_dataset("only".into(), column_dataset("id", &[Some("A")])).unwrap();
    let error = invoke(
        &CalculateSetOverlap,
        serde_json::json!({"inputs": {"only": "id"}}),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(error.kind, biomapper_core::ErrorKind::ParamValidation);
}

/// Verifies case-insensitive comparison folds identifiers together.
#[test]
fn case_insensitive_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.insert_dataset("a".into(), column_dataset("id", &[Some("p12345")])).unwrap();
    ctx.insert_dataset("b".into(), column_dataset("id", &[Some("P12345")])).unwrap();

    invoke(
        &CalculateSetOverlap,
        serde_json::json!({
            "inputs": {"a": "id", "b": "id"},
            "case_sensitive": false,
        }),
        &mut ctx,
    )
    .unwrap();
    let stats = ctx.statistics.get("set_overlap").unwrap();
    assert_eq!(stats["intersection_size"], serde_json::json!(1));
}

// ============================================================================
// SECTION: Jaccard Laws
// ============================================================================

/// Computes the Jaccard index of two sets directly.
fn jaccard_of(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    jaccard(a.intersection(b).count(), a.union(b).count())
}

/// Verifies the empty/empty convention.
#[test]
fn jaccard_of_empty_sets_is_zero() {
    assert_eq!(jaccard(0, 0), 0.0);
}

proptest! {
    /// Jaccard stays in bounds, hits the extremes only where the laws
    /// demand, and is symmetric.
    #[test]
    fn jaccard_laws(
        a in proptest::collection::btree_set("[A-Z][0-9]{2}", 0..12),
        b in proptest::collection::btree_set("[A-Z][0-9]{2}", 0..12),
    ) {
        let forward = jaccard_of(&a, &b);
        let backward = jaccard_of(&b, &a);
        prop_assert!((0.0..=1.0).contains(&forward));
        prop_assert_eq!(forward, backward);
        if forward == 1.0 {
            prop_assert!(!a.is_empty());
            prop_assert_eq!(&a, &b);
        }
        if a == b && !a.is_empty() {
            prop_assert_eq!(forward, 1.0);
        }
        let disjoint = a.intersection(&b).count() == 0;
        prop_assert_eq!(forward == 0.0, disjoint);
    }
}
