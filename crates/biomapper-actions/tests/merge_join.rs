// biomapper-actions/tests/merge_join.rs
// ============================================================================
// Module: Dataset Merge Tests
// Description: Join-column contract, join types, and conservation laws.
// Purpose: Pin the merge action's error surface and row accounting.
// Dependencies: biomapper-actions, biomapper-core, proptest
// ============================================================================
//! ## Overview
//! Validates the merge contract over the cohort fixture: explicit
//! join-column maps keyed by dataset key, the `JOIN_COLUMN_UNSPECIFIED`
//! and `JOIN_COLUMN_NOT_FOUND` failures, one-to-many expansion accounting,
//! and the inner/outer conservation bounds.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use biomapper_actions::MergeDatasets;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionContext;
use common::invoke;
use common::pair_dataset;
use common::test_context;
use proptest::prelude::*;

/// Seeds the cohort fixture: a normalized panel and a knowledge graph
/// extract keyed by different column names.
fn seed_cohorts(ctx: &mut ExecutionContext) {
    ctx.insert_dataset(
        "arivale_normalized".into(),
        pair_dataset(
            "uniprot",
            "panel",
            &[("P12345", "inflammation"), ("Q11111", "cardio"), ("Z99999", "neuro")],
        ),
    )
    .unwrap();
    ctx.insert_dataset(
        "kg2c_normalized".into(),
        pair_dataset(
            "extracted_uniprot",
            "node_id",
            &[("P12345", "KG:1"), ("P12345", "KG:2"), ("Q11111", "KG:3")],
        ),
    )
    .unwrap();
}

/// Verifies an inner join on explicit join columns with one-to-many
/// expansion.
#[test]
fn inner_join_on_explicit_columns() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    seed_cohorts(&mut ctx);

    let outcome = invoke(
        &MergeDatasets,
        serde_json::json!({
            "input_key": "arivale_normalized",
            "dataset2_key": "kg2c_normalized",
            "join_columns": {
                "arivale_normalized": "uniprot",
                "kg2c_normalized": "extracted_uniprot",
            },
            "join_type": "inner",
            "output_key": "merged",
        }),
        &mut ctx,
    )
    .unwrap();
    assert!(outcome.success);

    // P12345 matches two KG nodes, Q11111 one, Z99999 none.
    let merged = ctx.dataset(&"merged".into()).unwrap();
    assert_eq!(merged.len(), 3);
    assert!(merged.has_column("uniprot"));
    assert!(merged.has_column("extracted_uniprot"));

    let stats = ctx.statistics.get("one_to_many_stats").unwrap();
    assert_eq!(stats["total_source_records"], serde_json::json!(3));
    assert_eq!(stats["total_mapped_records"], serde_json::json!(3));
    assert_eq!(stats["expansion_factor"], serde_json::json!(1.5));
}

/// Verifies a join-column map missing a dataset key fails with the
/// unspecified-column error naming that dataset.
#[test]
fn missing_join_column_entry_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    seed_cohorts(&mut ctx);

    let error = invoke(
        &MergeDatasets,
        serde_json::json!({
            "input_key": "arivale_normalized",
            "dataset2_key": "kg2c_normalized",
            "join_columns": {"uniprot": "extracted_uniprot"},
            "join_type": "inner",
            "output_key": "merged",
        }),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::JoinColumnUnspecified);
    assert!(error.message.contains("arivale_normalized"));
}

/// Verifies a named column absent from its dataset is rejected.
#[test]
fn absent_join_column_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    seed_cohorts(&mut ctx);

    let error = invoke(
        &MergeDatasets,
        serde_json::json!({
            "input_key": "arivale_normalized",
            "dataset2_key": "kg2c_normalized",
            "join_columns": {
                "arivale_normalized": "ensembl",
                "kg2c_normalized": "extracted_uniprot",
            },
            "join_type": "inner",
            "output_key": "merged",
        }),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::JoinColumnNotFound);
    assert!(error.message.contains("ensembl"));
}

/// Verifies left and outer joins keep unmatched rows with nulls.
#[test]
fn left_and_outer_join_keep_unmatched() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    seed_cohorts(&mut ctx);

    for (join_type, output_key, expected_rows) in
        [("left", "merged_left", 4), ("outer", "merged_outer", 4)]
    {
        invoke(
            &MergeDatasets,
            serde_json::json!({
                "input_key": "arivale_normalized",
                "dataset2_key": "kg2c_normalized",
                "join_columns": {
                    "arivale_normalized": "uniprot",
                    "kg2c_normalized": "extracted_uniprot",
                },
                "join_type": join_type,
                "output_key": output_key,
            }),
            &mut ctx,
        )
        .unwrap();
        let merged = ctx.dataset(&output_key.into()).unwrap();
        assert_eq!(merged.len(), expected_rows, "join type {join_type}");
    }
}

// ============================================================================
// SECTION: Conservation Laws
// ============================================================================

proptest! {
    /// Inner joins on unique keys yield at most `min(|A|, |B|)` rows;
    /// outer joins yield at least `max(|A|, |B|)` rows.
    #[test]
    fn join_conservation(
        left_keys in proptest::collection::btree_set("[A-Z][0-9]{2}", 1..10),
        right_keys in proptest::collection::btree_set("[A-Z][0-9]{2}", 1..10),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        let left_rows: Vec<(&str, &str)> =
            left_keys.iter().map(|key| (key.as_str(), "left")).collect();
        let right_rows: Vec<(&str, &str)> =
            right_keys.iter().map(|key| (key.as_str(), "right")).collect();
        ctx.insert_dataset("lhs".into(), pair_dataset("id", "side", &left_rows)).unwrap();
        ctx.insert_dataset("rhs".into(), pair_dataset("id", "side", &right_rows)).unwrap();

        for (join_type, output_key) in [("inner", "joined_inner"), ("outer", "joined_outer")] {
            invoke(
                &MergeDatasets,
                serde_json::json!({
                    "input_key": "lhs",
                    "dataset2_key": "rhs",
                    "join_columns": {"lhs": "id", "rhs": "id"},
                    "join_type": join_type,
                    "output_key": output_key,
                }),
                &mut ctx,
            )
            .unwrap();
        }
        let inner_len = ctx.dataset(&"joined_inner".into()).unwrap().len();
        let outer_len = ctx.dataset(&"joined_outer".into()).unwrap().len();
        prop_assert!(inner_len <= left_keys.len().min(right_keys.len()));
        prop_assert!(outer_len >= left_keys.len().max(right_keys.len()));
    }
}
