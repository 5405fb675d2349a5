// biomapper-actions/tests/load_export.rs
// ============================================================================
// Module: Loader and Export Tests
// Description: Delimited file loading and output-root-confined export.
// Purpose: Pin the loader error surface and the export path contract.
// Dependencies: biomapper-actions, biomapper-core, tempfile
// ============================================================================
//! ## Overview
//! Validates delimited loading (column selection, whitespace stripping,
//! empty dropping, missing files and columns) and export (delimiter
//! inference, `output_files` recording, output-root confinement).

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

use biomapper_actions::ExportDataset;
use biomapper_actions::LoadDatasetIdentifiers;
use biomapper_core::CellValue;
use biomapper_core::ErrorKind;
use common::column_dataset;
use common::invoke;
use common::test_context;

/// Writes a TSV fixture and returns its path.
fn write_tsv(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("proteins.tsv");
    std::fs::write(
        &path,
        "uniprot\tgene\tpanel\nP12345\tIL6\tinflammation\n  Q11111  \tTNF\tcardio\n\tEMPTY\tx\n",
    )
    .unwrap();
    path
}

/// Verifies loading selects columns, trims, and drops empties.
#[test]
fn loads_tsv_with_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tsv(dir.path());
    let mut ctx = test_context(dir.path());

    let outcome = invoke(
        &LoadDatasetIdentifiers,
        serde_json::json!({
            "file_path": path.display().to_string(),
            "identifier_column": "uniprot",
            "additional_columns": ["gene"],
            "output_key": "proteins",
        }),
        &mut ctx,
    )
    .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.metrics.get("rows_loaded"), Some(&serde_json::json!(2)));
    assert_eq!(outcome.metrics.get("rows_dropped"), Some(&serde_json::json!(1)));

    let dataset = ctx.dataset(&"proteins".into()).unwrap();
    assert_eq!(dataset.columns(), ["uniprot".to_string(), "gene".to_string()]);
    let ids: Vec<String> = dataset.column_values("uniprot").map(CellValue::render).collect();
    assert_eq!(ids, vec!["P12345", "Q11111"]);
}

/// Verifies a missing file is a typed failure.
#[test]
fn missing_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    let error = invoke(
        &LoadDatasetIdentifiers,
        serde_json::json!({
            "file_path": dir.path().join("absent.tsv").display().to_string(),
            "identifier_column": "uniprot",
            "output_key": "proteins",
        }),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::FileNotFound);
}

/// Verifies a missing column is a typed failure naming the column.
#[test]
fn missing_column_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_tsv(dir.path());
    let mut ctx = test_context(dir.path());
    let error = invoke(
        &LoadDatasetIdentifiers,
        serde_json::json!({
            "file_path": path.display().to_string(),
            "identifier_column": "ensembl",
            "output_key": "proteins",
        }),
        &mut ctx,
    )
    .unwrap_err();
    assert_eq!(error.kind, ErrorKind::MissingColumn);
    assert!(error.message.contains("ensembl"));
}

/// Verifies export writes a TSV under the output root and records it.
#[test]
fn export_records_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.insert_dataset(
        "results".into(),
        column_dataset("uniprot", &[Some("P12345"), Some("Q11111")]),
    )
    .unwrap();

    let outcome = invoke(
        &ExportDataset,
        serde_json::json!({
            "input_key": "results",
            "file_path": "exports/results.tsv",
            "purpose": "mapping_results",
        }),
        &mut ctx,
    )
    .unwrap();
    assert!(outcome.success);

    let recorded = ctx.output_files.get("mapping_results").unwrap();
    assert!(recorded.starts_with(dir.path()));
    let contents = std::fs::read_to_string(recorded).unwrap();
    assert_eq!(contents, "uniprot\nP12345\nQ11111\n");
}

/// Verifies export round-trips through the loader.
#[test]
fn export_then_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.insert_dataset(
        "results".into(),
        column_dataset("uniprot", &[Some("P12345"), Some("Q11111"), Some("Q22222")]),
    )
    .unwrap();
    invoke(
        &ExportDataset,
        serde_json::json!({"input_key": "results", "file_path": "results.csv"}),
        &mut ctx,
    )
    .unwrap();
    let exported = ctx.output_files.get("results").unwrap().clone();

    invoke(
        &LoadDatasetIdentifiers,
        serde_json::json!({
            "file_path": exported.display().to_string(),
            "identifier_column": "uniprot",
            "output_key": "reloaded",
        }),
        &mut ctx,
    )
    .unwrap();
    assert_eq!(
        ctx.dataset(&"reloaded".into()).unwrap().len(),
        ctx.dataset(&"results".into()).unwrap().len()
    );
}

/// Verifies absolute and traversing export paths are rejected.
#[test]
fn export_paths_confined_to_output_root() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(dir.path());
    ctx.insert_dataset("results".into(), column_dataset("id", &[Some("A")])).unwrap();

    for bad_path in ["/etc/results.tsv", "../escape.tsv"] {
        let error = invoke(
            &ExportDataset,
            serde_json::json!({"input_key": "results", "file_path": bad_path}),
            &mut ctx,
        )
        .unwrap_err();
        assert_eq!(error.kind, ErrorKind::FileWriteFailed, "path {bad_path}");
    }
}
