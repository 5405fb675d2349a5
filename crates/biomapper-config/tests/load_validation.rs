// biomapper-config/tests/load_validation.rs
// ============================================================================
// Module: Strategy Loader Tests
// Description: Directory scanning, parsing, and validation behavior.
// Purpose: Pin fail-closed loading with path and location reporting.
// Dependencies: biomapper-config, biomapper-core, tempfile
// ============================================================================
//! ## Overview
//! Validates strategy loading: well-formed files load into the library,
//! unknown action types, duplicate names, forward dependencies, bad
//! expressions, and name mismatches all fail with descriptive errors.

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

use std::path::Path;
use std::sync::Arc;

use biomapper_config::LoaderError;
use biomapper_config::StrategyLibrary;
use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::ActionRegistry;
use biomapper_core::ActionType;
use biomapper_core::EngineError;
use biomapper_core::ExecutionContext;
use biomapper_core::ParamMap;
use biomapper_core::ParamsSchema;
use biomapper_core::StrategyName;

/// No-op action registered for loader checks.
struct NullAction {
    /// Registered action type.
    type_name: String,
}

impl Action for NullAction {
    fn action_type(&self) -> ActionType {
        ActionType::new(self.type_name.clone())
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::default()
    }

    fn execute(
        &self,
        _params: &ParamMap,
        _ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        Ok(ActionOutcome::ok("noop"))
    }
}

/// Builds a registry knowing the standard loader-test actions.
fn registry() -> Arc<ActionRegistry> {
    let registry = Arc::new(ActionRegistry::new());
    for name in ["LOAD_DATASET_IDENTIFIERS", "MERGE_DATASETS", "EXPORT_DATASET"] {
        registry
            .register(Arc::new(NullAction { type_name: name.to_string() }))
            .unwrap();
    }
    registry
}

/// Writes a strategy file into the directory.
fn write_strategy(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(format!("{name}.yaml")), content).unwrap();
}

/// A minimal valid strategy body.
fn valid_strategy(name: &str) -> String {
    format!(
        r"name: {name}
description: harmonize one cohort
parameters:
  input_file: /data/proteins.tsv
steps:
  - name: load
    action:
      type: LOAD_DATASET_IDENTIFIERS
      params:
        file_path: '${{parameters.input_file}}'
        identifier_column: uniprot
        output_key: proteins
  - name: export
    action:
      type: EXPORT_DATASET
      params:
        input_key: proteins
        file_path: out.tsv
"
    )
}

/// Verifies a well-formed directory loads into the library.
#[test]
fn loads_valid_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_strategy(dir.path(), "protein_harmonization", &valid_strategy("protein_harmonization"));
    write_strategy(dir.path(), "metabolite_harmonization", &valid_strategy("metabolite_harmonization"));

    let library = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap();
    assert_eq!(library.len(), 2);
    let listed = library.list();
    assert_eq!(listed[0].name, "metabolite_harmonization");
    assert_eq!(listed[1].name, "protein_harmonization");
    assert!(library.get(&StrategyName::new("protein_harmonization")).is_some());
}

/// Verifies unknown action types are rejected with the file path.
#[test]
fn unknown_action_type_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = valid_strategy("bad_action").replace("EXPORT_DATASET", "RENDER_CHART");
    write_strategy(dir.path(), "bad_action", &body);

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    let LoaderError::Validation { path, message } = error else {
        panic!("expected validation error, got {error}");
    };
    assert!(path.ends_with("bad_action.yaml"));
    assert!(message.contains("RENDER_CHART"));
}

/// Verifies parse errors carry a location.
#[test]
fn parse_error_carries_location() {
    let dir = tempfile::tempdir().unwrap();
    write_strategy(dir.path(), "broken", "name: broken\nsteps: [\n");

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    assert!(matches!(error, LoaderError::Parse { .. }));
}

/// Verifies a file stem mismatching its declared name is rejected.
#[test]
fn name_mismatch_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_strategy(dir.path(), "file_name", &valid_strategy("other_name"));

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    assert!(matches!(error, LoaderError::NameMismatch { .. }));
}

/// Verifies malformed expressions fail at load time, not run time.
#[test]
fn bad_expression_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = valid_strategy("bad_expr").replace("${parameters.input_file}", "${parameters.}");
    write_strategy(dir.path(), "bad_expr", &body);

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    let LoaderError::Validation { message, .. } = error else {
        panic!("expected validation error, got {error}");
    };
    assert!(message.contains("invalid expression"));
}

/// Verifies references to undeclared steps fail at load time.
#[test]
fn undeclared_step_reference_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = valid_strategy("bad_ref").replace(
        "file_path: out.tsv",
        "file_path: '${steps.missing.outputs.path}'",
    );
    write_strategy(dir.path(), "bad_ref", &body);

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    let LoaderError::Validation { message, .. } = error else {
        panic!("expected validation error, got {error}");
    };
    assert!(message.contains("missing"));
}

/// Verifies sequential-mode forward dependencies are rejected.
#[test]
fn forward_dependency_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = r"name: forward_dep
steps:
  - name: early
    depends_on: [late]
    action:
      type: LOAD_DATASET_IDENTIFIERS
      params: {}
  - name: late
    action:
      type: EXPORT_DATASET
      params: {}
";
    write_strategy(dir.path(), "forward_dep", body);

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    let LoaderError::Validation { message, .. } = error else {
        panic!("expected validation error, got {error}");
    };
    assert!(message.contains("later step"));
}

/// Verifies DAG dependency cycles are rejected.
#[test]
fn dag_cycle_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let body = r"name: cyclic
execution:
  mode: dag
steps:
  - name: a
    depends_on: [b]
    action:
      type: LOAD_DATASET_IDENTIFIERS
      params: {}
  - name: b
    depends_on: [a]
    action:
      type: EXPORT_DATASET
      params: {}
";
    write_strategy(dir.path(), "cyclic", body);

    let error = StrategyLibrary::load_dir(dir.path(), &registry()).unwrap_err();
    let LoaderError::Validation { message, .. } = error else {
        panic!("expected validation error, got {error}");
    };
    assert!(message.contains("cycle"));
}
