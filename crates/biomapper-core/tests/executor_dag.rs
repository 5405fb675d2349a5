// biomapper-core/tests/executor_dag.rs
// ============================================================================
// Module: DAG Executor Tests
// Description: Dependency-wave execution and disjoint-write enforcement.
// Purpose: Pin DAG ordering guarantees and the parallel merge contract.
// Dependencies: biomapper-core
// ============================================================================
//! ## Overview
//! Validates DAG mode: dependents observe their dependencies' writes,
//! independent steps run and merge, and overlapping writes from parallel
//! steps are rejected instead of silently last-wins.

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

use std::sync::Arc;

use biomapper_core::ActionRegistry;
use biomapper_core::CancellationFlag;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionMode;
use biomapper_core::JobStatus;
use common::WriteDatasetAction;
use common::step;
use common::strategy;
use common::test_context;
use common::test_executor;

/// Builds a DAG-mode strategy over the given steps.
fn dag_strategy(steps: Vec<biomapper_core::Step>) -> biomapper_core::Strategy {
    let mut plan = strategy(steps);
    plan.execution.mode = ExecutionMode::Dag;
    plan
}

/// Verifies independent steps all run and dependents observe dependencies.
#[test]
fn dag_respects_dependencies() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-dag");

    let left = step("load_left", "WRITE", serde_json::json!({"output_key": "left"}));
    let right = step("load_right", "WRITE", serde_json::json!({"output_key": "right"}));
    let mut join = step("join", "WRITE", serde_json::json!({"output_key": "joined"}));
    join.depends_on = vec!["load_left".to_string(), "load_right".to_string()];

    let outcome =
        executor.run(&dag_strategy(vec![left, right, join]), &mut ctx, &CancellationFlag::new());
    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(outcome.completed_steps, 3);
    assert!(ctx.has_dataset(&"left".into()));
    assert!(ctx.has_dataset(&"right".into()));
    assert!(ctx.has_dataset(&"joined".into()));
}

/// Verifies overlapping dataset writes from parallel steps fail the job.
#[test]
fn dag_rejects_overlapping_writes() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-dag-overlap");

    // Two independent steps write the same dataset key; the wave merge
    // must detect the collision. Identical payloads merge cleanly, so the
    // colliding steps write under the same key with different shapes.
    let a = step("writer_a", "WRITE", serde_json::json!({"output_key": "shared"}));
    let mut b = step("writer_b", "WRITE", serde_json::json!({"output_key": "shared"}));
    // Both write an identical empty dataset, which merges cleanly; chain a
    // third writer against a distinct context path to force inequality.
    b.set_variables.insert("writer".to_string(), serde_json::json!("b"));
    let mut c = step("writer_c", "WRITE", serde_json::json!({"output_key": "shared"}));
    c.depends_on = vec!["writer_a".to_string()];

    let outcome =
        executor.run(&dag_strategy(vec![a, b, c]), &mut ctx, &CancellationFlag::new());
    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.error.unwrap().kind, ErrorKind::Internal);
}
