// biomapper-core/tests/cancellation.rs
// ============================================================================
// Module: Cancellation Tests
// Description: Cooperative cancellation and cleanup guarantees.
// Purpose: Pin that cancellation is observed at step boundaries and that
//          finally steps always run.
// Dependencies: biomapper-core
// ============================================================================
//! ## Overview
//! Validates the cancellation contract: the running step completes
//! naturally, subsequent steps do not start, the job ends `cancelled`, and
//! `finally_steps` still run to completion.

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
use biomapper_core::JobStatus;
use common::CancelDuringRunAction;
use common::WriteDatasetAction;
use common::step;
use common::strategy;
use common::test_context;
use common::test_executor;

/// Verifies cancellation mid-run still executes finally steps.
#[test]
fn cancellation_honors_finally() {
    let registry = Arc::new(ActionRegistry::new());
    let flag = CancellationFlag::new();
    registry
        .register(Arc::new(CancelDuringRunAction {
            type_name: "LONG_RUNNING".to_string(),
            flag: flag.clone(),
        }))
        .unwrap();
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-cancel");

    let mut plan = strategy(vec![
        step("long_running", "LONG_RUNNING", serde_json::json!({})),
        step("never_runs", "WRITE", serde_json::json!({"output_key": "unreached"})),
    ]);
    plan.finally_steps =
        vec![step("cleanup", "WRITE", serde_json::json!({"output_key": "cleanup_marker"}))];

    let outcome = executor.run(&plan, &mut ctx, &flag);

    assert_eq!(outcome.status, JobStatus::Cancelled);
    // The running step completed naturally before the flag was observed.
    assert!(ctx.step_outputs.contains_key("long_running"));
    assert!(!ctx.step_outputs.get("long_running").unwrap().failed);
    // The next step never started.
    assert!(!ctx.step_outputs.contains_key("never_runs"));
    assert!(!ctx.has_dataset(&"unreached".into()));
    // Cleanup still ran.
    assert!(ctx.has_dataset(&"cleanup_marker".into()));
    assert!(!ctx.step_outputs.get("cleanup").unwrap().failed);
}

/// Verifies a pre-set flag cancels before the first step.
#[test]
fn cancellation_before_first_step() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-precancel");
    let flag = CancellationFlag::new();
    flag.cancel();

    let plan = strategy(vec![step("first", "WRITE", serde_json::json!({"output_key": "a"}))]);
    let outcome = executor.run(&plan, &mut ctx, &flag);

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert!(!ctx.has_dataset(&"a".into()));
    assert_eq!(outcome.completed_steps, 0);
}
