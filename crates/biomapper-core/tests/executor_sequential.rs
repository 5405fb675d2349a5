// biomapper-core/tests/executor_sequential.rs
// ============================================================================
// Module: Sequential Executor Tests
// Description: Program order, conditions, retries, and error locality.
// Purpose: Pin the sequential execution contract of the strategy executor.
// Dependencies: biomapper-core
// ============================================================================
//! ## Overview
//! Validates strict program order, condition gating against earlier step
//! metrics, the retry policy with fresh substitution (conditional + retry
//! scenario), and error locality under `on_error: continue`.

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
use std::sync::Mutex;

use biomapper_core::ActionRegistry;
use biomapper_core::CancellationFlag;
use biomapper_core::ErrorKind;
use biomapper_core::JobStatus;
use biomapper_core::strategy::BackoffKind;
use biomapper_core::strategy::ErrorActionKind;
use biomapper_core::strategy::ErrorPolicy;
use common::FailingAction;
use common::FlakyAction;
use common::MetricAction;
use common::WriteDatasetAction;
use common::step;
use common::strategy;
use common::test_context;
use common::test_executor;

// ============================================================================
// SECTION: Program Order
// ============================================================================

/// Verifies later steps observe the writes of earlier steps.
#[test]
fn later_steps_observe_earlier_writes() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-order");
    let plan = strategy(vec![
        step("first", "WRITE", serde_json::json!({"output_key": "a"})),
        step("second", "WRITE", serde_json::json!({"output_key": "b"})),
    ]);
    let outcome = executor.run(&plan, &mut ctx, &CancellationFlag::new());
    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(outcome.completed_steps, 2);
    assert!(ctx.has_dataset(&"a".into()));
    assert!(ctx.has_dataset(&"b".into()));
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Verifies a condition on an earlier step's metric gates execution.
#[test]
fn condition_gates_on_step_metrics() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(MetricAction {
            type_name: "BASELINE".to_string(),
            metric: "match_rate".to_string(),
            value: serde_json::json!(0.4),
        }))
        .unwrap();
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-condition");

    let mut fires = step("improve", "WRITE", serde_json::json!({"output_key": "improved"}));
    fires.condition = Some("${steps.baseline.metrics.match_rate} < 0.5".to_string());
    let mut skipped = step("celebrate", "WRITE", serde_json::json!({"output_key": "skipped"}));
    skipped.condition = Some("${steps.baseline.metrics.match_rate} >= 0.5".to_string());

    let plan = strategy(vec![
        step("baseline", "BASELINE", serde_json::json!({})),
        fires,
        skipped,
    ]);
    let outcome = executor.run(&plan, &mut ctx, &CancellationFlag::new());
    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert!(ctx.has_dataset(&"improved".into()));
    assert!(!ctx.has_dataset(&"skipped".into()));
    assert!(ctx.step_outputs.get("celebrate").unwrap().skipped);
}

// ============================================================================
// SECTION: Conditional + Retry
// ============================================================================

/// Verifies the conditional + retry scenario: a gated step fails twice
/// with a retriable resolver timeout, then succeeds on the third attempt.
#[test]
fn conditional_step_retries_to_success() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(MetricAction {
            type_name: "BASELINE".to_string(),
            metric: "match_rate".to_string(),
            value: serde_json::json!(0.4),
        }))
        .unwrap();
    let invocations = Arc::new(Mutex::new(0));
    registry
        .register(Arc::new(FlakyAction {
            type_name: "FLAKY".to_string(),
            failures_before_success: 2,
            invocations: Arc::clone(&invocations),
        }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-retry");

    let mut gated = step("enrich", "FLAKY", serde_json::json!({}));
    gated.condition = Some("${steps.baseline.metrics.match_rate} < 0.5".to_string());
    gated.on_error = Some(ErrorPolicy {
        action: ErrorActionKind::Retry,
        max_attempts: Some(3),
        backoff: Some(BackoffKind::Exponential),
        delay_ms: Some(1),
        fallback: None,
    });

    let plan = strategy(vec![step("baseline", "BASELINE", serde_json::json!({})), gated]);
    let outcome = executor.run(&plan, &mut ctx, &CancellationFlag::new());

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(*invocations.lock().unwrap(), 3);
    let output = ctx.step_outputs.get("enrich").unwrap();
    assert_eq!(output.attempts, 3);
    assert!(!output.failed);
    // Metrics reflect the third (successful) attempt.
    assert_eq!(output.metrics.get("attempt"), Some(&serde_json::json!(3)));
}

/// Verifies retry exhaustion fails the job when no fallback is declared.
#[test]
fn retry_exhaustion_fails_job() {
    let registry = Arc::new(ActionRegistry::new());
    let invocations = Arc::new(Mutex::new(0));
    registry
        .register(Arc::new(FlakyAction {
            type_name: "FLAKY".to_string(),
            failures_before_success: 10,
            invocations: Arc::clone(&invocations),
        }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-exhaust");

    let mut flaky = step("enrich", "FLAKY", serde_json::json!({}));
    flaky.on_error = Some(ErrorPolicy {
        action: ErrorActionKind::Retry,
        max_attempts: Some(2),
        backoff: Some(BackoffKind::Linear),
        delay_ms: Some(1),
        fallback: None,
    });
    let plan = strategy(vec![flaky]);
    let outcome = executor.run(&plan, &mut ctx, &CancellationFlag::new());

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.failed_step.as_ref().map(biomapper_core::StepName::as_str), Some("enrich"));
    assert_eq!(outcome.error.unwrap().kind, ErrorKind::ResolverTimeout);
    assert_eq!(*invocations.lock().unwrap(), 2);
}

// ============================================================================
// SECTION: Error Locality
// ============================================================================

/// Verifies a failed step under `continue` leaves no partial writes.
#[test]
fn continue_restores_pre_step_snapshot() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(FailingAction {
            type_name: "POLLUTE_AND_FAIL".to_string(),
            pollute_key: Some("partial".to_string()),
        }))
        .unwrap();
    registry
        .register(Arc::new(WriteDatasetAction { type_name: "WRITE".to_string() }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-locality");

    let mut failing = step("dirty", "POLLUTE_AND_FAIL", serde_json::json!({}));
    failing.on_error = Some(ErrorPolicy {
        action: ErrorActionKind::Continue,
        max_attempts: None,
        backoff: None,
        delay_ms: None,
        fallback: None,
    });
    let plan = strategy(vec![
        failing,
        step("clean", "WRITE", serde_json::json!({"output_key": "after"})),
    ]);
    let outcome = executor.run(&plan, &mut ctx, &CancellationFlag::new());

    assert_eq!(outcome.status, JobStatus::Succeeded);
    // The polluting writes were rolled back; only the failure record remains.
    assert!(!ctx.has_dataset(&"partial".into()));
    assert!(!ctx.variables.contains_key("polluted"));
    assert!(ctx.step_outputs.get("dirty").unwrap().failed);
    assert!(ctx.has_dataset(&"after".into()));
}

// ============================================================================
// SECTION: Variables
// ============================================================================

/// Verifies `set_variables` evaluates against the post-step context.
#[test]
fn set_variables_after_step() {
    let registry = Arc::new(ActionRegistry::new());
    registry
        .register(Arc::new(MetricAction {
            type_name: "BASELINE".to_string(),
            metric: "match_rate".to_string(),
            value: serde_json::json!(0.4),
        }))
        .unwrap();
    let executor = test_executor(Arc::clone(&registry));
    let mut ctx = test_context("job-vars");

    let mut baseline = step("baseline", "BASELINE", serde_json::json!({}));
    baseline.set_variables.insert(
        "needs_enrichment".to_string(),
        serde_json::json!("${steps.baseline.metrics.match_rate < 0.5}"),
    );
    let plan = strategy(vec![baseline]);
    let outcome = executor.run(&plan, &mut ctx, &CancellationFlag::new());

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(ctx.variables.get("needs_enrichment"), Some(&serde_json::json!(true)));
}
