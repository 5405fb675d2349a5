// biomapper-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Unit Tests
// Description: Parameter parsing and CLI structure tests.
// Purpose: Pin the NAME=VALUE override syntax and command wiring.
// Dependencies: crate
// ============================================================================
//! ## Overview
//! Unit tests for the CLI helpers; the end-to-end paths are covered by the
//! server crate's integration tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use clap::CommandFactory;

use super::Cli;
use super::parse_params;

/// Verifies JSON-typed and string parameter overrides.
#[test]
fn parse_params_types() {
    let parsed = parse_params(&[
        "threshold=0.8".to_string(),
        "batch=250".to_string(),
        "dataset=ukbb".to_string(),
        "flags=[\"a\",\"b\"]".to_string(),
    ])
    .unwrap();
    assert_eq!(parsed.get("threshold"), Some(&serde_json::json!(0.8)));
    assert_eq!(parsed.get("batch"), Some(&serde_json::json!(250)));
    assert_eq!(parsed.get("dataset"), Some(&serde_json::json!("ukbb")));
    assert_eq!(parsed.get("flags"), Some(&serde_json::json!(["a", "b"])));
}

/// Verifies overrides without an equals sign are rejected.
#[test]
fn parse_params_requires_equals() {
    assert!(parse_params(&["threshold".to_string()]).is_err());
}

/// Verifies the clap definition stays internally consistent.
#[test]
fn cli_definition_is_valid() {
    Cli::command().debug_assert();
}
