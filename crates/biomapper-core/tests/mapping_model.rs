// biomapper-core/tests/mapping_model.rs
// ============================================================================
// Module: Canonical Mapping Model Tests
// Description: Validation and codec tests for StandardMappingResult.
// Purpose: Pin the record invariants and the round-trip law.
// Dependencies: biomapper-core, proptest
// ============================================================================
//! ## Overview
//! Validates the canonical mapping record: invariant enforcement, columnar
//! encoding, nested JSON encoding, and `decode(encode(r)) == r`.

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

use biomapper_core::ErrorKind;
use biomapper_core::StandardMappingResult;
use biomapper_core::UNMAPPED_METHOD;
use biomapper_core::confidence;
use proptest::prelude::*;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies a well-formed mapped record validates.
#[test]
fn mapped_record_validates() {
    let record =
        StandardMappingResult::mapped("P12345", "UKBB_1", "direct_merge", confidence::DIRECT);
    assert!(record.validate().is_ok());
}

/// Verifies empty source identifiers are rejected.
#[test]
fn empty_source_rejected() {
    let record = StandardMappingResult::mapped("  ", "T", "direct_merge", 1.0);
    let error = record.validate().unwrap_err();
    assert_eq!(error.kind, ErrorKind::Validation);
}

/// Verifies out-of-range confidence is rejected.
#[test]
fn confidence_out_of_range_rejected() {
    let record = StandardMappingResult::mapped("P12345", "T", "direct_merge", 1.5);
    assert_eq!(record.validate().unwrap_err().kind, ErrorKind::Validation);
}

/// Verifies the unmapped sentinel shape is enforced.
#[test]
fn unmapped_sentinel_shape_enforced() {
    let mut record = StandardMappingResult::unmapped("P12345", 3);
    assert!(record.validate().is_ok());
    assert_eq!(record.match_method, UNMAPPED_METHOD);

    record.confidence = 0.5;
    assert_eq!(record.validate().unwrap_err().kind, ErrorKind::Validation);

    let mut wrong_method = StandardMappingResult::unmapped("P12345", 3);
    wrong_method.match_method = "direct_merge".to_string();
    assert_eq!(wrong_method.validate().unwrap_err().kind, ErrorKind::Validation);
}

/// Verifies stage zero is rejected.
#[test]
fn stage_zero_rejected() {
    let record = StandardMappingResult::mapped("P12345", "T", "direct_merge", 1.0).at_stage(0);
    assert_eq!(record.validate().unwrap_err().kind, ErrorKind::Validation);
}

// ============================================================================
// SECTION: Codecs
// ============================================================================

/// Verifies the columnar round trip for a fully populated record.
#[test]
fn columnar_round_trip() {
    let mut record = StandardMappingResult::mapped(
        "Q67890,Q11111",
        "UKBB_77",
        "composite_expansion",
        confidence::COMPOSITE,
    )
    .at_stage(2);
    record.details = Some("matched via first component".to_string());
    record.is_composite = true;
    record.parsed_value = Some("Q67890".to_string());

    let decoded = StandardMappingResult::from_record(&record.to_record()).unwrap();
    assert_eq!(decoded, record);
}

/// Verifies the columnar round trip for the unmapped sentinel.
#[test]
fn columnar_round_trip_unmapped() {
    let record = StandardMappingResult::unmapped("F77777", 4);
    let decoded = StandardMappingResult::from_record(&record.to_record()).unwrap();
    assert_eq!(decoded, record);
}

/// Verifies the nested JSON round trip.
#[test]
fn json_round_trip() {
    let record =
        StandardMappingResult::mapped("P12345", "T1", "historical_api", confidence::HISTORICAL)
            .at_stage(2);
    let json = serde_json::to_value(&record).unwrap();
    let decoded: StandardMappingResult = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, record);
}

// ============================================================================
// SECTION: Round-Trip Property
// ============================================================================

proptest! {
    /// `decode(encode(r)) == r` for arbitrary valid mapped records.
    #[test]
    fn round_trip_law(
        source in "[A-Z][A-Z0-9]{3,9}",
        target in "[A-Z][A-Z0-9]{3,9}",
        method in "[a-z_]{3,16}",
        hundredths in 0_u32..=100,
        stage in 1_u32..10,
        composite in any::<bool>(),
    ) {
        let mut record = StandardMappingResult::mapped(
            source,
            target,
            method,
            f64::from(hundredths) / 100.0,
        )
        .at_stage(stage);
        record.is_composite = composite;
        prop_assert!(record.validate().is_ok());
        let decoded = StandardMappingResult::from_record(&record.to_record()).unwrap();
        prop_assert_eq!(decoded, record);
    }
}
