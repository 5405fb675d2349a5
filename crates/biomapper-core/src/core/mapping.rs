// biomapper-core/src/core/mapping.rs
// ============================================================================
// Module: Biomapper Canonical Mapping Result
// Description: The per-identifier mapping record shared by every mapper.
// Purpose: Define, validate, and encode the canonical mapping result model.
// Dependencies: crate::core::{dataset, error, value}, serde
// ============================================================================

//! ## Overview
//! Every mapping action emits [`StandardMappingResult`] records. The model
//! validates its invariants at the boundary: non-empty source, confidence
//! inside `[0, 1]`, and the unmapped sentinel shape (`target_id = None`
//! implies the `unmapped` method and zero confidence). Records encode both
//! to a columnar dataset row (for delimited export) and to nested JSON (for
//! API responses), with `decode(encode(r)) == r` for every valid record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::dataset::Record;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::value::CellValue;

// ============================================================================
// SECTION: Confidence Framework
// ============================================================================

/// Confidence scores for the standard match methods.
pub mod confidence {
    /// Direct identity match.
    pub const DIRECT: f64 = 1.0;
    /// Match derived from a composite component.
    pub const COMPOSITE: f64 = 0.95;
    /// Match through a historical identifier resolution.
    pub const HISTORICAL: f64 = 0.90;
    /// Match through a gene-symbol bridge.
    pub const GENE_SYMBOL_BRIDGE: f64 = 0.85;
    /// Upper bound for similarity-based matches.
    pub const SIMILARITY_HIGH: f64 = 0.80;
    /// Lower bound for similarity-based matches.
    pub const SIMILARITY_LOW: f64 = 0.70;
}

/// Match method recorded for identifiers no stage matched.
pub const UNMAPPED_METHOD: &str = "unmapped";

/// Column order of the columnar encoding.
pub const RESULT_COLUMNS: &[&str] = &[
    "source_id",
    "target_id",
    "match_method",
    "confidence",
    "stage",
    "details",
    "is_composite",
    "parsed_value",
];

// ============================================================================
// SECTION: Composite Bookkeeping
// ============================================================================

/// Bookkeeping column: the unsplit source value of an expanded row.
pub const ORIGINAL_COMPOSITE_COLUMN: &str = "_original_composite";
/// Bookkeeping column: the number of components the source split into.
pub const EXPANSION_COUNT_COLUMN: &str = "_expansion_count";
/// Bookkeeping column: the source row position before expansion.
pub const ORIGINAL_INDEX_COLUMN: &str = "_original_index";
/// Bookkeeping column: true on rows skipped for empty values.
pub const SKIPPED_COLUMN: &str = "_skipped";

/// Returns the original composite value when the row passed through
/// composite expansion.
///
/// Every expanded row is composite for provenance purposes, single-component
/// sources included; mappers use this to stamp `is_composite` and
/// `parsed_value` on the records they emit. Rows skipped for empty values
/// carry an empty original and are not composite.
#[must_use]
pub fn composite_provenance(row: &Record) -> Option<String> {
    let original = row.get(ORIGINAL_COMPOSITE_COLUMN)?.as_text()?;
    if original.trim().is_empty() {
        return None;
    }
    Some(original.to_string())
}

// ============================================================================
// SECTION: Canonical Record
// ============================================================================

/// Canonical per-identifier mapping record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMappingResult {
    /// Source identifier (non-empty).
    pub source_id: String,
    /// Target identifier, or `None` when the identifier remained unmapped.
    pub target_id: Option<String>,
    /// Match method label, e.g. `direct_merge` or `historical_api`.
    pub match_method: String,
    /// Match confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Progressive stage that produced the record (1-based).
    pub stage: u32,
    /// Free-form provenance details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// True when the source value passed through composite expansion.
    #[serde(default)]
    pub is_composite: bool,
    /// Composite component that produced the match, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_value: Option<String>,
}

impl StandardMappingResult {
    /// Creates a mapped record.
    #[must_use]
    pub fn mapped(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        match_method: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: Some(target_id.into()),
            match_method: match_method.into(),
            confidence,
            stage: 1,
            details: None,
            is_composite: false,
            parsed_value: None,
        }
    }

    /// Creates the unmapped sentinel record for a source identifier.
    #[must_use]
    pub fn unmapped(source_id: impl Into<String>, stage: u32) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: None,
            match_method: UNMAPPED_METHOD.to_string(),
            confidence: 0.0,
            stage,
            details: None,
            is_composite: false,
            parsed_value: None,
        }
    }

    /// Returns the record with the given stage number.
    #[must_use]
    pub const fn at_stage(mut self, stage: u32) -> Self {
        self.stage = stage;
        self
    }

    /// Returns true when the record carries a target identifier.
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        self.target_id.is_some()
    }

    /// Validates the record invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::Validation`] error when any invariant is
    /// violated.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source_id.trim().is_empty() {
            return Err(validation_error("source_id must be non-empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(validation_error(format!(
                "confidence {} outside [0.0, 1.0]",
                self.confidence
            )));
        }
        if self.stage == 0 {
            return Err(validation_error("stage must be >= 1"));
        }
        if self.target_id.is_none() {
            if self.match_method != UNMAPPED_METHOD {
                return Err(validation_error(format!(
                    "unmapped record must use method {UNMAPPED_METHOD:?}, found {:?}",
                    self.match_method
                )));
            }
            if self.confidence != 0.0 {
                return Err(validation_error("unmapped record must carry confidence 0.0"));
            }
        } else if self.match_method.trim().is_empty() {
            return Err(validation_error("match_method must be non-empty"));
        }
        Ok(())
    }

    /// Encodes the record into a columnar dataset row.
    #[must_use]
    pub fn to_record(&self) -> Record {
        let mut row = Record::new();
        row.insert("source_id".to_string(), CellValue::text(&self.source_id));
        row.insert(
            "target_id".to_string(),
            self.target_id.as_deref().map_or(CellValue::Null, CellValue::text),
        );
        row.insert("match_method".to_string(), CellValue::text(&self.match_method));
        row.insert("confidence".to_string(), CellValue::Number(self.confidence));
        row.insert("stage".to_string(), CellValue::Number(f64::from(self.stage)));
        row.insert(
            "details".to_string(),
            self.details.as_deref().map_or(CellValue::Null, CellValue::text),
        );
        row.insert(
            "is_composite".to_string(),
            CellValue::text(if self.is_composite { "true" } else { "false" }),
        );
        row.insert(
            "parsed_value".to_string(),
            self.parsed_value.as_deref().map_or(CellValue::Null, CellValue::text),
        );
        row
    }

    /// Decodes a record from a columnar dataset row.
    ///
    /// # Errors
    ///
    /// Returns a [`ErrorKind::Validation`] error when the row is not a
    /// valid encoding or the decoded record violates invariants.
    pub fn from_record(row: &Record) -> Result<Self, EngineError> {
        let result = Self {
            source_id: require_text(row, "source_id")?,
            target_id: optional_text(row, "target_id"),
            match_method: require_text(row, "match_method")?,
            confidence: require_number(row, "confidence")?,
            stage: decode_stage(require_number(row, "stage")?)?,
            details: optional_text(row, "details"),
            is_composite: require_text(row, "is_composite")? == "true",
            parsed_value: optional_text(row, "parsed_value"),
        };
        result.validate()?;
        Ok(result)
    }
}

// ============================================================================
// SECTION: Decoding Helpers
// ============================================================================

/// Builds a validation error.
fn validation_error(message: impl Into<String>) -> EngineError {
    EngineError::new(ErrorKind::Validation, message)
}

/// Reads a required text cell.
fn require_text(row: &Record, column: &str) -> Result<String, EngineError> {
    row.get(column)
        .and_then(|cell| cell.as_text())
        .map(ToString::to_string)
        .ok_or_else(|| validation_error(format!("missing or non-text column: {column}")))
}

/// Reads an optional text cell, treating null as absent.
fn optional_text(row: &Record, column: &str) -> Option<String> {
    row.get(column).and_then(|cell| cell.as_text()).map(ToString::to_string)
}

/// Reads a required numeric cell.
fn require_number(row: &Record, column: &str) -> Result<f64, EngineError> {
    row.get(column)
        .and_then(CellValue::as_number)
        .ok_or_else(|| validation_error(format!("missing or non-numeric column: {column}")))
}

/// Decodes the stage number from its columnar form.
fn decode_stage(value: f64) -> Result<u32, EngineError> {
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(validation_error(format!("invalid stage encoding: {value}")));
    }
    // Bounds checked above; the cast cannot truncate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "range checked")]
    Ok(value as u32)
}
