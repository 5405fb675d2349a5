// biomapper-actions/src/overlap.rs
// ============================================================================
// Module: Set Overlap Action
// Description: N-way identifier set overlap with Jaccard indexes.
// Purpose: Quantify cohort coverage before and after harmonization.
// Dependencies: biomapper-core
// ============================================================================

//! ## Overview
//! `CALCULATE_SET_OVERLAP` draws one identifier set per configured
//! dataset/column pair (N >= 2), computes per-set sizes and unique counts,
//! the full intersection, and pairwise overlaps with Jaccard indexes. The
//! Jaccard index of two empty sets is defined as 0. Optionally the
//! intersection and per-set unique identifiers persist back into the
//! context as single-column datasets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::ActionType;
use biomapper_core::CellValue;
use biomapper_core::Dataset;
use biomapper_core::EngineError;
use biomapper_core::ErrorKind;
use biomapper_core::ExecutionContext;
use biomapper_core::FieldSpec;
use biomapper_core::FieldType;
use biomapper_core::ParamMap;
use biomapper_core::ParamsSchema;
use biomapper_core::Record;

use crate::params::bool_or;
use crate::params::require_str;
use crate::params::str_map;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Action type name of the set overlap analyzer.
pub const CALCULATE_SET_OVERLAP: &str = "CALCULATE_SET_OVERLAP";

/// N-way identifier set overlap.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalculateSetOverlap;

impl Action for CalculateSetOverlap {
    fn action_type(&self) -> ActionType {
        ActionType::new(CALCULATE_SET_OVERLAP)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("inputs", FieldType::Map),
            FieldSpec::optional(
                "output_key",
                FieldType::String,
                Some(serde_json::json!("set_overlap")),
            ),
            FieldSpec::optional(
                "case_sensitive",
                FieldType::Boolean,
                Some(serde_json::json!(true)),
            ),
            FieldSpec::optional(
                "normalize_ids",
                FieldType::Boolean,
                Some(serde_json::json!(false)),
            ),
            FieldSpec::optional(
                "persist_sets",
                FieldType::Boolean,
                Some(serde_json::json!(false)),
            ),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string(), "statistics".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let inputs = str_map(params, "inputs");
        let output_key = require_str(params, "output_key")?;
        let case_sensitive = bool_or(params, "case_sensitive", true);
        let normalize_ids = bool_or(params, "normalize_ids", false);
        let persist_sets = bool_or(params, "persist_sets", false);
        if inputs.len() < 2 {
            return Err(EngineError::new(
                ErrorKind::ParamValidation,
                "inputs must name at least two dataset/column pairs",
            ));
        }

        let mut sets: Vec<(String, BTreeSet<String>)> = Vec::with_capacity(inputs.len());
        for (dataset_key, column) in &inputs {
            let dataset = ctx.dataset(&dataset_key.as_str().into())?;
            dataset.require_column(column)?;
            let mut set = BTreeSet::new();
            for cell in dataset.column_values(column) {
                let rendered = cell.render();
                let id = normalize(&rendered, case_sensitive, normalize_ids);
                if !id.is_empty() {
                    set.insert(id);
                }
            }
            sets.push((dataset_key.clone(), set));
        }

        let intersection = full_intersection(&sets);
        let union = full_union(&sets);

        let mut per_set = BTreeMap::new();
        let mut unique_sets: Vec<(String, BTreeSet<String>)> = Vec::new();
        for (index, (name, set)) in sets.iter().enumerate() {
            let mut unique = set.clone();
            for (other_index, (_, other)) in sets.iter().enumerate() {
                if other_index != index {
                    unique = unique.difference(other).cloned().collect();
                }
            }
            per_set.insert(
                name.clone(),
                serde_json::json!({
                    "size": set.len(),
                    "unique_to_set": unique.len(),
                }),
            );
            unique_sets.push((name.clone(), unique));
        }

        let mut pairwise = Vec::new();
        for (index, (name_a, set_a)) in sets.iter().enumerate() {
            for (name_b, set_b) in sets.iter().skip(index + 1) {
                let overlap = set_a.intersection(set_b).count();
                let union_size = set_a.union(set_b).count();
                pairwise.push(serde_json::json!({
                    "a": name_a,
                    "b": name_b,
                    "intersection": overlap,
                    "union": union_size,
                    "jaccard": jaccard(overlap, union_size),
                }));
            }
        }

        let summary = serde_json::json!({
            "sets": per_set,
            "intersection_size": intersection.len(),
            "union_size": union.len(),
            "pairwise": pairwise,
        });
        ctx.statistics.insert(output_key.clone(), summary);

        if persist_sets {
            ctx.insert_dataset(
                format!("{output_key}_intersection").as_str().into(),
                identifier_dataset(&intersection),
            )?;
            for (name, unique) in &unique_sets {
                ctx.insert_dataset(
                    format!("{output_key}_unique_{name}").as_str().into(),
                    identifier_dataset(unique),
                )?;
            }
        }

        Ok(ActionOutcome::ok(format!(
            "overlap across {} sets: intersection {}, union {}",
            sets.len(),
            intersection.len(),
            union.len()
        ))
        .with_metric("sets", serde_json::json!(sets.len()))
        .with_metric("intersection_size", serde_json::json!(intersection.len()))
        .with_metric("union_size", serde_json::json!(union.len())))
    }
}

// ============================================================================
// SECTION: Set Algebra
// ============================================================================

/// Computes the Jaccard index, defining 0/0 as 0.
#[must_use]
pub fn jaccard(intersection: usize, union: usize) -> f64 {
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss, reason = "set sizes are small")]
    {
        intersection as f64 / union as f64
    }
}

/// Normalizes one identifier per the configured flags.
fn normalize(value: &str, case_sensitive: bool, normalize_ids: bool) -> String {
    let trimmed = value.trim();
    if normalize_ids || !case_sensitive {
        trimmed.to_ascii_uppercase()
    } else {
        trimmed.to_string()
    }
}

/// Intersects all sets.
fn full_intersection(sets: &[(String, BTreeSet<String>)]) -> BTreeSet<String> {
    let Some((_, first)) = sets.first() else {
        return BTreeSet::new();
    };
    let mut intersection = first.clone();
    for (_, set) in sets.iter().skip(1) {
        intersection = intersection.intersection(set).cloned().collect();
    }
    intersection
}

/// Unions all sets.
fn full_union(sets: &[(String, BTreeSet<String>)]) -> BTreeSet<String> {
    let mut union = BTreeSet::new();
    for (_, set) in sets {
        union.extend(set.iter().cloned());
    }
    union
}

/// Builds a single-column identifier dataset from a set.
fn identifier_dataset(ids: &BTreeSet<String>) -> Dataset {
    let mut dataset = Dataset::new(vec!["id".to_string()]);
    for id in ids {
        let mut row = Record::new();
        row.insert("id".to_string(), CellValue::text(id.clone()));
        let _ = dataset.push_row(row);
    }
    dataset
}
