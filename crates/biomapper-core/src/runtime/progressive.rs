// biomapper-core/src/runtime/progressive.rs
// ============================================================================
// Module: Biomapper Progressive Wrapper
// Description: Stage harness turning any mapper into a progressive stage.
// Purpose: Filter to unmatched inputs, partition results, and track stats.
// Dependencies: crate::{core, interfaces, registry, schema}
// ============================================================================

//! ## Overview
//! The progressive wrapper runs a configured inner mapper against only the
//! identifiers no prior stage matched. Matched results are stamped with the
//! wrapper's stage number (first stage to match wins; later stages never
//! observe a matched identifier) and written to a per-stage results
//! dataset. `PROGRESSIVE_FINALIZE` merges the stage datasets, emits the
//! terminal `unmapped` sentinel records, and seals the aggregate
//! statistics. Stages run strictly in declaration order; the executor keeps
//! them sequential even inside a DAG strategy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::context::ExecutionContext;
use crate::core::dataset::Dataset;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::identifiers::ActionType;
use crate::core::identifiers::DatasetKey;
use crate::core::mapping::RESULT_COLUMNS;
use crate::core::mapping::StandardMappingResult;
use crate::core::progressive::StageStats;
use crate::core::progressive::rate;
use crate::core::time::Timestamp;
use crate::interfaces::Action;
use crate::interfaces::ActionOutcome;
use crate::interfaces::ParamMap;
use crate::registry::ActionRegistry;
use crate::schema::FieldSpec;
use crate::schema::FieldType;
use crate::schema::ParamsSchema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Action type of the progressive stage wrapper.
pub const PROGRESSIVE_STAGE: &str = "PROGRESSIVE_STAGE";

/// Action type of the progressive finalizer.
pub const PROGRESSIVE_FINALIZE: &str = "PROGRESSIVE_FINALIZE";

/// Default results dataset key.
const DEFAULT_RESULTS_KEY: &str = "mapping_results";

/// Returns the per-stage results dataset key.
fn stage_results_key(results_key: &str, stage_number: u32) -> DatasetKey {
    DatasetKey::new(format!("{results_key}_stage{stage_number}"))
}

/// Returns the per-stage pool dataset key.
fn stage_pool_key(input_key: &str, stage_number: u32) -> DatasetKey {
    DatasetKey::new(format!("{input_key}__stage{stage_number}_pool"))
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Collects the distinct non-empty identifiers of a dataset column.
fn distinct_identifiers(
    dataset: &Dataset,
    identifier_column: &str,
) -> Result<Vec<String>, EngineError> {
    dataset.require_column(identifier_column)?;
    let mut seen = BTreeSet::new();
    let mut ordered = Vec::new();
    for cell in dataset.column_values(identifier_column) {
        let Some(text) = cell.as_text() else {
            continue;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            ordered.push(trimmed.to_string());
        }
    }
    Ok(ordered)
}

/// Collects the identifiers matched by all recorded stages.
fn matched_identifiers(
    ctx: &ExecutionContext,
    results_key: &str,
) -> Result<BTreeSet<String>, EngineError> {
    let mut matched = BTreeSet::new();
    for stage_number in ctx.progressive.stages.keys() {
        let key = stage_results_key(results_key, *stage_number);
        let dataset = ctx.dataset(&key)?;
        for row in dataset.rows() {
            let record = StandardMappingResult::from_record(row)?;
            if record.is_mapped() {
                matched.insert(record.source_id);
            }
        }
    }
    Ok(matched)
}

/// Builds a columnar dataset from mapping records.
fn results_dataset(records: &[StandardMappingResult]) -> Result<Dataset, EngineError> {
    let columns = RESULT_COLUMNS.iter().map(ToString::to_string).collect();
    let rows = records.iter().map(StandardMappingResult::to_record).collect();
    Dataset::from_rows(columns, rows)
}

// ============================================================================
// SECTION: Progressive Stage Action
// ============================================================================

/// Stage harness wrapping a registered mapper action.
pub struct ProgressiveStage {
    /// Registry the inner action resolves through.
    registry: Arc<ActionRegistry>,
}

impl ProgressiveStage {
    /// Creates the stage wrapper over a registry.
    #[must_use]
    pub const fn new(registry: Arc<ActionRegistry>) -> Self {
        Self { registry }
    }
}

impl Action for ProgressiveStage {
    fn action_type(&self) -> ActionType {
        ActionType::new(PROGRESSIVE_STAGE)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("stage_number", FieldType::Integer).with_range(1.0, 1_000.0),
            FieldSpec::required("stage_name", FieldType::String),
            FieldSpec::required("method", FieldType::String),
            FieldSpec::required("action", FieldType::String),
            FieldSpec::optional("params", FieldType::Map, Some(serde_json::json!({}))),
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("identifier_column", FieldType::String),
            FieldSpec::optional(
                "results_key",
                FieldType::String,
                Some(serde_json::Value::String(DEFAULT_RESULTS_KEY.to_string())),
            ),
            FieldSpec::optional(
                "confidence_threshold",
                FieldType::Float,
                Some(serde_json::json!(0.0)),
            )
            .with_range(0.0, 1.0),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string(), "progressive".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string(), "progressive".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let stage_number = require_u32(params, "stage_number")?;
        let stage_name = require_str(params, "stage_name")?;
        let method = require_str(params, "method")?;
        let inner_type = ActionType::new(require_str(params, "action")?);
        let input_key = DatasetKey::new(require_str(params, "input_key")?);
        let identifier_column = require_str(params, "identifier_column")?;
        let results_key = require_str(params, "results_key")?;
        let threshold = params
            .get("confidence_threshold")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);

        let started = Timestamp::now();
        let input = ctx.dataset(&input_key)?.clone();
        let all_ids = distinct_identifiers(&input, &identifier_column)?;
        if ctx.progressive.stages.is_empty() && ctx.progressive.total_processed == 0 {
            ctx.progressive.total_processed = all_ids.len() as u64;
        }

        // Filter to the still-unmatched subset before invoking the stage.
        let matched = matched_identifiers(ctx, &results_key)?;
        let pool_ids: BTreeSet<String> =
            all_ids.iter().filter(|id| !matched.contains(*id)).cloned().collect();
        let pool_rows = input
            .rows()
            .iter()
            .filter(|row| {
                row.get(&identifier_column)
                    .and_then(|cell| cell.as_text())
                    .is_some_and(|text| pool_ids.contains(text.trim()))
            })
            .cloned()
            .collect();
        let pool = input.with_rows(pool_rows);
        let pool_key = stage_pool_key(input_key.as_str(), stage_number);
        ctx.insert_dataset(pool_key.clone(), pool)?;

        let stage_records = if pool_ids.is_empty() {
            Vec::new()
        } else {
            let inner = self.registry.lookup(&inner_type)?;
            let mut inner_params: ParamMap = params
                .get("params")
                .and_then(serde_json::Value::as_object)
                .map(|entries| entries.clone().into_iter().collect())
                .unwrap_or_default();
            inner_params.insert(
                "input_key".to_string(),
                serde_json::Value::String(pool_key.to_string()),
            );
            inner_params.insert(
                "identifier_column".to_string(),
                serde_json::Value::String(identifier_column.clone()),
            );
            let validated = inner.parameters_schema().validate(&inner_params)?;
            let outcome = inner.execute(&validated, ctx)?;
            if !outcome.success {
                return Err(outcome.error.unwrap_or_else(|| {
                    EngineError::internal(format!("stage {stage_number} inner action failed"))
                }));
            }
            partition_results(outcome.mapping_results, &pool_ids, threshold, stage_number)?
        };

        let new_matches = stage_records.len() as u64;
        let confidence_avg = if stage_records.is_empty() {
            0.0
        } else {
            let total: f64 = stage_records.iter().map(|record| record.confidence).sum();
            #[allow(clippy::cast_precision_loss, reason = "record counts are small")]
            {
                total / stage_records.len() as f64
            }
        };
        let cumulative_matched = ctx.progressive.cumulative_matched() + new_matches;
        let unmatched = ctx.progressive.total_processed.saturating_sub(cumulative_matched);
        let stats = StageStats {
            stage_number,
            stage_name: stage_name.clone(),
            method: method.clone(),
            new_matches,
            cumulative_matched,
            unmatched,
            cumulative_rate: rate(cumulative_matched, ctx.progressive.total_processed),
            wall_time_ms: started.millis_until(Timestamp::now()),
            confidence_avg,
        };
        let cumulative_rate = stats.cumulative_rate;
        ctx.progressive.record_stage(stats)?;
        ctx.insert_dataset(
            stage_results_key(&results_key, stage_number),
            results_dataset(&stage_records)?,
        )?;

        Ok(ActionOutcome::ok(format!(
            "stage {stage_number} ({stage_name}) matched {new_matches} of {} unmatched",
            pool_ids.len()
        ))
        .with_metric("stage_number", serde_json::json!(stage_number))
        .with_metric("new_matches", serde_json::json!(new_matches))
        .with_metric("cumulative_matched", serde_json::json!(cumulative_matched))
        .with_metric("cumulative_rate", serde_json::json!(cumulative_rate))
        .with_metric("pool_size", serde_json::json!(pool_ids.len()))
        .with_mapping_results(stage_records))
    }
}

/// Partitions inner results into the stage's matched records.
///
/// Keeps the best candidate per source identifier, stamps the stage
/// number, and validates every kept record. Results for identifiers
/// outside the pool are contract violations.
fn partition_results(
    results: Vec<StandardMappingResult>,
    pool_ids: &BTreeSet<String>,
    threshold: f64,
    stage_number: u32,
) -> Result<Vec<StandardMappingResult>, EngineError> {
    let mut best: BTreeMap<String, StandardMappingResult> = BTreeMap::new();
    for result in results {
        if !pool_ids.contains(&result.source_id) {
            return Err(EngineError::new(
                ErrorKind::Validation,
                format!(
                    "stage {stage_number} mapper returned result for identifier outside its \
                     unmatched pool: {}",
                    result.source_id
                ),
            ));
        }
        if !result.is_mapped() || result.confidence < threshold {
            continue;
        }
        match best.get(&result.source_id) {
            Some(existing) if existing.confidence >= result.confidence => {}
            _ => {
                best.insert(result.source_id.clone(), result);
            }
        }
    }
    let mut records = Vec::with_capacity(best.len());
    for (_, result) in best {
        let record = result.at_stage(stage_number);
        record.validate()?;
        records.push(record);
    }
    Ok(records)
}

// ============================================================================
// SECTION: Progressive Finalize Action
// ============================================================================

/// Finalizer emitting terminal unmapped records and sealing statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressiveFinalize;

impl Action for ProgressiveFinalize {
    fn action_type(&self) -> ActionType {
        ActionType::new(PROGRESSIVE_FINALIZE)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("identifier_column", FieldType::String),
            FieldSpec::optional(
                "results_key",
                FieldType::String,
                Some(serde_json::Value::String(DEFAULT_RESULTS_KEY.to_string())),
            ),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string(), "progressive".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string(), "progressive".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = DatasetKey::new(require_str(params, "input_key")?);
        let identifier_column = require_str(params, "identifier_column")?;
        let results_key = require_str(params, "results_key")?;

        let input = ctx.dataset(&input_key)?.clone();
        let all_ids = distinct_identifiers(&input, &identifier_column)?;
        if ctx.progressive.stages.is_empty() && ctx.progressive.total_processed == 0 {
            ctx.progressive.total_processed = all_ids.len() as u64;
        }
        let matched = matched_identifiers(ctx, &results_key)?;
        let terminal_stage = ctx.progressive.last_stage_number() + 1;

        let mut combined = Vec::with_capacity(all_ids.len());
        for stage_number in ctx.progressive.stages.keys() {
            let key = stage_results_key(&results_key, *stage_number);
            for row in ctx.dataset(&key)?.rows() {
                combined.push(StandardMappingResult::from_record(row)?);
            }
        }
        let mut unmapped_count = 0_u64;
        for id in &all_ids {
            if !matched.contains(id) {
                combined.push(StandardMappingResult::unmapped(id.clone(), terminal_stage));
                unmapped_count += 1;
            }
        }
        ctx.insert_dataset(DatasetKey::new(results_key.clone()), results_dataset(&combined)?)?;
        ctx.progressive.finalize();

        let final_rate = ctx.progressive.final_match_rate;
        let total = ctx.progressive.total_processed;
        ctx.statistics.insert(
            "progressive_summary".to_string(),
            serde_json::json!({
                "total_processed": total,
                "final_match_rate": final_rate,
                "total_time_ms": ctx.progressive.total_time_ms,
                "stages": ctx.progressive.stages.len(),
            }),
        );

        Ok(ActionOutcome::ok(format!(
            "finalized {} results ({unmapped_count} unmapped at stage {terminal_stage})",
            combined.len()
        ))
        .with_metric("total_processed", serde_json::json!(total))
        .with_metric("final_match_rate", serde_json::json!(final_rate))
        .with_metric("total_unmapped", serde_json::json!(unmapped_count))
        .with_mapping_results(combined))
    }
}

// ============================================================================
// SECTION: Parameter Helpers
// ============================================================================

/// Reads a required string parameter from validated params.
fn require_str(params: &ParamMap, name: &str) -> Result<String, EngineError> {
    params
        .get(name)
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| EngineError::internal(format!("validated parameter missing: {name}")))
}

/// Reads a required u32 parameter from validated params.
fn require_u32(params: &ParamMap, name: &str) -> Result<u32, EngineError> {
    let value = params
        .get(name)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| EngineError::internal(format!("validated parameter missing: {name}")))?;
    u32::try_from(value)
        .map_err(|_| EngineError::internal(format!("parameter {name} out of range: {value}")))
}
