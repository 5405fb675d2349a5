// biomapper-resolvers/src/action.rs
// ============================================================================
// Module: Resolver Match Action
// Description: Generic mapper action over the resolver registry.
// Purpose: Turn resolver candidates into canonical mapping results.
// Dependencies: biomapper-core, crate::registry
// ============================================================================

//! ## Overview
//! `RESOLVER_MATCH` is the generic mapper bridge: it batches a dataset's
//! identifiers through a named resolver capability and emits canonical
//! mapping results from the returned candidates (best candidate per
//! source). Rows that passed through composite expansion carry their
//! bookkeeping columns back out: matched records are stamped
//! `is_composite` with `parsed_value` naming the matching component.
//! Progressive stages wrap this action for staged pipelines. The raw
//! candidate list also lands as a dataset for auditing when
//! `raw_output_key` is set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use biomapper_core::Action;
use biomapper_core::ActionOutcome;
use biomapper_core::ActionType;
use biomapper_core::CellValue;
use biomapper_core::Dataset;
use biomapper_core::EngineError;
use biomapper_core::ExecutionContext;
use biomapper_core::ParamMap;
use biomapper_core::ParamsSchema;
use biomapper_core::Record;
use biomapper_core::ResolveRequest;
use biomapper_core::ResolverCapability;
use biomapper_core::ResolverName;
use biomapper_core::StandardMappingResult;
use biomapper_core::composite_provenance;
use biomapper_core::schema::FieldSpec;
use biomapper_core::schema::FieldType;

use crate::registry::ResolverRegistry;

// ============================================================================
// SECTION: Action
// ============================================================================

/// Action type name of the generic resolver mapper.
pub const RESOLVER_MATCH: &str = "RESOLVER_MATCH";

/// Generic mapper over the resolver registry.
pub struct ResolverMatch {
    /// Registry resolutions route through.
    registry: Arc<ResolverRegistry>,
}

impl ResolverMatch {
    /// Creates the action over a resolver registry.
    #[must_use]
    pub const fn new(registry: Arc<ResolverRegistry>) -> Self {
        Self { registry }
    }
}

impl Action for ResolverMatch {
    fn action_type(&self) -> ActionType {
        ActionType::new(RESOLVER_MATCH)
    }

    fn parameters_schema(&self) -> ParamsSchema {
        ParamsSchema::new(vec![
            FieldSpec::required("input_key", FieldType::String),
            FieldSpec::required("identifier_column", FieldType::String),
            FieldSpec::required("resolver", FieldType::String),
            FieldSpec::optional(
                "capability",
                FieldType::String,
                Some(serde_json::json!("exact-lookup")),
            )
            .with_allowed(&[
                "exact-lookup",
                "bridge-lookup",
                "fuzzy-match",
                "vector-search",
                "semantic-match",
            ]),
            FieldSpec::optional("batch_size", FieldType::Integer, Some(serde_json::json!(100)))
                .with_range(1.0, 10_000.0),
            FieldSpec::optional(
                "min_confidence",
                FieldType::Float,
                Some(serde_json::json!(0.0)),
            )
            .with_range(0.0, 1.0),
            FieldSpec::optional("options", FieldType::Map, Some(serde_json::json!({}))),
            FieldSpec::optional("raw_output_key", FieldType::String, None),
        ])
    }

    fn consumes(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn produces(&self) -> Vec<String> {
        vec!["datasets".to_string()]
    }

    fn execute(
        &self,
        params: &ParamMap,
        ctx: &mut ExecutionContext,
    ) -> Result<ActionOutcome, EngineError> {
        let input_key = require_str(params, "input_key")?;
        let identifier_column = require_str(params, "identifier_column")?;
        let resolver = ResolverName::new(require_str(params, "resolver")?);
        let capability = parse_capability(&require_str(params, "capability")?)?;
        let batch_size = params
            .get("batch_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(100)
            .max(1);
        let min_confidence = params
            .get("min_confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        let options: BTreeMap<String, serde_json::Value> = params
            .get("options")
            .and_then(serde_json::Value::as_object)
            .map(|entries| entries.clone().into_iter().collect())
            .unwrap_or_default();
        let raw_output_key = params
            .get("raw_output_key")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);

        let dataset = ctx.dataset(&input_key.as_str().into())?.clone();
        dataset.require_column(&identifier_column)?;
        let mut sources = Vec::new();
        let mut provenance: BTreeMap<String, String> = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for row in dataset.rows() {
            let Some(text) = row.get(&identifier_column).and_then(|cell| cell.as_text()) else {
                continue;
            };
            let trimmed = text.trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_string()) {
                continue;
            }
            sources.push(trimmed.to_string());
            if let Some(original) = composite_provenance(row) {
                provenance.insert(trimmed.to_string(), original);
            }
        }

        let mut results = Vec::new();
        let mut raw_rows: Vec<Record> = Vec::new();
        for batch in sources.chunks(batch_size) {
            let request = ResolveRequest {
                capability,
                sources: batch.to_vec(),
                options: options.clone(),
            };
            let response = self
                .registry
                .resolve(&resolver, &request)
                .map_err(|err| err.to_engine_error())?;
            for (source, candidates) in &response.candidates {
                for candidate in candidates {
                    let mut row = Record::new();
                    row.insert("source_id".to_string(), CellValue::text(source.clone()));
                    row.insert(
                        "target_id".to_string(),
                        CellValue::text(candidate.target_id.clone()),
                    );
                    row.insert("confidence".to_string(), CellValue::Number(candidate.confidence));
                    row.insert("method".to_string(), CellValue::text(candidate.method.clone()));
                    raw_rows.push(row);
                }
                let best = candidates
                    .iter()
                    .filter(|candidate| candidate.confidence >= min_confidence)
                    .max_by(|a, b| {
                        a.confidence
                            .partial_cmp(&b.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                if let Some(candidate) = best {
                    let mut result = StandardMappingResult::mapped(
                        source.clone(),
                        candidate.target_id.clone(),
                        candidate.method.clone(),
                        candidate.confidence,
                    );
                    result.details.clone_from(&candidate.details);
                    // Expanded rows stay composite even when the source
                    // split into a single component.
                    if let Some(original) = provenance.get(source) {
                        result.is_composite = true;
                        result.parsed_value = Some(source.clone());
                        if result.details.is_none() {
                            result.details =
                                Some(format!("component of composite {original}"));
                        }
                    }
                    results.push(result);
                }
            }
        }

        if let Some(raw_output_key) = raw_output_key {
            let columns = ["source_id", "target_id", "confidence", "method"]
                .iter()
                .map(ToString::to_string)
                .collect();
            let raw = Dataset::from_rows(columns, raw_rows)?;
            ctx.insert_dataset(raw_output_key.as_str().into(), raw)?;
        }

        let matched = results.len();
        Ok(ActionOutcome::ok(format!(
            "resolver {resolver} matched {matched} of {} identifiers",
            sources.len()
        ))
        .with_metric("sources", serde_json::json!(sources.len()))
        .with_metric("matched", serde_json::json!(matched))
        .with_mapping_results(results))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a required string from validated params.
fn require_str(params: &ParamMap, name: &str) -> Result<String, EngineError> {
    params
        .get(name)
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| EngineError::internal(format!("validated parameter missing: {name}")))
}

/// Parses a capability label into the typed kind.
fn parse_capability(label: &str) -> Result<ResolverCapability, EngineError> {
    match label {
        "exact-lookup" => Ok(ResolverCapability::ExactLookup),
        "bridge-lookup" => Ok(ResolverCapability::BridgeLookup),
        "fuzzy-match" => Ok(ResolverCapability::FuzzyMatch),
        "vector-search" => Ok(ResolverCapability::VectorSearch),
        "semantic-match" => Ok(ResolverCapability::SemanticMatch),
        other => Err(EngineError::internal(format!("unknown capability label: {other}"))),
    }
}
