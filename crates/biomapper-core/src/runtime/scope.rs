// biomapper-core/src/runtime/scope.rs
// ============================================================================
// Module: Biomapper Context Scope
// Description: Expression scope backed by the execution context.
// Purpose: Expose exactly the declared reference roots to expressions.
// Dependencies: crate::core, biomapper-expr
// ============================================================================

//! ## Overview
//! The context scope binds the reserved expression roots to live context
//! state: `parameters`, `variables`, `env`, and `steps`, plus the loop
//! frames `foreach` and `repeat` when the executor is inside control flow.
//! Nothing else is reachable; dataset contents in particular are never
//! exposed to expressions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use biomapper_expr::ExprError;
use biomapper_expr::ExprValue;
use biomapper_expr::Scope;

use crate::core::context::ExecutionContext;

// ============================================================================
// SECTION: Loop Frames
// ============================================================================

/// Loop bindings active while the executor runs control flow.
#[derive(Debug, Clone, Default)]
pub struct LoopFrames {
    /// `foreach.index` and `foreach.item`, inside `for_each`.
    pub foreach: Option<(i64, serde_json::Value)>,
    /// `repeat.iteration`, inside `repeat`.
    pub repeat_iteration: Option<i64>,
}

impl LoopFrames {
    /// Returns frames with a `foreach` binding.
    #[must_use]
    pub fn with_foreach(index: i64, item: serde_json::Value) -> Self {
        Self {
            foreach: Some((index, item)),
            repeat_iteration: None,
        }
    }

    /// Returns frames with a `repeat` binding.
    #[must_use]
    pub const fn with_repeat(iteration: i64) -> Self {
        Self {
            foreach: None,
            repeat_iteration: Some(iteration),
        }
    }
}

// ============================================================================
// SECTION: Context Scope
// ============================================================================

/// Expression scope over one execution context.
pub struct ContextScope<'a> {
    /// Context the roots resolve against.
    ctx: &'a ExecutionContext,
    /// Active loop bindings.
    frames: LoopFrames,
}

impl<'a> ContextScope<'a> {
    /// Creates a scope without loop bindings.
    #[must_use]
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self {
            ctx,
            frames: LoopFrames::default(),
        }
    }

    /// Creates a scope with loop bindings.
    #[must_use]
    pub const fn with_frames(ctx: &'a ExecutionContext, frames: LoopFrames) -> Self {
        Self { ctx, frames }
    }
}

impl Scope for ContextScope<'_> {
    fn resolve_root(&self, root: &str) -> Result<Option<ExprValue>, ExprError> {
        match root {
            "parameters" => Ok(Some(json_map_value(&self.ctx.parameters))),
            "variables" => Ok(Some(json_map_value(&self.ctx.variables))),
            "env" => {
                let entries = self
                    .ctx
                    .env
                    .iter()
                    .map(|(key, value)| (key.clone(), ExprValue::Str(value.clone())))
                    .collect();
                Ok(Some(ExprValue::Map(entries)))
            }
            "steps" => Ok(Some(steps_value(self.ctx))),
            "foreach" => Ok(self.frames.foreach.as_ref().map(|(index, item)| {
                let mut entries = BTreeMap::new();
                entries.insert("index".to_string(), ExprValue::Int(*index));
                entries.insert("item".to_string(), ExprValue::from_json(item));
                ExprValue::Map(entries)
            })),
            "repeat" => Ok(self.frames.repeat_iteration.map(|iteration| {
                let mut entries = BTreeMap::new();
                entries.insert("iteration".to_string(), ExprValue::Int(iteration));
                ExprValue::Map(entries)
            })),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a JSON map into an expression map value.
fn json_map_value(entries: &BTreeMap<String, serde_json::Value>) -> ExprValue {
    ExprValue::Map(
        entries
            .iter()
            .map(|(key, value)| (key.clone(), ExprValue::from_json(value)))
            .collect(),
    )
}

/// Builds the `steps` root from recorded step outputs.
fn steps_value(ctx: &ExecutionContext) -> ExprValue {
    let mut steps = BTreeMap::new();
    for (name, output) in &ctx.step_outputs {
        let mut entry = BTreeMap::new();
        entry.insert("metrics".to_string(), json_map_value(&output.metrics));
        entry.insert("outputs".to_string(), json_map_value(&output.outputs));
        entry.insert("failed".to_string(), ExprValue::Bool(output.failed));
        entry.insert("skipped".to_string(), ExprValue::Bool(output.skipped));
        steps.insert(name.clone(), ExprValue::Map(entry));
    }
    ExprValue::Map(steps)
}
