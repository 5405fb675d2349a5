// biomapper-core/src/runtime/checkpoint.rs
// ============================================================================
// Module: Biomapper Checkpoints
// Description: Hash-verified context snapshots around steps.
// Purpose: Persist resumable context state for post-mortem inspection.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! A checkpoint is one JSON file containing an integrity digest and a full
//! serialized execution context, written to
//! `<checkpoint_root>/<job_id>/<step>.<before|after>.json`. Loads verify
//! the digest and fail closed on mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::context::ExecutionContext;
use crate::core::error::EngineError;
use crate::core::error::ErrorKind;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_bytes;
use crate::strategy::CheckpointPoint;

// ============================================================================
// SECTION: Checkpoint File
// ============================================================================

/// On-disk checkpoint payload.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    /// Digest of the canonical context JSON.
    digest: HashDigest,
    /// Serialized execution context.
    context: ExecutionContext,
}

/// Returns the checkpoint file path for a step and placement.
#[must_use]
pub fn checkpoint_path(
    root: &Path,
    job_id: &str,
    step_name: &str,
    point: CheckpointPoint,
) -> PathBuf {
    let phase = match point {
        CheckpointPoint::Before => "before",
        CheckpointPoint::After => "after",
    };
    root.join(job_id).join(format!("{step_name}.{phase}.json"))
}

/// Writes a checkpoint snapshot of the context.
///
/// # Errors
///
/// Returns a [`ErrorKind::FileWriteFailed`] error when serialization or
/// the write fails.
pub fn write_checkpoint(
    root: &Path,
    ctx: &ExecutionContext,
    step_name: &str,
    point: CheckpointPoint,
) -> Result<PathBuf, EngineError> {
    let canonical = canonical_json_bytes(ctx).map_err(|err| {
        EngineError::new(ErrorKind::FileWriteFailed, format!("checkpoint encode failed: {err}"))
    })?;
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &canonical);
    let file = CheckpointFile { digest, context: ctx.clone() };
    let path = checkpoint_path(root, ctx.job_id.as_str(), step_name, point);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            EngineError::new(ErrorKind::FileWriteFailed, format!("checkpoint dir: {err}"))
        })?;
    }
    let payload = serde_json::to_vec_pretty(&file).map_err(|err| {
        EngineError::new(ErrorKind::FileWriteFailed, format!("checkpoint encode failed: {err}"))
    })?;
    fs::write(&path, payload).map_err(|err| {
        EngineError::new(ErrorKind::FileWriteFailed, format!("checkpoint write failed: {err}"))
    })?;
    Ok(path)
}

/// Loads and verifies a checkpoint snapshot.
///
/// # Errors
///
/// Returns a [`ErrorKind::Validation`] error when the file is missing,
/// unreadable, or fails its integrity check.
pub fn read_checkpoint(path: &Path) -> Result<ExecutionContext, EngineError> {
    let bytes = fs::read(path).map_err(|err| {
        EngineError::new(ErrorKind::Validation, format!("checkpoint read failed: {err}"))
    })?;
    let file: CheckpointFile = serde_json::from_slice(&bytes).map_err(|err| {
        EngineError::new(ErrorKind::Validation, format!("checkpoint decode failed: {err}"))
    })?;
    let canonical = canonical_json_bytes(&file.context).map_err(|err| {
        EngineError::new(ErrorKind::Validation, format!("checkpoint encode failed: {err}"))
    })?;
    let expected = hash_bytes(file.digest.algorithm, &canonical);
    if expected.value != file.digest.value {
        return Err(EngineError::new(
            ErrorKind::Validation,
            format!("checkpoint digest mismatch for {}", path.display()),
        ));
    }
    Ok(file.context)
}
