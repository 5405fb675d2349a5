// biomapper-server/src/audit.rs
// ============================================================================
// Module: Server Audit Sinks
// Description: JSON-line audit sinks for job lifecycle events.
// Purpose: Record submissions, transitions, and completions durably.
// Dependencies: biomapper-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are one JSON object per line. Sinks never fail the caller:
//! an unwritable audit line is dropped, not escalated. The stderr sink
//! serves interactive runs; the file sink serves deployments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use biomapper_core::JobId;
use biomapper_core::JobStatus;
use biomapper_core::Timestamp;
use serde::Serialize;

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// One job lifecycle audit event.
#[derive(Debug, Clone, Serialize)]
pub struct JobAuditEvent {
    /// Event time.
    pub time: Timestamp,
    /// Job identifier.
    pub job_id: JobId,
    /// Strategy name.
    pub strategy: String,
    /// Job status after the event.
    pub status: JobStatus,
    /// Optional detail (error text, cancellation reason).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Audit sink for job lifecycle events.
pub trait JobAuditSink: Send + Sync {
    /// Records one event. Implementations must not fail the caller.
    fn record(&self, event: &JobAuditEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJobAuditSink;

impl JobAuditSink for NoopJobAuditSink {
    fn record(&self, _event: &JobAuditEvent) {}
}

/// Sink writing JSON lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrJobAuditSink;

impl JobAuditSink for StderrJobAuditSink {
    fn record(&self, event: &JobAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            #[allow(clippy::print_stderr, reason = "stderr is this sink's output channel")]
            {
                eprintln!("{line}");
            }
        }
    }
}

/// Sink appending JSON lines to a file.
pub struct FileJobAuditSink {
    /// Open audit file guarded for line-atomic appends.
    file: Mutex<File>,
}

impl FileJobAuditSink {
    /// Opens (or creates) the audit file in append mode.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when the file cannot be opened.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl JobAuditSink for FileJobAuditSink {
    fn record(&self, event: &JobAuditEvent) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}
