// biomapper-server/src/events.rs
// ============================================================================
// Module: Step Event Hub
// Description: Per-job broadcast fan-out of step lifecycle events.
// Purpose: Feed the SSE endpoint without coupling the executor to HTTP.
// Dependencies: biomapper-core, tokio
// ============================================================================

//! ## Overview
//! The hub implements the core [`StepEventSink`] seam and fans each event
//! out to that job's broadcast channel. Subscribers arriving before the
//! job starts receive everything; slow subscribers may observe lagged
//! drops, which SSE consumers tolerate by polling the status endpoint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use biomapper_core::JobId;
use biomapper_core::StepEvent;
use biomapper_core::StepEventSink;
use tokio::sync::broadcast;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Broadcast capacity per job channel.
const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// SECTION: Event Hub
// ============================================================================

/// Per-job broadcast hub for step events.
#[derive(Default)]
pub struct EventHub {
    /// Broadcast senders keyed by job identifier.
    channels: Mutex<BTreeMap<String, broadcast::Sender<StepEvent>>>,
}

impl EventHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a job's step events, creating the channel if needed.
    #[must_use]
    pub fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<StepEvent> {
        let mut channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(job_id.as_str().to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drops a finished job's channel.
    pub fn release(&self, job_id: &JobId) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.remove(job_id.as_str());
        }
    }
}

impl StepEventSink for EventHub {
    fn emit(&self, event: &StepEvent) {
        let Ok(mut channels) = self.channels.lock() else {
            return;
        };
        let sender = channels
            .entry(event.job_id.as_str().to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        // Send failures just mean nobody is listening.
        let _ = sender.send(event.clone());
    }
}
