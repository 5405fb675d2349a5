// biomapper-core/src/runtime/store.rs
// ============================================================================
// Module: Biomapper In-Memory Job Store
// Description: Simple in-memory job store for tests and examples.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of [`JobStore`]
//! for tests and local demos. It is not intended for production use; the
//! durable SQLite store lives in its own crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::identifiers::JobId;
use crate::core::job::JobRecord;
use crate::core::job::JobStatus;
use crate::core::time::Timestamp;
use crate::interfaces::JobStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory job store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStore {
    /// Job record map protected by a mutex.
    jobs: Arc<Mutex<BTreeMap<String, JobRecord>>>,
}

impl InMemoryJobStore {
    /// Creates a new in-memory job store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut guard = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))?;
        if guard.contains_key(record.job_id.as_str()) {
            return Err(StoreError::Conflict(format!(
                "job already exists: {}",
                record.job_id
            )));
        }
        guard.insert(record.job_id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn load(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let guard = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))?;
        Ok(guard.get(job_id.as_str()).cloned())
    }

    fn update(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut guard = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))?;
        let Some(existing) = guard.get(record.job_id.as_str()) else {
            return Err(StoreError::Invalid(format!("job not found: {}", record.job_id)));
        };
        if existing.status.is_terminal() && existing.status != record.status {
            return Err(StoreError::Conflict(format!(
                "job {} is terminal ({})",
                record.job_id,
                existing.status.as_str()
            )));
        }
        guard.insert(record.job_id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        let guard = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))?;
        let mut records: Vec<JobRecord> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    fn recover_inflight(&self, reason: &str, at: Timestamp) -> Result<u64, StoreError> {
        let mut guard = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))?;
        let mut recovered = 0;
        for record in guard.values_mut() {
            if !record.status.is_terminal() && record.transition(JobStatus::Failed, at) {
                record.error = Some(crate::core::error::EngineError::internal(reason));
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared job store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedJobStore {
    /// Inner store implementation.
    inner: Arc<dyn JobStore>,
}

impl SharedJobStore {
    /// Wraps a job store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl JobStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl JobStore for SharedJobStore {
    fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.inner.create(record)
    }

    fn load(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        self.inner.load(job_id)
    }

    fn update(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.inner.update(record)
    }

    fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        self.inner.list()
    }

    fn recover_inflight(&self, reason: &str, at: Timestamp) -> Result<u64, StoreError> {
        self.inner.recover_inflight(reason, at)
    }
}
