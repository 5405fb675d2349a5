// biomapper-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Job Store
// Description: Durable JobStore backed by SQLite WAL.
// Purpose: Persist job records across process restarts with integrity
//          checks.
// Dependencies: biomapper-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the durable [`JobStore`] on `SQLite`. Each job
//! row stores a canonical JSON snapshot of the record plus its hash; loads
//! verify integrity and fail closed on corruption. Status transitions are
//! written synchronously under the connection lock, terminal states are
//! sticky, and a startup sweep marks jobs left in flight by a previous
//! process as failed with reason `process_restart`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use biomapper_core::EngineError;
use biomapper_core::JobId;
use biomapper_core::JobRecord;
use biomapper_core::JobStatus;
use biomapper_core::JobStore;
use biomapper_core::StoreError;
use biomapper_core::Timestamp;
use biomapper_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use biomapper_core::core::hashing::HashAlgorithm;
use biomapper_core::core::hashing::canonical_json_bytes;
use biomapper_core::core::hashing::hash_bytes;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum job record snapshot size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;
/// Failure reason recorded by the restart recovery sweep.
pub const PROCESS_RESTART_REASON: &str = "process_restart";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` job store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a config with defaults for the given path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Conflicting write (duplicate create or terminal transition).
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed job store with WAL support.
#[derive(Clone)]
pub struct SqliteJobStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Opens an `SQLite`-backed job store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Locks the connection, surfacing poisoning as a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("job store mutex poisoned".to_string()))
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let (payload, hash) = encode_record(record).map_err(StoreError::from)?;
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard
            .transaction()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let result = tx.execute(
            "INSERT INTO jobs (job_id, strategy_name, status, revision, created_at, \
             record_json, record_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.job_id.as_str(),
                record.strategy_name.as_str(),
                record.status.as_str(),
                i64::try_from(record.revision).unwrap_or(i64::MAX),
                record.created_at.as_unix_millis(),
                payload,
                hash,
                hash_algorithm_label(DEFAULT_HASH_ALGORITHM),
            ],
        );
        match result {
            Ok(_) => tx.commit().map_err(|err| StoreError::Store(err.to_string())),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!("job already exists: {}", record.job_id)))
            }
            Err(err) => Err(StoreError::Store(err.to_string())),
        }
    }

    fn load(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row = guard
            .query_row(
                "SELECT record_json, record_hash, hash_algorithm FROM jobs WHERE job_id = ?1",
                params![job_id.as_str()],
                |row| {
                    let payload: Vec<u8> = row.get(0)?;
                    let hash: String = row.get(1)?;
                    let algorithm: String = row.get(2)?;
                    Ok((payload, hash, algorithm))
                },
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        drop(guard);
        let Some((payload, hash, algorithm)) = row else {
            return Ok(None);
        };
        decode_record(job_id, &payload, &hash, &algorithm)
            .map(Some)
            .map_err(StoreError::from)
    }

    fn update(&self, record: &JobRecord) -> Result<(), StoreError> {
        let (payload, hash) = encode_record(record).map_err(StoreError::from)?;
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard
            .transaction()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM jobs WHERE job_id = ?1",
                params![record.job_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let Some(current) = current else {
            return Err(StoreError::Invalid(format!("job not found: {}", record.job_id)));
        };
        let current_status = parse_status(&current).map_err(StoreError::from)?;
        if current_status.is_terminal() && current_status != record.status {
            return Err(StoreError::Conflict(format!(
                "job {} is terminal ({current})",
                record.job_id
            )));
        }
        tx.execute(
            "UPDATE jobs SET status = ?2, revision = ?3, record_json = ?4, record_hash = ?5, \
             hash_algorithm = ?6 WHERE job_id = ?1",
            params![
                record.job_id.as_str(),
                record.status.as_str(),
                i64::try_from(record.revision).unwrap_or(i64::MAX),
                payload,
                hash,
                hash_algorithm_label(DEFAULT_HASH_ALGORITHM),
            ],
        )
        .map_err(|err| StoreError::Store(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Store(err.to_string()))
    }

    fn list(&self) -> Result<Vec<JobRecord>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT job_id, record_json, record_hash, hash_algorithm FROM jobs ORDER BY \
                 created_at, job_id",
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let rows = statement
            .query_map(params![], |row| {
                let job_id: String = row.get(0)?;
                let payload: Vec<u8> = row.get(1)?;
                let hash: String = row.get(2)?;
                let algorithm: String = row.get(3)?;
                Ok((job_id, payload, hash, algorithm))
            })
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let (job_id, payload, hash, algorithm) =
                row.map_err(|err| StoreError::Store(err.to_string()))?;
            let record = decode_record(&JobId::new(job_id), &payload, &hash, &algorithm)
                .map_err(StoreError::from)?;
            records.push(record);
        }
        Ok(records)
    }

    fn recover_inflight(&self, reason: &str, at: Timestamp) -> Result<u64, StoreError> {
        let records = self.list()?;
        let mut recovered = 0;
        for mut record in records {
            if record.status.is_terminal() {
                continue;
            }
            if record.transition(JobStatus::Failed, at) {
                record.error = Some(EngineError::internal(reason));
                self.update(&record)?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

// ============================================================================
// SECTION: Encoding Helpers
// ============================================================================

/// Encodes a record as canonical JSON plus its digest.
fn encode_record(record: &JobRecord) -> Result<(Vec<u8>, String), SqliteStoreError> {
    let payload = canonical_json_bytes(record)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if payload.len() > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::Invalid(format!(
            "job record exceeds size limit: {} bytes (max {MAX_RECORD_BYTES})",
            payload.len()
        )));
    }
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &payload);
    Ok((payload, digest.value))
}

/// Decodes and verifies a stored record.
fn decode_record(
    job_id: &JobId,
    payload: &[u8],
    hash: &str,
    algorithm: &str,
) -> Result<JobRecord, SqliteStoreError> {
    let algorithm = parse_hash_algorithm(algorithm)?;
    let expected = hash_bytes(algorithm, payload);
    if expected.value != hash {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for job {job_id}")));
    }
    let record: JobRecord = serde_json::from_slice(payload)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if record.job_id.as_str() != job_id.as_str() {
        return Err(SqliteStoreError::Invalid(
            "job_id mismatch between key and payload".to_string(),
        ));
    }
    Ok(record)
}

/// Parses a persisted status label.
fn parse_status(label: &str) -> Result<JobStatus, SqliteStoreError> {
    match label {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(SqliteStoreError::Invalid(format!("unknown status label: {other}"))),
    }
}

/// Returns the canonical hash algorithm label.
const fn hash_algorithm_label(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
    }
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    match label {
        "sha256" => Ok(HashAlgorithm::Sha256),
        other => Err(SqliteStoreError::Invalid(format!("unsupported hash algorithm: {other}"))),
    }
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = wal; PRAGMA synchronous = full;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS jobs (
                    job_id TEXT NOT NULL PRIMARY KEY,
                    strategy_name TEXT NOT NULL,
                    status TEXT NOT NULL,
                    revision INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status);
                CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs (created_at);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}
