// biomapper-resolvers/src/cache.rs
// ============================================================================
// Module: Resolver Response Cache
// Description: On-disk TTL cache keyed by canonical request hashes.
// Purpose: Avoid repeated identical resolver calls across jobs.
// Dependencies: biomapper-core, serde_json
// ============================================================================

//! ## Overview
//! Responses cache on disk under
//! `<root>/<resolver>/<sha256-of-canonical-request>.json`. Entries carry
//! their storage time and expire after the configured TTL. Reads are
//! unlocked and treat any unreadable or expired entry as a miss; writes
//! are serialized per cache key through a lock table and land via a
//! writer-unique temp file plus rename, so concurrent writers of one key
//! never interleave.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use biomapper_core::ResolveRequest;
use biomapper_core::ResolveResponse;
use biomapper_core::Timestamp;
use biomapper_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use biomapper_core::core::hashing::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Cache Entry
// ============================================================================

/// One serialized cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Storage time in unix milliseconds.
    stored_at: Timestamp,
    /// Cached resolver response.
    response: ResolveResponse,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Process-wide counter making temp file names unique per writer.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk TTL cache for resolver responses.
pub struct ResolverCache {
    /// Cache root directory.
    root: PathBuf,
    /// Entry time to live.
    ttl: Duration,
    /// Per-entry write locks keyed by entry path. The table keeps one
    /// small lock per written key for process lifetime.
    write_locks: Mutex<BTreeMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ResolverCache {
    /// Creates a cache rooted at `root` with the given TTL.
    #[must_use]
    pub const fn new(root: PathBuf, ttl: Duration) -> Self {
        Self {
            root,
            ttl,
            write_locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the write lock for one entry path.
    fn write_lock(&self, path: &std::path::Path) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Computes the entry path for a request.
    fn entry_path(&self, resolver: &str, request: &ResolveRequest) -> Option<PathBuf> {
        let digest =
            hash_canonical_json(DEFAULT_HASH_ALGORITHM, &(resolver, request)).ok()?;
        Some(self.root.join(resolver).join(format!("{}.json", digest.value)))
    }

    /// Looks up a fresh cached response; any failure is a miss.
    #[must_use]
    pub fn get(&self, resolver: &str, request: &ResolveRequest) -> Option<ResolveResponse> {
        let path = self.entry_path(resolver, request)?;
        let bytes = fs::read(path).ok()?;
        let entry: CacheEntry = serde_json::from_slice(&bytes).ok()?;
        let age_ms = entry.stored_at.millis_until(Timestamp::now());
        if Duration::from_millis(age_ms) > self.ttl {
            return None;
        }
        Some(entry.response)
    }

    /// Stores a response; failures are swallowed (caching is best effort).
    ///
    /// Writers of one key are serialized through the lock table; each
    /// writer lands through its own temp file before the rename.
    pub fn put(&self, resolver: &str, request: &ResolveRequest, response: &ResolveResponse) {
        let Some(path) = self.entry_path(resolver, request) else {
            return;
        };
        let Some(parent) = path.parent() else {
            return;
        };
        if fs::create_dir_all(parent).is_err() {
            return;
        }
        let entry = CacheEntry {
            stored_at: Timestamp::now(),
            response: response.clone(),
        };
        let Ok(payload) = serde_json::to_vec(&entry) else {
            return;
        };
        let lock = self.write_lock(&path);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let serial = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("tmp{serial}"));
        if fs::write(&temp, payload).is_ok() {
            let _ = fs::rename(&temp, &path);
        }
        drop(guard);
    }
}
