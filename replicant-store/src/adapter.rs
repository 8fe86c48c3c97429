//! The persistence seam.
//!
//! The store consumes a [`PersistenceAdapter`]; where and how records live
//! is entirely the adapter's concern. Two implementations ship here: an
//! in-memory adapter for tests and a JSON-file adapter writing one document
//! per replicant.

use async_trait::async_trait;
use replicant_types::ReplicantId;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

// The maps hold no invariants across a panic; recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors that can occur in a persistence adapter.
///
/// These are logged by the store and never surface to callers.
#[derive(Debug, Error)]
pub enum PersistError {
    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Adapter-specific failure.
    #[error("adapter error: {0}")]
    Adapter(String),
}

/// Loads and saves one durable record per `(namespace, name)` pair.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Loads the persisted value for a replicant, if any.
    async fn load(&self, id: &ReplicantId) -> PersistResult<Option<Value>>;

    /// Saves the current value for a replicant.
    async fn save(&self, id: &ReplicantId, value: &Value) -> PersistResult<()>;
}

/// An in-memory adapter for tests.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    records: Mutex<HashMap<ReplicantId, Value>>,
    save_counts: Mutex<HashMap<ReplicantId, usize>>,
    fail_saves: AtomicBool,
}

impl MemoryAdapter {
    /// Creates an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a persisted record, as if a previous process had saved it.
    pub fn seed(&self, id: ReplicantId, value: Value) {
        lock(&self.records).insert(id, value);
    }

    /// The currently persisted value for a replicant.
    #[must_use]
    pub fn record(&self, id: &ReplicantId) -> Option<Value> {
        lock(&self.records).get(id).cloned()
    }

    /// How many times a replicant has been saved.
    #[must_use]
    pub fn save_count(&self, id: &ReplicantId) -> usize {
        lock(&self.save_counts).get(id).copied().unwrap_or(0)
    }

    /// Makes every subsequent save fail, for exercising the log-only path.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    async fn load(&self, id: &ReplicantId) -> PersistResult<Option<Value>> {
        Ok(lock(&self.records).get(id).cloned())
    }

    async fn save(&self, id: &ReplicantId, value: &Value) -> PersistResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistError::Adapter("simulated save failure".into()));
        }
        *lock(&self.save_counts).entry(id.clone()).or_default() += 1;
        lock(&self.records).insert(id.clone(), value.clone());
        Ok(())
    }
}

/// Persists each replicant as `<dir>/<namespace>/<name>.json`.
///
/// Namespace and name are percent-encoded so arbitrary replicant names map
/// to valid file names.
#[derive(Debug, Clone)]
pub struct JsonFileAdapter {
    dir: PathBuf,
}

impl JsonFileAdapter {
    /// Creates an adapter rooted at `dir`. The directory is created lazily
    /// on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &ReplicantId) -> PathBuf {
        self.dir
            .join(urlencoding::encode(id.namespace()).as_ref())
            .join(format!("{}.json", urlencoding::encode(id.name())))
    }
}

#[async_trait]
impl PersistenceAdapter for JsonFileAdapter {
    async fn load(&self, id: &ReplicantId) -> PersistResult<Option<Value>> {
        let path = self.record_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, id: &ReplicantId, value: &Value) -> PersistResult<()> {
        let path = self.record_path(id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}
