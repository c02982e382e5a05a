use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{error, warn};

use crate::error::StoreError;

pub const FAILED_PAYMENT_LOGS: &str = "failed_payment_logs";
pub const SUSPICIOUS_PAYMENT_ACTIVITY: &str = "suspicious_payment_activity";

/// Local durable queue of telemetry that could not be delivered. Each key
/// holds a JSON array, oldest first.
#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn append(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn load(&self, key: &str) -> Result<Vec<Value>, StoreError>;
    /// Removes one queued occurrence of each of `values`. Entries appended
    /// meanwhile stay queued.
    async fn remove(&self, key: &str, values: &[Value]) -> Result<usize, StoreError>;
}

// Politica de retenção: descarta os mais antigos
fn push_bounded(key: &str, entries: &mut Vec<Value>, value: Value, max_entries: usize) {
    entries.push(value);
    if entries.len() > max_entries {
        let evicted = entries.len() - max_entries;
        entries.drain(..evicted);
        warn!("Fallback queue {} full, evicted {} oldest entries", key, evicted);
    }
}

fn remove_matching(entries: &mut Vec<Value>, values: &[Value]) -> usize {
    let mut removed = 0;
    for value in values {
        if let Some(position) = entries.iter().position(|entry| entry == value) {
            entries.remove(position);
            removed += 1;
        }
    }
    removed
}

pub struct FileFallbackStore {
    dir: PathBuf,
    max_entries: usize,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileFallbackStore {
    pub fn new(dir: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            dir: dir.into(),
            max_entries: max_entries.max(1),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// An unreadable queue file is moved to `<key>.json.corrupt` and the
    /// queue starts over empty.
    async fn read_entries(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let quarantine = path.with_extension("json.corrupt");
                error!(
                    "Fallback queue {} is unreadable ({}), moving it to {}",
                    key,
                    e,
                    quarantine.display()
                );
                tokio::fs::rename(&path, &quarantine).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn write_entries(&self, key: &str, entries: &[Value]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(entries)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl FallbackStore for FileFallbackStore {
    async fn append(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries(key).await?;
        push_bounded(key, &mut entries, value, self.max_entries);
        self.write_entries(key, &entries).await
    }

    async fn load(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.read_entries(key).await
    }

    async fn remove(&self, key: &str, values: &[Value]) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_entries(key).await?;
        let removed = remove_matching(&mut entries, values);
        if removed > 0 {
            self.write_entries(key, &entries).await?;
        }
        Ok(removed)
    }
}

/// In-process store, for embedding without a writable disk and for tests.
pub struct MemoryFallbackStore {
    queues: Mutex<HashMap<String, Vec<Value>>>,
    max_entries: usize,
}

impl MemoryFallbackStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }
}

#[async_trait]
impl FallbackStore for MemoryFallbackStore {
    async fn append(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut queues = self.queues.lock();
        let entries = queues.entry(key.to_string()).or_default();
        push_bounded(key, entries, value, self.max_entries);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self.queues.lock().get(key).cloned().unwrap_or_default())
    }

    async fn remove(&self, key: &str, values: &[Value]) -> Result<usize, StoreError> {
        let mut queues = self.queues.lock();
        Ok(queues
            .get_mut(key)
            .map_or(0, |entries| remove_matching(entries, values)))
    }
}
