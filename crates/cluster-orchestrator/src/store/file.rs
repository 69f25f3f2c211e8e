//! File-based datastore.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::ClusterStore;
use crate::cluster::ClusterRecord;
use crate::error::{OrchestratorError, Result};

type Records = BTreeMap<String, ClusterRecord>;

/// Datastore that keeps all records in a single JSON file.
///
/// Every read-modify-write holds an exclusive `flock` on `clusters.lock`
/// next to the records file, so separate processes (and separate handles in
/// one process) serialize their changes and a second `create` of a name
/// always sees the first. Writes go to a per-process temporary file that is
/// renamed over `clusters.json`, so plain reads never see a partial file.
#[derive(Debug)]
pub struct FileStore {
    /// Directory holding the records file
    state_dir: PathBuf,

    /// Path to clusters.json
    records_file: PathBuf,

    /// Path to clusters.lock
    lock_file: PathBuf,

    lock: Mutex<()>,
}

/// Held for the duration of one read-modify-write.
#[cfg(unix)]
type WriteLock = nix::fcntl::Flock<std::fs::File>;

#[cfg(not(unix))]
type WriteLock = ();

impl FileStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let state_dir = state_dir.as_ref().to_path_buf();
        let records_file = state_dir.join("clusters.json");
        let lock_file = state_dir.join("clusters.lock");
        Self {
            state_dir,
            records_file,
            lock_file,
            lock: Mutex::new(()),
        }
    }

    /// Path of the records file
    pub fn records_file(&self) -> &Path {
        &self.records_file
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await.map_err(|e| {
            OrchestratorError::Store(format!(
                "failed to create {}: {e}",
                self.state_dir.display()
            ))
        })
    }

    /// Take the cross-process write lock, waiting for other writers.
    #[cfg(unix)]
    async fn lock_for_write(&self) -> Result<WriteLock> {
        use nix::fcntl::{Flock, FlockArg};

        self.ensure_state_dir().await?;
        let path = self.lock_file.clone();

        tokio::task::spawn_blocking(move || -> Result<WriteLock> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| {
                    OrchestratorError::Store(format!("failed to open {}: {e}", path.display()))
                })?;
            Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
                OrchestratorError::Store(format!("failed to lock {}: {errno}", path.display()))
            })
        })
        .await
        .map_err(|e| OrchestratorError::Store(format!("lock task failed: {e}")))?
    }

    #[cfg(not(unix))]
    async fn lock_for_write(&self) -> Result<WriteLock> {
        self.ensure_state_dir().await
    }

    async fn read_records(&self) -> Result<Records> {
        match fs::read_to_string(&self.records_file).await {
            Ok(content) if content.trim().is_empty() => Ok(Records::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::new()),
            Err(e) => Err(OrchestratorError::Store(format!(
                "failed to read {}: {e}",
                self.records_file.display()
            ))),
        }
    }

    /// Replace the records file. Callers hold the write lock.
    async fn write_records(&self, records: &Records) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;
        let tmp = self
            .state_dir
            .join(format!("clusters.json.{}.tmp", std::process::id()));
        fs::write(&tmp, content).await.map_err(|e| {
            OrchestratorError::Store(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.records_file).await.map_err(|e| {
            OrchestratorError::Store(format!(
                "failed to replace {}: {e}",
                self.records_file.display()
            ))
        })?;

        debug!(path = %self.records_file.display(), count = records.len(), "Saved cluster records");
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for FileStore {
    async fn create(&self, record: &ClusterRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let _write_lock = self.lock_for_write().await?;
        let mut records = self.read_records().await?;
        if records.contains_key(&record.name) {
            return Err(OrchestratorError::Conflict(record.name.clone()));
        }
        records.insert(record.name.clone(), record.clone());
        self.write_records(&records).await
    }

    async fn read(&self, name: &str) -> Result<Option<ClusterRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_records().await?.remove(name))
    }

    async fn update(&self, record: &ClusterRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let _write_lock = self.lock_for_write().await?;
        let mut records = self.read_records().await?;
        match records.get_mut(&record.name) {
            Some(existing) => *existing = record.clone(),
            None => return Err(OrchestratorError::NotFound(record.name.clone())),
        }
        self.write_records(&records).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let _write_lock = self.lock_for_write().await?;
        let mut records = self.read_records().await?;
        if records.remove(name).is_none() {
            return Err(OrchestratorError::NotFound(name.to_string()));
        }
        self.write_records(&records).await
    }

    async fn list(&self) -> Result<Vec<ClusterRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_records().await?.into_values().collect())
    }
}
