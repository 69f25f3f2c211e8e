//! In-memory datastore.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::ClusterStore;
use crate::cluster::ClusterRecord;
use crate::error::{OrchestratorError, Result};

/// Datastore that keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, ClusterRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn create(&self, record: &ClusterRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.name) {
            return Err(OrchestratorError::Conflict(record.name.clone()));
        }
        records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Option<ClusterRecord>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn update(&self, record: &ClusterRecord) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.name) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(OrchestratorError::NotFound(record.name.clone())),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.records
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))
    }

    async fn list(&self) -> Result<Vec<ClusterRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
