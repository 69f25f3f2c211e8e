//! Datastore trait.

use async_trait::async_trait;

use crate::cluster::ClusterRecord;
use crate::error::Result;

/// Atomic CRUD over cluster records keyed by name.
///
/// Implementations must reject a second `create` for a name that is already
/// stored; the orchestrator's own existence check is only advisory.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the name is taken.
    async fn create(&self, record: &ClusterRecord) -> Result<()>;

    /// Fetch a record by name.
    async fn read(&self, name: &str) -> Result<Option<ClusterRecord>>;

    /// Replace an existing record. Fails with `NotFound` if it does not exist.
    async fn update(&self, record: &ClusterRecord) -> Result<()>;

    /// Remove a record. Fails with `NotFound` if it does not exist.
    async fn delete(&self, name: &str) -> Result<()>;

    /// All records, ordered by name.
    async fn list(&self) -> Result<Vec<ClusterRecord>>;
}
