//! Cluster lifecycle operations.
//!
//! [`ClusterOrchestrator`] ties the collaborators together: it validates
//! requests, guards the state machine, acquires a credential session per
//! operation, drives the launcher, and records outcomes in the datastore.
//! Start and stop are all-or-nothing from the caller's point of view.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cluster::{ClusterRecord, ClusterState};
use crate::config::OrchestratorConfig;
use crate::credentials::{CredentialManager, Session};
use crate::engine::{Engine, EngineRegistry, StaticEngineRegistry};
use crate::error::{OrchestratorError, Result};
use crate::health::{ClusterHealth, HealthPoller, HttpHealthPoller};
use crate::launcher::{ClusterLauncher, YarnLauncher};
use crate::store::{ClusterStore, FileStore};

/// Longest accepted cluster name.
const MAX_NAME_LEN: usize = 64;

/// Request to start a new cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub name: String,
    /// Engine name resolved through the engine registry.
    pub engine: String,
    pub size: u32,
    /// Per-node memory ceiling, e.g. `4g`.
    pub memory: String,
    /// Principal the cluster is launched for.
    pub principal: String,
}

/// A record together with what its live cluster reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    #[serde(flatten)]
    pub record: ClusterRecord,
    pub health: ClusterHealth,
}

/// Result of a successful stop.
#[derive(Debug)]
pub struct StoppedCluster {
    /// The record, now `Stopped`.
    pub record: ClusterRecord,
    /// Set when the job was killed but its output directory was left behind.
    pub cleanup_error: Option<OrchestratorError>,
}

/// Orchestrates cluster start, stop, delete, and status reconciliation.
pub struct ClusterOrchestrator {
    store: Arc<dyn ClusterStore>,
    engines: Arc<dyn EngineRegistry>,
    launcher: Arc<dyn ClusterLauncher>,
    poller: Arc<dyn HealthPoller>,
    credentials: CredentialManager,
}

impl ClusterOrchestrator {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        engines: Arc<dyn EngineRegistry>,
        launcher: Arc<dyn ClusterLauncher>,
        poller: Arc<dyn HealthPoller>,
        credentials: CredentialManager,
    ) -> Self {
        Self {
            store,
            engines,
            launcher,
            poller,
            credentials,
        }
    }

    /// Build an orchestrator with the file store, configured engines, the
    /// `hadoop` launcher, and the HTTP health poller.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(FileStore::new(&config.store.state_dir)),
            Arc::new(StaticEngineRegistry::new(config.engines.clone())),
            Arc::new(YarnLauncher::new(config.launcher.clone())),
            Arc::new(HttpHealthPoller::new(config.health.timeout())?),
            CredentialManager::new(config.credentials.clone()),
        ))
    }

    /// Start a cluster and record it as `Started`.
    pub async fn start_cluster(&self, request: StartRequest) -> Result<ClusterRecord> {
        validate_name(&request.name)?;
        validate_size(request.size)?;
        validate_memory(&request.memory)?;

        if self.store.read(&request.name).await?.is_some() {
            return Err(OrchestratorError::Conflict(request.name));
        }

        let engine = self.engines.get_engine(&request.engine).await?;

        let session = self
            .credentials
            .acquire(&request.principal, self.credentials.keytab())
            .await?;
        let result = self.launch_and_record(&request, &engine, &session).await;
        self.credentials.release(session).await;
        result
    }

    async fn launch_and_record(
        &self,
        request: &StartRequest,
        engine: &Engine,
        session: &Session,
    ) -> Result<ClusterRecord> {
        let launched = self
            .launcher
            .start_cluster(
                &request.name,
                &engine.binary_path,
                request.size,
                &request.memory,
                session,
            )
            .await?;

        let record = ClusterRecord::started(
            &request.name,
            &engine.name,
            request.size,
            &request.memory,
            &request.principal,
            launched,
        );

        if let Err(e) = self.store.create(&record).await {
            warn!(
                cluster = %record.name,
                error = %e,
                "Failed to record started cluster, killing its job"
            );
            self.kill_orphan(&record, session).await;
            return Err(e);
        }

        info!(
            cluster = %record.name,
            address = record.address.as_deref().unwrap_or_default(),
            "Recorded started cluster"
        );
        Ok(record)
    }

    /// Kill a job whose record could not be stored.
    async fn kill_orphan(&self, record: &ClusterRecord, session: &Session) {
        let Some(application_id) = record.application_id.as_deref() else {
            return;
        };
        if let Err(e) = self
            .launcher
            .stop_cluster(application_id, &record.output_dir, session)
            .await
        {
            warn!(
                cluster = %record.name,
                application_id = %application_id,
                error = %e,
                "Failed to kill unrecorded cluster job"
            );
        }
    }

    /// Stop a `Started` or `Unknown` cluster and record it as `Stopped`.
    ///
    /// The record is left untouched when the kill fails. A leftover output
    /// directory does not fail the stop and is returned alongside the record.
    pub async fn stop_cluster(&self, name: &str) -> Result<StoppedCluster> {
        let mut record = self.require(name).await?;
        record.check_stoppable()?;

        let application_id = record
            .application_id
            .clone()
            .ok_or_else(|| OrchestratorError::invalid_state(name, "stop", record.state))?;

        let session = self
            .credentials
            .acquire(&record.owner, self.credentials.keytab())
            .await?;
        let outcome = self
            .launcher
            .stop_cluster(&application_id, &record.output_dir, &session)
            .await;
        self.credentials.release(session).await;
        let outcome = outcome?;

        if let Some(e) = &outcome.cleanup_error {
            warn!(
                cluster = %name,
                output_dir = %record.output_dir,
                error = %e,
                "Cluster stopped with leftover output directory"
            );
        }

        record.transition(ClusterState::Stopped, "stop")?;
        if let Err(e) = self.store.update(&record).await {
            error!(
                cluster = %name,
                application_id = %application_id,
                output_dir = %record.output_dir,
                error = %e,
                "Cluster job was killed but its record could not be marked stopped"
            );
            return Err(e);
        }

        info!(cluster = %name, "Cluster stopped");
        Ok(StoppedCluster {
            record,
            cleanup_error: outcome.cleanup_error,
        })
    }

    /// Delete a `Stopped` cluster's record.
    pub async fn delete_cluster(&self, name: &str) -> Result<()> {
        let record = self.require(name).await?;
        record.check_deletable()?;
        self.store.delete(name).await?;
        info!(cluster = %name, "Cluster deleted");
        Ok(())
    }

    pub async fn get_cluster(&self, name: &str) -> Result<ClusterRecord> {
        self.require(name).await
    }

    pub async fn list_clusters(&self) -> Result<Vec<ClusterRecord>> {
        self.store.list().await
    }

    /// Poll a cluster without changing its record.
    pub async fn cluster_health(&self, name: &str) -> Result<ClusterHealth> {
        let record = self.require(name).await?;
        self.poller.get_status(&record).await
    }

    /// Poll a cluster and commit what the poll implies.
    ///
    /// An unreachable `Started` cluster becomes `Unknown`; a reachable
    /// `Unknown` cluster becomes `Started` again. The poll error is still
    /// returned after the record is updated.
    pub async fn refresh_cluster(&self, name: &str) -> Result<ClusterStatus> {
        let mut record = self.require(name).await?;

        match self.poller.get_status(&record).await {
            Ok(health) => {
                if record.state == ClusterState::Unknown {
                    record.transition(ClusterState::Started, "refresh")?;
                    self.store.update(&record).await?;
                    info!(cluster = %name, "Cluster reachable again");
                }
                Ok(ClusterStatus { record, health })
            }
            Err(e @ OrchestratorError::Unreachable { .. }) => {
                if record.state == ClusterState::Started {
                    record.transition(ClusterState::Unknown, "refresh")?;
                    self.store.update(&record).await?;
                    warn!(cluster = %name, error = %e, "Cluster unreachable, state is now unknown");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn require(&self, name: &str) -> Result<ClusterRecord> {
        self.store
            .read(name)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(name.to_string()))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    let starts_alphanumeric = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());

    if name.len() > MAX_NAME_LEN || !valid_chars || !starts_alphanumeric {
        return Err(OrchestratorError::Validation(format!(
            "invalid cluster name {name:?}: use up to {MAX_NAME_LEN} letters, digits, '_', '-' or '.', starting with a letter or digit"
        )));
    }
    Ok(())
}

fn validate_size(size: u32) -> Result<()> {
    if size == 0 {
        return Err(OrchestratorError::Validation(
            "cluster size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_memory(memory: &str) -> Result<()> {
    let digits = memory.trim_end_matches(|c: char| "kKmMgGtT".contains(c));
    let unit_len = memory.len() - digits.len();
    let valid = unit_len <= 1 && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());

    if !valid {
        return Err(OrchestratorError::Validation(format!(
            "invalid memory {memory:?}: expected a number with an optional k, m, g or t suffix"
        )));
    }
    Ok(())
}
