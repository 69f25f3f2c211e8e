//! Cluster records and their lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Lifecycle state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    /// The submission job succeeded and the cluster is presumed running.
    Started,
    /// The cluster was stopped through the orchestrator.
    Stopped,
    /// A health poll could not reach the recorded address.
    Unknown,
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl ClusterState {
    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Started | Self::Unknown, Self::Stopped)
                | (Self::Started, Self::Unknown)
                | (Self::Unknown, Self::Started)
        )
    }

    /// Stop is permitted from every state except `Stopped`.
    #[must_use]
    pub fn can_stop(self) -> bool {
        self.can_transition_to(Self::Stopped)
    }

    /// Only stopped clusters may be deleted.
    #[must_use]
    pub fn can_delete(self) -> bool {
        self == Self::Stopped
    }
}

/// Identifiers recovered from a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchedCluster {
    /// Resource-manager job identifier (without the `application_` prefix).
    pub application_id: String,
    /// `host:port` of a representative node.
    pub address: String,
    /// Scratch directory used by the submission job.
    pub output_dir: String,
}

/// Durable record of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    /// Unique cluster name.
    pub name: String,
    /// Engine the cluster was built from.
    pub engine: String,
    /// Requested node count.
    pub size: u32,
    /// Per-node memory ceiling (e.g. `4g`).
    pub memory: String,
    /// Principal the cluster was launched for.
    pub owner: String,
    /// Resource-manager job identifier, set once the cluster has started.
    pub application_id: Option<String>,
    /// Node endpoint, set once the cluster has started.
    pub address: Option<String>,
    /// Scratch directory of the submission job.
    pub output_dir: String,
    /// Current lifecycle state.
    pub state: ClusterState,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl ClusterRecord {
    /// Build the record for a cluster whose submission just succeeded.
    #[must_use]
    pub fn started(
        name: impl Into<String>,
        engine: impl Into<String>,
        size: u32,
        memory: impl Into<String>,
        owner: impl Into<String>,
        launched: LaunchedCluster,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            engine: engine.into(),
            size,
            memory: memory.into(),
            owner: owner.into(),
            application_id: Some(launched.application_id),
            address: Some(launched.address),
            output_dir: launched.output_dir,
            state: ClusterState::Started,
            created_at: now,
            modified_at: now,
        }
    }

    /// Move the record to `next`, refusing transitions the state machine forbids.
    pub fn transition(&mut self, next: ClusterState, operation: &'static str) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestratorError::invalid_state(
                &self.name, operation, self.state,
            ));
        }
        self.state = next;
        self.modified_at = Utc::now();
        Ok(())
    }

    /// Ensure the record may be stopped.
    pub fn check_stoppable(&self) -> Result<()> {
        if self.state.can_stop() {
            Ok(())
        } else {
            Err(OrchestratorError::invalid_state(&self.name, "stop", self.state))
        }
    }

    /// Ensure the record may be deleted.
    pub fn check_deletable(&self) -> Result<()> {
        if self.state.can_delete() {
            Ok(())
        } else {
            Err(OrchestratorError::invalid_state(&self.name, "delete", self.state))
        }
    }
}
