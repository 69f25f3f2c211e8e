//! Live cluster status polling.
//!
//! The poller talks to the cluster's own REST endpoint at its recorded
//! address, not to the resource manager. It never touches the datastore;
//! callers decide what a failed poll means for the record.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::{ClusterRecord, ClusterState};
use crate::error::{OrchestratorError, Result};

/// Path of the cluster status resource.
const STATUS_PATH: &str = "/3/Cloud";

/// Health and capacity reported by a live cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub is_healthy: bool,
    pub engine_version: String,
    /// Sum of CPUs over all nodes.
    pub total_cpu: u32,
    /// Sum of CPUs the engine may use over all nodes.
    pub allowed_cpu: u32,
    /// Sum of per-node memory ceilings.
    pub total_memory_bytes: u64,
}

/// Queries a cluster's status.
#[async_trait]
pub trait HealthPoller: Send + Sync {
    /// Poll the cluster described by `record`.
    ///
    /// Stopped clusters and records without an address are rejected with
    /// `InvalidState`; an unreachable cluster yields `Unreachable`.
    async fn get_status(&self, record: &ClusterRecord) -> Result<ClusterHealth>;
}

#[derive(Debug, Deserialize)]
struct CloudResponse {
    #[serde(default)]
    version: String,
    #[serde(default)]
    cloud_healthy: bool,
    #[serde(default)]
    nodes: Vec<NodeResponse>,
}

#[derive(Debug, Deserialize)]
struct NodeResponse {
    #[serde(default)]
    max_mem: u64,
    #[serde(default)]
    num_cpus: u32,
    #[serde(default)]
    cpus_allowed: u32,
}

impl From<CloudResponse> for ClusterHealth {
    fn from(cloud: CloudResponse) -> Self {
        let (total_cpu, allowed_cpu, total_memory_bytes) = cloud.nodes.iter().fold(
            (0u32, 0u32, 0u64),
            |(cpu, allowed, mem), node| {
                (
                    cpu.saturating_add(node.num_cpus),
                    allowed.saturating_add(node.cpus_allowed),
                    mem.saturating_add(node.max_mem),
                )
            },
        );
        Self {
            is_healthy: cloud.cloud_healthy,
            engine_version: cloud.version,
            total_cpu,
            allowed_cpu,
            total_memory_bytes,
        }
    }
}

/// [`HealthPoller`] that calls the cluster's HTTP status endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthPoller {
    client: Client,
}

impl HttpHealthPoller {
    /// Create a poller whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Status URL for a `host:port` address.
    #[must_use]
    pub fn status_url(address: &str) -> String {
        let base = address.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{STATUS_PATH}")
        } else {
            format!("http://{base}{STATUS_PATH}")
        }
    }
}

#[async_trait]
impl HealthPoller for HttpHealthPoller {
    async fn get_status(&self, record: &ClusterRecord) -> Result<ClusterHealth> {
        if record.state == ClusterState::Stopped {
            return Err(OrchestratorError::invalid_state(
                &record.name,
                "poll",
                record.state,
            ));
        }
        let address = record.address.as_deref().ok_or_else(|| {
            OrchestratorError::invalid_state(&record.name, "poll", record.state)
        })?;

        let unreachable = |message: String| OrchestratorError::Unreachable {
            name: record.name.clone(),
            address: address.to_string(),
            message,
        };

        let url = Self::status_url(address);
        debug!(cluster = %record.name, url = %url, "Polling cluster status");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unreachable(format!("HTTP {status}: {}", body.trim())));
        }

        let cloud: CloudResponse = response
            .json()
            .await
            .map_err(|e| unreachable(format!("invalid status response: {e}")))?;

        Ok(cloud.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_url() {
        assert_eq!(
            HttpHealthPoller::status_url("10.0.0.5:54321"),
            "http://10.0.0.5:54321/3/Cloud"
        );
        assert_eq!(
            HttpHealthPoller::status_url("http://127.0.0.1:8080/"),
            "http://127.0.0.1:8080/3/Cloud"
        );
    }

    #[test]
    fn test_totals_are_summed_over_nodes() {
        let cloud: CloudResponse = serde_json::from_value(serde_json::json!({
            "version": "3.20.0.2",
            "cloud_healthy": true,
            "nodes": [
                { "max_mem": 4_294_967_296u64, "num_cpus": 8, "cpus_allowed": 4 },
                { "max_mem": 4_294_967_296u64, "num_cpus": 8, "cpus_allowed": 8 }
            ]
        }))
        .unwrap();

        let health = ClusterHealth::from(cloud);
        assert!(health.is_healthy);
        assert_eq!(health.engine_version, "3.20.0.2");
        assert_eq!(health.total_cpu, 16);
        assert_eq!(health.allowed_cpu, 12);
        assert_eq!(health.total_memory_bytes, 8_589_934_592);
    }

    #[test]
    fn test_missing_fields_default() {
        let cloud: CloudResponse = serde_json::from_str("{}").unwrap();
        let health = ClusterHealth::from(cloud);
        assert!(!health.is_healthy);
        assert_eq!(health.total_cpu, 0);
    }
}
