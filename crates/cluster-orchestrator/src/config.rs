//! Orchestrator configuration.
//!
//! Configuration is read from a TOML file; every field has a default so an
//! empty file is valid. A handful of `CLUSTER_ORCH_*` environment variables
//! override the file for deployments that inject settings at runtime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Resource-manager client binary.
const ENV_HADOOP_BIN: &str = "CLUSTER_ORCH_HADOOP_BIN";
/// Enables impersonation (`true`/`1`).
const ENV_IMPERSONATE: &str = "CLUSTER_ORCH_IMPERSONATE";
/// Keytab used for ticket issuance.
const ENV_KEYTAB: &str = "CLUSTER_ORCH_KEYTAB";
/// Datastore directory.
const ENV_STATE_DIR: &str = "CLUSTER_ORCH_STATE_DIR";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Subprocess settings for the resource manager.
    pub launcher: LauncherConfig,
    /// Impersonation and ticket settings.
    pub credentials: CredentialConfig,
    /// Live-cluster polling settings.
    pub health: HealthConfig,
    /// Where cluster records are persisted.
    pub store: StoreConfig,
    /// Engine name to engine package path.
    pub engines: BTreeMap<String, PathBuf>,
}

/// Settings for the submission, kill, and removal commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Resource-manager client binary (`hadoop`).
    pub hadoop_bin: PathBuf,
    /// Prefix prepended to the cluster name to form the job name.
    pub job_name_prefix: String,
    /// Directory under which per-launch output directories are created.
    pub output_base: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            hadoop_bin: PathBuf::from("hadoop"),
            job_name_prefix: "STEAM_".to_string(),
            output_base: "steam".to_string(),
        }
    }
}

/// Impersonation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Run subprocesses as the requesting principal with a fresh ticket.
    pub impersonate: bool,
    /// Keytab passed to `kinit`.
    pub keytab: PathBuf,
    /// Ticket issuance binary.
    pub kinit_bin: PathBuf,
    /// Ticket teardown binary.
    pub kdestroy_bin: PathBuf,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            impersonate: false,
            keytab: PathBuf::from("/etc/security/keytabs/orchestrator.keytab"),
            kinit_bin: PathBuf::from("kinit"),
            kdestroy_bin: PathBuf::from("kdestroy"),
        }
    }
}

/// Health polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl HealthConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Datastore settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `clusters.json`.
    pub state_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".clusters"),
        }
    }
}

impl OrchestratorConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(OrchestratorError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `CLUSTER_ORCH_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bin) = lookup(ENV_HADOOP_BIN) {
            self.launcher.hadoop_bin = PathBuf::from(bin);
        }
        if let Some(flag) = lookup(ENV_IMPERSONATE) {
            self.credentials.impersonate = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
        if let Some(keytab) = lookup(ENV_KEYTAB) {
            self.credentials.keytab = PathBuf::from(keytab);
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.store.state_dir = PathBuf::from(dir);
        }
    }
}
