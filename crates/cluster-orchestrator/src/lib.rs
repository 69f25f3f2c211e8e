//! Lifecycle orchestration for compute clusters on a YARN resource manager.
//!
//! Clusters are submitted by shelling out to the `hadoop` client under the
//! requesting principal's identity. The client's output is scanned while it
//! runs to recover the application id and a node endpoint, and the outcome is
//! recorded as a [`ClusterRecord`] whose state follows a small state machine
//! (`Started`, `Stopped`, `Unknown`).
//!
//! # Example
//!
//! ```rust,ignore
//! use cluster_orchestrator::{ClusterOrchestrator, OrchestratorConfig, StartRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = OrchestratorConfig::load("clusters.toml".as_ref())?;
//!     let orchestrator = ClusterOrchestrator::from_config(&config)?;
//!
//!     let record = orchestrator
//!         .start_cluster(StartRequest {
//!             name: "alpha".into(),
//!             engine: "h2o-3.20".into(),
//!             size: 2,
//!             memory: "4g".into(),
//!             principal: "alice".into(),
//!         })
//!         .await?;
//!     println!("started at {}", record.address.unwrap_or_default());
//!
//!     orchestrator.stop_cluster("alpha").await?;
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod health;
pub mod launcher;
pub mod orchestrator;
pub mod scanner;
pub mod store;

pub use cluster::{ClusterRecord, ClusterState, LaunchedCluster};
pub use config::OrchestratorConfig;
pub use credentials::{CredentialManager, Identity, Session};
pub use engine::{Engine, EngineRegistry, StaticEngineRegistry};
pub use error::{OrchestratorError, Result};
pub use health::{ClusterHealth, HealthPoller, HttpHealthPoller};
pub use launcher::{ClusterLauncher, StopOutcome, YarnLauncher};
pub use orchestrator::{ClusterOrchestrator, ClusterStatus, StartRequest, StoppedCluster};
pub use store::{ClusterStore, FileStore, MemoryStore};
