//! Resource-manager submission and teardown.
//!
//! The launcher shells out to the resource-manager client, runs it under the
//! caller's [`Session`], and scans both output streams while it runs. It does
//! not supervise the submitted job: the submission command is run with
//! `-disown` and the cluster outlives it.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cluster::LaunchedCluster;
use crate::config::LauncherConfig;
use crate::credentials::Session;
use crate::error::{OrchestratorError, Result};
use crate::scanner::{ScanReport, StreamScanner};

/// Length of the random suffix in output directory names.
const OUTPUT_SUFFIX_LEN: usize = 5;

/// Characters used in output directory suffixes.
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Result of a successful stop.
#[derive(Debug, Default)]
pub struct StopOutcome {
    /// Set when the job was killed but its output directory could not be removed.
    pub cleanup_error: Option<OrchestratorError>,
}

/// Submits and kills clusters on the resource manager.
#[async_trait]
pub trait ClusterLauncher: Send + Sync {
    /// Submit a cluster and wait for the submission command to exit.
    async fn start_cluster(
        &self,
        name: &str,
        engine_path: &Path,
        size: u32,
        memory: &str,
        session: &Session,
    ) -> Result<LaunchedCluster>;

    /// Kill the job `application_id` and remove `output_dir`.
    async fn stop_cluster(
        &self,
        application_id: &str,
        output_dir: &str,
        session: &Session,
    ) -> Result<StopOutcome>;
}

/// Exit status and scanned output of a finished subprocess.
#[derive(Debug)]
struct ProcessOutcome {
    command: String,
    status: ExitStatus,
    report: ScanReport,
}

impl ProcessOutcome {
    /// Fail on a non-zero exit or any fatal line, whichever applies.
    fn into_report(self) -> Result<ScanReport> {
        if self.status.success() && !self.report.fatal {
            return Ok(self.report);
        }

        let mut diagnostics = if self.report.diagnostics.trim().is_empty() {
            "no diagnostic output".to_string()
        } else {
            self.report.diagnostics.trim_end().to_string()
        };
        if self.report.diagnostics_truncated {
            diagnostics.push_str("\n(further diagnostics truncated)");
        }
        Err(OrchestratorError::ProcessFailure {
            command: self.command,
            exit_code: self.status.code(),
            diagnostics,
        })
    }
}

/// [`ClusterLauncher`] backed by the `hadoop` command line client.
#[derive(Debug, Clone)]
pub struct YarnLauncher {
    config: LauncherConfig,
}

impl YarnLauncher {
    #[must_use]
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    fn binary(&self) -> &Path {
        &self.config.hadoop_bin
    }

    /// Unique output directory for one launch of `name`.
    #[must_use]
    pub fn output_dir_for(&self, name: &str) -> String {
        let mut rng = StdRng::from_entropy();
        let suffix: String = (0..OUTPUT_SUFFIX_LEN)
            .map(|_| char::from(SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())]))
            .collect();

        let base = self.config.output_base.trim_end_matches('/');
        if base.is_empty() {
            format!("{name}_{suffix}_out")
        } else {
            format!("{base}/{name}_{suffix}_out")
        }
    }

    /// Arguments of the submission command, in the order the client expects.
    #[must_use]
    pub fn submit_args(
        &self,
        name: &str,
        engine_path: &Path,
        size: u32,
        memory: &str,
        output_dir: &str,
    ) -> Vec<String> {
        vec![
            "jar".to_string(),
            engine_path.display().to_string(),
            "-jobname".to_string(),
            format!("{}{name}", self.config.job_name_prefix),
            "-n".to_string(),
            size.to_string(),
            "-mapperXmx".to_string(),
            memory.to_string(),
            "-output".to_string(),
            output_dir.to_string(),
            "-disown".to_string(),
        ]
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.binary().display(), args.join(" "))
    }

    /// Run the client with `args`, scanning stdout and stderr concurrently.
    ///
    /// A fatal line terminates the subprocess; the call still waits for it
    /// to exit and for both streams to drain.
    async fn run_scanned(
        &self,
        label: &str,
        args: Vec<String>,
        session: &Session,
    ) -> Result<ProcessOutcome> {
        let command = self.command_line(&args);
        let spawn_failure = |message: String| OrchestratorError::ProcessFailure {
            command: command.clone(),
            exit_code: None,
            diagnostics: message,
        };

        let mut cmd = Command::new(self.binary());
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        session.apply(&mut cmd);

        debug!(cluster = %label, command = %command, "Spawning resource-manager command");
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_failure(format!("failed to spawn: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failure("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_failure("failed to capture stderr".to_string()))?;

        let scanner = StreamScanner::new(label, session.principal())?;
        let cancel = scanner.cancellation();

        let mut streams = JoinSet::new();
        {
            let scanner = scanner.clone();
            streams.spawn(async move { scanner.scan("stdout", stdout).await });
        }
        {
            let scanner = scanner.clone();
            streams.spawn(async move { scanner.scan("stderr", stderr).await });
        }

        let waited = tokio::select! {
            status = child.wait() => status,
            () = cancel.cancelled() => {
                warn!(cluster = %label, "Terminating resource-manager command after fatal output");
                if let Err(e) = child.start_kill() {
                    debug!(cluster = %label, error = %e, "Subprocess already exited");
                }
                child.wait().await
            }
        };
        let status =
            waited.map_err(|e| spawn_failure(format!("failed waiting on subprocess: {e}")))?;

        while let Some(joined) = streams.join_next().await {
            if let Err(e) = joined {
                warn!(cluster = %label, error = %e, "Output scanner task failed");
            }
        }

        Ok(ProcessOutcome {
            command,
            status,
            report: scanner.report().await,
        })
    }

    /// Remove `output_dir` on the resource manager's filesystem.
    pub async fn remove_output_dir(&self, output_dir: &str, session: &Session) -> Result<()> {
        let args = vec!["fs".to_string(), "-rmdir".to_string(), output_dir.to_string()];
        let command = self.command_line(&args);

        let mut cmd = Command::new(self.binary());
        cmd.args(&args).stdin(Stdio::null());
        session.apply(&mut cmd);

        let output = cmd
            .output()
            .await
            .map_err(|e| OrchestratorError::ProcessFailure {
                command: command.clone(),
                exit_code: None,
                diagnostics: format!("failed to spawn: {e}"),
            })?;

        if output.status.success() {
            debug!(output_dir = %output_dir, "Removed output directory");
            return Ok(());
        }

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostics.is_empty() {
            diagnostics = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Err(OrchestratorError::ProcessFailure {
            command,
            exit_code: output.status.code(),
            diagnostics,
        })
    }

    /// Best-effort removal after a failed launch.
    async fn discard_output_dir(&self, name: &str, output_dir: &str, session: &Session) {
        if let Err(e) = self.remove_output_dir(output_dir, session).await {
            warn!(cluster = %name, output_dir = %output_dir, error = %e, "Failed to remove output directory");
        }
    }
}

#[async_trait]
impl ClusterLauncher for YarnLauncher {
    async fn start_cluster(
        &self,
        name: &str,
        engine_path: &Path,
        size: u32,
        memory: &str,
        session: &Session,
    ) -> Result<LaunchedCluster> {
        let output_dir = self.output_dir_for(name);
        let args = self.submit_args(name, engine_path, size, memory, &output_dir);

        info!(
            cluster = %name,
            principal = %session.principal(),
            size,
            memory = %memory,
            output_dir = %output_dir,
            "Submitting cluster"
        );

        let report = match self
            .run_scanned(name, args, session)
            .await
            .and_then(ProcessOutcome::into_report)
        {
            Ok(report) => report,
            Err(e) => {
                warn!(cluster = %name, error = %e, "Cluster submission failed");
                self.discard_output_dir(name, &output_dir, session).await;
                return Err(e);
            }
        };

        match (report.application_id, report.endpoint) {
            (Some(application_id), Some(address)) => {
                info!(
                    cluster = %name,
                    application_id = %application_id,
                    address = %address,
                    "Cluster started"
                );
                Ok(LaunchedCluster {
                    application_id,
                    address,
                    output_dir,
                })
            }
            (application_id, address) => {
                let missing = match (application_id, address) {
                    (None, None) => "an application id or a node endpoint",
                    (None, Some(_)) => "an application id",
                    _ => "a node endpoint",
                };
                self.discard_output_dir(name, &output_dir, session).await;
                Err(OrchestratorError::ProcessFailure {
                    command: self.binary().display().to_string(),
                    exit_code: Some(0),
                    diagnostics: format!("submission exited without reporting {missing}"),
                })
            }
        }
    }

    async fn stop_cluster(
        &self,
        application_id: &str,
        output_dir: &str,
        session: &Session,
    ) -> Result<StopOutcome> {
        let args = vec![
            "job".to_string(),
            "-kill".to_string(),
            format!("job_{application_id}"),
        ];

        info!(
            application_id = %application_id,
            principal = %session.principal(),
            "Killing cluster job"
        );
        self.run_scanned(application_id, args, session)
            .await?
            .into_report()?;

        Ok(StopOutcome {
            cleanup_error: self.remove_output_dir(output_dir, session).await.err(),
        })
    }
}

impl Default for YarnLauncher {
    fn default() -> Self {
        Self::new(LauncherConfig::default())
    }
}
