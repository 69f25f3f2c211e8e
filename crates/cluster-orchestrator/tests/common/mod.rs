//! Shared helpers for integration tests.
//!
//! `FakeHadoop` writes a shell script that stands in for the `hadoop` client:
//! it appends its arguments to a call log and then runs one of the scripted
//! behaviours selected by its first argument.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use cluster_orchestrator::config::LauncherConfig;
use cluster_orchestrator::YarnLauncher;
use tempfile::TempDir;

/// A scripted stand-in for the resource-manager client.
pub struct FakeHadoop {
    pub dir: TempDir,
    pub bin: PathBuf,
    pub calls: PathBuf,
}

impl FakeHadoop {
    /// Build a fake client. Each body is a shell fragment run for the
    /// corresponding subcommand (`jar`, `job`, `fs`).
    pub fn new(jar: &str, job: &str, fs: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("hadoop");
        let calls = dir.path().join("calls.log");

        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{calls}'
case "$1" in
  jar)
{jar}
    ;;
  job)
{job}
    ;;
  fs)
{fs}
    ;;
esac
"#,
            calls = calls.display(),
        );
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, bin, calls }
    }

    /// Launcher configured to use this fake client.
    pub fn launcher(&self) -> YarnLauncher {
        YarnLauncher::new(LauncherConfig {
            hadoop_bin: self.bin.clone(),
            ..LauncherConfig::default()
        })
    }

    /// Every recorded invocation, one argument string per call.
    pub fn calls(&self) -> Vec<String> {
        match std::fs::read_to_string(&self.calls) {
            Ok(content) => content.lines().map(String::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Submission output of a healthy two-node launch.
pub const TWO_NODE_LAUNCH: &str = r#"    echo "Determining driver host interface for mapper->driver callback..."
    echo "H2O node 10.0.0.5:54321 reports H2O cluster size 1"
    echo "H2O node 10.0.0.6:54321 reports H2O cluster size 2"
    echo "Submitted application application_1699999999_0001" >&2
    exit 0"#;

/// A successful command with no output.
pub const SUCCEED: &str = "    exit 0";
