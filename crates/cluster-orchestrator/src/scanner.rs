//! Concurrent scanning of resource-manager subprocess output.
//!
//! Each subprocess gets one [`StreamScanner`] shared by two tasks, one per
//! output stream. Both tasks write into the same mutex-guarded
//! [`ScanReport`]; a fatal line cancels the scanner's token so the launcher
//! can terminate the subprocess while the streams keep draining.

use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};

/// Line announcing a node endpoint.
pub const NODE_PATTERN: &str = r"H2O node (\d+\.\d+\.\d+\.\d+:\d+)";
/// Line carrying the resource-manager application id.
pub const APPLICATION_PATTERN: &str = r"application_(\d+_\d+)";
/// Substring that fails the operation.
pub const FATAL_MARKER: &str = "Exception";
/// Substring that is kept as a diagnostic.
pub const WARNING_MARKER: &str = "ERROR";

/// Longest output line kept; the rest of a longer line is discarded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;
/// Upper bound on buffered diagnostic text.
pub const MAX_DIAGNOSTIC_BYTES: usize = 256 * 1024;

/// Compiled output patterns. Built fresh for every subprocess.
#[derive(Debug)]
pub struct ScanPatterns {
    node: Regex,
    application: Regex,
}

impl ScanPatterns {
    pub fn compile() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| OrchestratorError::Config(format!("{pattern}: {e}")))
        };
        Ok(Self {
            node: compile(NODE_PATTERN)?,
            application: compile(APPLICATION_PATTERN)?,
        })
    }
}

/// Signals and diagnostics collected from a subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Last node endpoint seen.
    pub endpoint: Option<String>,
    /// Last application id seen.
    pub application_id: Option<String>,
    /// Warning and fatal lines, newline terminated.
    pub diagnostics: String,
    /// Whether a fatal line was seen.
    pub fatal: bool,
    /// Whether diagnostic lines were dropped to stay under the cap.
    pub diagnostics_truncated: bool,
}

impl ScanReport {
    /// Fold one output line into the report. Returns `true` for a fatal line.
    pub fn observe(&mut self, line: &str, patterns: &ScanPatterns) -> bool {
        if let Some(caps) = patterns.node.captures(line) {
            self.endpoint = Some(caps[1].to_string());
        }
        if let Some(caps) = patterns.application.captures(line) {
            self.application_id = Some(caps[1].to_string());
        }

        let fatal = line.contains(FATAL_MARKER);
        if fatal || line.contains(WARNING_MARKER) {
            if self.diagnostics.len() + line.len() < MAX_DIAGNOSTIC_BYTES {
                self.diagnostics.push_str(line);
                self.diagnostics.push('\n');
            } else {
                self.diagnostics_truncated = true;
            }
        }
        if fatal {
            self.fatal = true;
        }
        fatal
    }
}

/// Scans the output streams of a single subprocess.
#[derive(Debug, Clone)]
pub struct StreamScanner {
    patterns: Arc<ScanPatterns>,
    report: Arc<Mutex<ScanReport>>,
    cancel: CancellationToken,
    cluster: String,
    principal: String,
}

impl StreamScanner {
    /// Create a scanner with fresh state for one subprocess.
    pub fn new(cluster: impl Into<String>, principal: impl Into<String>) -> Result<Self> {
        Ok(Self {
            patterns: Arc::new(ScanPatterns::compile()?),
            report: Arc::new(Mutex::new(ScanReport::default())),
            cancel: CancellationToken::new(),
            cluster: cluster.into(),
            principal: principal.into(),
        })
    }

    /// Token cancelled when a fatal line is seen.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Read `reader` line by line until it closes.
    ///
    /// Lines longer than [`MAX_LINE_BYTES`] are cut at the cap and the rest
    /// of the line is skipped.
    pub async fn scan<R>(&self, stream: &'static str, reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut skipping = false;

        loop {
            buf.clear();
            let read = (&mut reader)
                .take(MAX_LINE_BYTES as u64)
                .read_until(b'\n', &mut buf)
                .await;
            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(cluster = %self.cluster, stream, error = %e, "Failed reading subprocess output");
                    break;
                }
            }

            let complete = buf.last() == Some(&b'\n');
            if skipping {
                skipping = !complete;
                continue;
            }
            if !complete && buf.len() >= MAX_LINE_BYTES {
                warn!(
                    cluster = %self.cluster,
                    stream,
                    max_bytes = MAX_LINE_BYTES,
                    "Truncating overlong output line"
                );
                skipping = true;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            debug!(
                cluster = %self.cluster,
                principal = %self.principal,
                stream,
                "{line}"
            );

            let fatal = self.report.lock().await.observe(line, &self.patterns);
            if fatal && !self.cancel.is_cancelled() {
                warn!(cluster = %self.cluster, stream, "Fatal output detected: {line}");
                self.cancel.cancel();
            }
        }
    }

    /// Snapshot of everything collected so far.
    pub async fn report(&self) -> ScanReport {
        self.report.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe_all(lines: &[&str]) -> ScanReport {
        let patterns = ScanPatterns::compile().unwrap();
        let mut report = ScanReport::default();
        for line in lines {
            report.observe(line, &patterns);
        }
        report
    }

    #[test]
    fn test_extracts_endpoint_and_application() {
        let report = observe_all(&[
            "Determining driver host interface for mapper->driver callback...",
            "H2O node 10.0.0.5:54321 reports H2O cluster size 1",
            "Submitted application application_1699999999_0001",
        ]);

        assert_eq!(report.endpoint.as_deref(), Some("10.0.0.5:54321"));
        assert_eq!(report.application_id.as_deref(), Some("1699999999_0001"));
        assert!(report.diagnostics.is_empty());
        assert!(!report.fatal);
    }

    #[test]
    fn test_last_endpoint_wins() {
        let report = observe_all(&[
            "H2O node 10.0.0.5:54321 requested flatfile",
            "H2O node 10.0.0.6:54321 requested flatfile",
        ]);
        assert_eq!(report.endpoint.as_deref(), Some("10.0.0.6:54321"));
    }

    #[test]
    fn test_warning_lines_are_buffered() {
        let report = observe_all(&["18/01/01 ERROR mapreduce: disk quota low", "plain line"]);
        assert_eq!(report.diagnostics, "18/01/01 ERROR mapreduce: disk quota low\n");
        assert!(!report.fatal);
    }

    #[test]
    fn test_fatal_line_is_buffered_and_flagged() {
        let patterns = ScanPatterns::compile().unwrap();
        let mut report = ScanReport::default();

        assert!(report.observe("java.io.IOException: no route to host", &patterns));
        assert!(report.fatal);
        assert!(report.diagnostics.contains("IOException"));
    }

    #[test]
    fn test_endpoint_requires_dotted_quad() {
        let report = observe_all(&["H2O node localhost:54321"]);
        assert!(report.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_scan_two_streams_into_one_report() {
        let scanner = StreamScanner::new("alpha", "alice").unwrap();
        let stdout: &[u8] = b"H2O node 10.0.0.5:54321\n\napplication_1699999999_0001\n";
        let stderr: &[u8] = b"WARN noisy\nERROR something odd\n";

        tokio::join!(scanner.scan("stdout", stdout), scanner.scan("stderr", stderr));

        let report = scanner.report().await;
        assert_eq!(report.endpoint.as_deref(), Some("10.0.0.5:54321"));
        assert_eq!(report.application_id.as_deref(), Some("1699999999_0001"));
        assert_eq!(report.diagnostics, "ERROR something odd\n");
        assert!(!scanner.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_fatal_line_cancels_but_keeps_draining() {
        let scanner = StreamScanner::new("alpha", "alice").unwrap();
        let stderr: &[u8] = b"Exception in thread main\nH2O node 10.0.0.9:54321\n";

        scanner.scan("stderr", stderr).await;

        let report = scanner.report().await;
        assert!(scanner.cancellation().is_cancelled());
        assert!(report.fatal);
        assert_eq!(report.endpoint.as_deref(), Some("10.0.0.9:54321"));
    }

    #[tokio::test]
    async fn test_overlong_line_is_truncated() {
        let scanner = StreamScanner::new("alpha", "alice").unwrap();
        let mut output = b"ERROR ".to_vec();
        output.extend(std::iter::repeat(b'x').take(3 * MAX_LINE_BYTES));
        output.extend_from_slice(b" Exception hidden past the cap\nH2O node 10.0.0.5:54321\n");

        scanner.scan("stdout", &output[..]).await;

        let report = scanner.report().await;
        assert_eq!(report.endpoint.as_deref(), Some("10.0.0.5:54321"));
        assert!(!report.fatal);
        assert!(report.diagnostics.starts_with("ERROR xxx"));
        assert!(report.diagnostics.len() <= MAX_LINE_BYTES + 1);
    }

    #[test]
    fn test_diagnostics_are_capped() {
        let patterns = ScanPatterns::compile().unwrap();
        let mut report = ScanReport::default();
        let line = format!("ERROR {}", "y".repeat(1000));

        for _ in 0..300 {
            report.observe(&line, &patterns);
        }
        assert!(report.observe("java.lang.RuntimeException: late", &patterns));

        assert!(report.diagnostics.len() < MAX_DIAGNOSTIC_BYTES);
        assert!(report.diagnostics_truncated);
        assert!(report.fatal);
    }

    #[tokio::test]
    async fn test_scanners_do_not_share_state() {
        let first = StreamScanner::new("alpha", "alice").unwrap();
        let second = StreamScanner::new("beta", "alice").unwrap();

        first.scan("stdout", &b"Exception\n"[..]).await;

        assert!(first.report().await.fatal);
        assert_eq!(second.report().await, ScanReport::default());
        assert!(!second.cancellation().is_cancelled());
    }
}
