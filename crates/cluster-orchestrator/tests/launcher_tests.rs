//! Integration tests for the resource-manager launcher.
//!
//! These run the real subprocess plumbing against a scripted fake `hadoop`
//! client, so they exercise concurrent stream scanning, fatal-line
//! cancellation, and output directory cleanup end to end.

#![cfg(unix)]

mod common;

use std::path::Path;
use std::time::{Duration, Instant};

use cluster_orchestrator::{ClusterLauncher, Identity, OrchestratorError, Session};
use common::{FakeHadoop, SUCCEED, TWO_NODE_LAUNCH};

fn session() -> Session {
    Session::unimpersonated("alice")
}

mod start_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_recovers_identifiers() {
        let hadoop = FakeHadoop::new(
            r#"    echo "H2O node 10.0.0.5:54321"
    echo "application_1699999999_0001"
    exit 0"#,
            SUCCEED,
            SUCCEED,
        );

        let launched = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap();

        assert_eq!(launched.address, "10.0.0.5:54321");
        assert_eq!(launched.application_id, "1699999999_0001");
        assert!(launched.output_dir.starts_with("steam/alpha_"));
        assert!(launched.output_dir.ends_with("_out"));
    }

    #[tokio::test]
    async fn test_start_passes_fixed_argument_order() {
        let hadoop = FakeHadoop::new(TWO_NODE_LAUNCH, SUCCEED, SUCCEED);

        let launched = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 2, "4g", &session())
            .await
            .unwrap();

        assert_eq!(
            hadoop.calls(),
            vec![format!(
                "jar /opt/h2odriver.jar -jobname STEAM_alpha -n 2 -mapperXmx 4g -output {} -disown",
                launched.output_dir
            )]
        );
        // Last endpoint wins; the application id came from stderr.
        assert_eq!(launched.address, "10.0.0.6:54321");
        assert_eq!(launched.application_id, "1699999999_0001");
    }

    #[tokio::test]
    async fn test_fatal_line_fails_despite_zero_exit() {
        let hadoop = FakeHadoop::new(
            r#"    echo "H2O node 10.0.0.5:54321"
    echo "application_1699999999_0001"
    echo "java.io.IOException: Connection refused" >&2
    exit 0"#,
            SUCCEED,
            SUCCEED,
        );

        let err = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ProcessFailure { diagnostics, .. } => {
                assert!(diagnostics.contains("IOException"), "{diagnostics}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let calls = hadoop.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with("fs -rmdir steam/alpha_"), "{calls:?}");
    }

    #[tokio::test]
    async fn test_fatal_line_terminates_long_running_submission() {
        let hadoop = FakeHadoop::new(
            r#"    echo "Exception in thread \"main\" java.lang.IllegalStateException"
    exec sleep 30"#,
            SUCCEED,
            SUCCEED,
        );

        let started = Instant::now();
        let err = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(20));
        assert!(matches!(err, OrchestratorError::ProcessFailure { .. }));
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_diagnostics() {
        let hadoop = FakeHadoop::new(
            r#"    echo "18/01/01 12:00:00 ERROR yarn: queue default is full" >&2
    echo "some unrelated line"
    exit 3"#,
            SUCCEED,
            SUCCEED,
        );

        let err = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ProcessFailure {
                exit_code,
                diagnostics,
                ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(diagnostics, "18/01/01 12:00:00 ERROR yarn: queue default is full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(hadoop.calls().iter().any(|c| c.starts_with("fs -rmdir")));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_failure() {
        let hadoop = FakeHadoop::new(
            r#"    echo "application_1699999999_0001"
    exit 0"#,
            SUCCEED,
            SUCCEED,
        );

        let err = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ProcessFailure { diagnostics, .. } => {
                assert!(diagnostics.contains("node endpoint"), "{diagnostics}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(hadoop.calls().iter().any(|c| c.starts_with("fs -rmdir")));
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_launch_failure() {
        let hadoop = FakeHadoop::new(
            r#"    echo "ERROR bad engine" >&2
    exit 1"#,
            SUCCEED,
            r#"    echo "rmdir: permission denied" >&2
    exit 1"#,
        );

        let err = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap_err();

        match err {
            OrchestratorError::ProcessFailure { diagnostics, .. } => {
                assert_eq!(diagnostics, "ERROR bad engine");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_failure() {
        let launcher = cluster_orchestrator::YarnLauncher::new(
            cluster_orchestrator::config::LauncherConfig {
                hadoop_bin: "/definitely/not/hadoop".into(),
                ..Default::default()
            },
        );

        let err = launcher
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 1, "4g", &session())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ProcessFailure { exit_code: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_runs_under_session_identity() {
        let hadoop = FakeHadoop::new(TWO_NODE_LAUNCH, SUCCEED, SUCCEED);
        let session = Session::as_identity("me", Identity::current());

        let launched = hadoop
            .launcher()
            .start_cluster("alpha", Path::new("/opt/h2odriver.jar"), 2, "4g", &session)
            .await
            .unwrap();
        assert_eq!(launched.address, "10.0.0.6:54321");
    }
}

mod stop_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_kills_then_removes_output_dir() {
        let hadoop = FakeHadoop::new(SUCCEED, r#"    echo "Killed job job_1699999999_0001"
    exit 0"#, SUCCEED);

        let outcome = hadoop
            .launcher()
            .stop_cluster("1699999999_0001", "steam/alpha_abcde_out", &session())
            .await
            .unwrap();

        assert!(outcome.cleanup_error.is_none());
        assert_eq!(
            hadoop.calls(),
            vec![
                "job -kill job_1699999999_0001".to_string(),
                "fs -rmdir steam/alpha_abcde_out".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_removal_failure_is_secondary() {
        let hadoop = FakeHadoop::new(
            SUCCEED,
            SUCCEED,
            r#"    echo "rmdir: steam/alpha_abcde_out: Directory is not empty" >&2
    exit 1"#,
        );

        let outcome = hadoop
            .launcher()
            .stop_cluster("1699999999_0001", "steam/alpha_abcde_out", &session())
            .await
            .unwrap();

        match outcome.cleanup_error {
            Some(OrchestratorError::ProcessFailure { diagnostics, .. }) => {
                assert!(diagnostics.contains("not empty"), "{diagnostics}");
            }
            other => panic!("unexpected cleanup result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_kill_output_fails_stop() {
        let hadoop = FakeHadoop::new(
            SUCCEED,
            r#"    echo "Exception in thread main: job_1699999999_0001 not found" >&2
    exit 0"#,
            SUCCEED,
        );

        let err = hadoop
            .launcher()
            .stop_cluster("1699999999_0001", "steam/alpha_abcde_out", &session())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ProcessFailure { .. }));
        assert_eq!(hadoop.calls(), vec!["job -kill job_1699999999_0001"]);
    }
}
