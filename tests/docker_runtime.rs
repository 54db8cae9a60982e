//! Integration tests against a live Docker/Podman daemon.
//!
//! Tests are skipped if no daemon is available or SKIP_CONTAINER_TESTS=1.
//! The full-run test additionally needs SUBRUN_TEST_IMAGE set to a
//! `repository@digest` reference whose entrypoint exits on its own.

use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use subrun::container::cleanup::{self, CleanupOutcome};
use subrun::container::{ContainerClient, ContainerRuntime, DockerRuntime, ImageRef};
use subrun::{RunRequest, RunnerSettings, SubmissionRunner, TerminalReason};
use tempfile::TempDir;
use test_tag::tag;

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS")
        && (value == "1" || value.eq_ignore_ascii_case("true"))
    {
        return false;
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        || std::process::Command::new("podman")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_client_connection() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker/Podman not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let client = ContainerClient::new().await;
    assert!(
        client.is_ok(),
        "Failed to connect to Docker/Podman: {:?}",
        client.err()
    );

    let client = client.unwrap();
    assert!(client.ping().await.is_ok());
    assert!(client.runtime_type().await.is_ok());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_release_of_unknown_container_is_already_gone() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let runtime = DockerRuntime::connect().await.expect("Failed to connect");

    let outcome = cleanup::release(&runtime, "subrun_test_missing_case00000").await;
    assert_eq!(outcome, CleanupOutcome::AlreadyGone);

    // Releasing twice is the same as releasing once
    let outcome = cleanup::release(&runtime, "subrun_test_missing_case00000").await;
    assert_eq!(outcome, CleanupOutcome::AlreadyGone);
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_live_set_excludes_unknown_names() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let runtime = DockerRuntime::connect().await.expect("Failed to connect");
    let live = runtime.list_live().await.expect("Failed to list containers");

    assert!(live.iter().all(|h| !h.name().starts_with('/')));
    assert!(live.iter().all(|h| h.name() != "subrun_test_missing_case00000"));
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_submission_run_against_daemon() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }
    let Ok(reference) = std::env::var("SUBRUN_TEST_IMAGE") else {
        eprintln!("Skipping full run (SUBRUN_TEST_IMAGE not set)");
        return;
    };
    let image: ImageRef = reference.parse().expect("SUBRUN_TEST_IMAGE is not repo@digest");

    let input = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    std::fs::create_dir(input.path().join("BraTS2021_00001")).unwrap();

    let runtime = Arc::new(DockerRuntime::connect().await.expect("Failed to connect"));
    let runner = SubmissionRunner::new(runtime, None).with_settings(RunnerSettings {
        poll_interval_secs: 1,
        accelerator: false,
        ..RunnerSettings::default()
    });

    let request = RunRequest {
        submission_id: "subrun_test".to_string(),
        image,
        input_dir: input.path().to_path_buf(),
        work_dir: work.path().to_path_buf(),
        parent_id: "local".to_string(),
        quota: Some(Duration::from_secs(120)),
        status: None,
        credentials: None,
    };

    // The image decides whether it writes results; both outcomes are valid,
    // but every case must reach a terminal state and leave no container behind.
    match runner.run(&request).await {
        Ok(summary) => {
            assert_eq!(summary.cases.len(), 1);
            assert_ne!(summary.cases[0].terminal_reason, TerminalReason::LaunchFailed);
        }
        Err(e) => assert!(e.is_fatal_precondition(), "unexpected error: {}", e),
    }

    let runtime = DockerRuntime::connect().await.expect("Failed to connect");
    let live = runtime.list_live().await.unwrap();
    assert!(live.iter().all(|h| h.name() != "subrun_test_case00001"));
}
