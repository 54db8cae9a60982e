//! Detached container launch.
//!
//! A failed launch never leaves a container behind: the attempted name is
//! released before the failure is reported, and no handle is produced.

use crate::container::{ContainerRuntime, LaunchSpec, RunHandle, cleanup};
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{error, info};

/// Result of launching one case.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The container is running
    Launched {
        /// Handle owned by the case pipeline
        handle: RunHandle,
        /// Wall-clock launch time
        started_at: DateTime<Utc>,
        /// Monotonic launch time the quota is measured from
        started: Instant,
    },
    /// The launch failed; nothing was left running
    Failed {
        /// Error text for the case log
        error: String,
    },
}

impl LaunchOutcome {
    /// Whether a live handle was obtained.
    pub fn is_launched(&self) -> bool {
        matches!(self, LaunchOutcome::Launched { .. })
    }
}

/// Launch one detached container for `spec`.
pub async fn launch(runtime: &dyn ContainerRuntime, spec: &LaunchSpec) -> LaunchOutcome {
    info!("Running container {} from {}", spec.name, spec.image);

    let started_at = Utc::now();
    let started = Instant::now();

    match runtime.run(spec).await {
        Ok(handle) => LaunchOutcome::Launched {
            handle,
            started_at,
            started,
        },
        Err(e) => {
            error!("Failed to launch container {}: {}", spec.name, e);
            cleanup::release(runtime, &spec.name).await;
            LaunchOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ImageRef;
    use crate::testing::ScriptedRuntime;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            image: ImageRef::new("team/model", "sha256:abcd").unwrap(),
            name: "9700001_case00001".to_string(),
            mounts: Vec::new(),
            network_disabled: true,
            accelerator: true,
            labels: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_launch_returns_handle() {
        let runtime = ScriptedRuntime::new();

        let outcome = launch(&runtime, &spec()).await;

        match outcome {
            LaunchOutcome::Launched { handle, .. } => {
                assert_eq!(handle.name(), "9700001_case00001");
            }
            LaunchOutcome::Failed { error } => panic!("unexpected failure: {}", error),
        }
        assert_eq!(runtime.calls().removes, 0);
    }

    #[tokio::test]
    async fn test_failed_launch_releases_attempted_name() {
        let runtime = ScriptedRuntime::new().failing_launch("could not select device driver");

        let outcome = launch(&runtime, &spec()).await;

        assert!(!outcome.is_launched());
        if let LaunchOutcome::Failed { error } = outcome {
            assert!(error.contains("could not select device driver"));
        }
        let calls = runtime.calls();
        assert_eq!(calls.runs, 1);
        assert_eq!(calls.stops, 1);
        assert_eq!(calls.removes, 1);
    }
}
