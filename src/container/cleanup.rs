//! Container and image cleanup.
//!
//! Both operations are best-effort: a target that is already stopped or
//! already gone counts as cleaned up, and any other failure is logged and
//! swallowed so the next case can still run.

use crate::container::{ContainerRuntime, ImageRef};
use tracing::{debug, warn};

/// What happened to one cleanup target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The target existed and was removed
    Removed,
    /// The target did not exist
    AlreadyGone,
    /// The runtime reported an error; it was logged
    Failed,
}

/// Stop and remove a container by name or ID.
pub async fn release(runtime: &dyn ContainerRuntime, name_or_id: &str) -> CleanupOutcome {
    match runtime.stop(name_or_id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() || e.is_not_modified() => {
            debug!("Container {} needed no stop: {}", name_or_id, e);
        }
        Err(e) => warn!("Unable to stop container {}: {}", name_or_id, e),
    }

    match runtime.remove(name_or_id).await {
        Ok(()) => CleanupOutcome::Removed,
        Err(e) if e.is_not_found() => {
            debug!("Container {} was already removed", name_or_id);
            CleanupOutcome::AlreadyGone
        }
        Err(e) => {
            warn!("Unable to remove container {}: {}", name_or_id, e);
            CleanupOutcome::Failed
        }
    }
}

/// Remove the pulled image to reclaim disk.
pub async fn remove_image(runtime: &dyn ContainerRuntime, image: &ImageRef) -> CleanupOutcome {
    match runtime.remove_image(image).await {
        Ok(()) => CleanupOutcome::Removed,
        Err(e) if e.is_not_found() => {
            debug!("Image {} was already removed", image);
            CleanupOutcome::AlreadyGone
        }
        Err(e) => {
            warn!("Unable to remove image {}: {}", image, e);
            CleanupOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRuntime;

    #[tokio::test]
    async fn test_release_missing_container_is_not_an_error() {
        let runtime = ScriptedRuntime::new();

        let outcome = release(&runtime, "9700001_case00001").await;

        assert_eq!(outcome, CleanupOutcome::AlreadyGone);
        let calls = runtime.calls();
        assert_eq!(calls.stops, 1);
        assert_eq!(calls.removes, 1);
        assert_eq!(calls.forced_stops, 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let runtime = ScriptedRuntime::new();
        runtime.insert_live("9700001_case00001");

        assert_eq!(
            release(&runtime, "9700001_case00001").await,
            CleanupOutcome::Removed
        );
        assert_eq!(
            release(&runtime, "9700001_case00001").await,
            CleanupOutcome::AlreadyGone
        );
        assert_eq!(runtime.calls().forced_stops, 1);
    }

    #[tokio::test]
    async fn test_remove_failure_is_reported_not_raised() {
        let runtime =
            ScriptedRuntime::new().failing_remove("driver failed to remove root filesystem");
        runtime.insert_live("9700001_case00001");

        let outcome = release(&runtime, "9700001_case00001").await;

        assert_eq!(outcome, CleanupOutcome::Failed);
        let calls = runtime.calls();
        assert_eq!(calls.stops, 1);
        assert_eq!(calls.removes, 1);
    }

    #[tokio::test]
    async fn test_stop_failure_still_attempts_remove() {
        let runtime = ScriptedRuntime::new().failing_stop("cannot kill container");
        runtime.insert_live("9700001_case00001");

        let outcome = release(&runtime, "9700001_case00001").await;

        assert_eq!(outcome, CleanupOutcome::Removed);
        let calls = runtime.calls();
        assert_eq!(calls.stops, 1);
        assert_eq!(calls.forced_stops, 0);
        assert_eq!(calls.removes, 1);
    }

    #[tokio::test]
    async fn test_remove_image_failure_is_absorbed() {
        let runtime = ScriptedRuntime::new().failing_image_removal("image in use");
        let image = ImageRef::new("team/model", "sha256:abcd").unwrap();

        assert_eq!(remove_image(&runtime, &image).await, CleanupOutcome::Failed);
        assert_eq!(runtime.calls().image_removals, 1);
    }
}
