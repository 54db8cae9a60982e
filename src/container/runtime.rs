//! Container runtime collaborator.
//!
//! The pipeline never talks to bollard directly; it goes through
//! [`ContainerRuntime`] so the daemon can be swapped for a scripted stand-in.

use crate::container::{ImageRef, MountSpec, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Reference to a launched container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunHandle {
    id: String,
    name: String,
}

impl RunHandle {
    /// Create a handle from the daemon-assigned ID and the requested name.
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Daemon-assigned container ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shortened ID for log lines.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

/// Everything needed to launch one workload instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Image to run
    pub image: ImageRef,
    /// Unique container name
    pub name: String,
    /// Bind mounts
    pub mounts: Vec<MountSpec>,
    /// Disable all networking inside the container
    pub network_disabled: bool,
    /// Request the accelerator runtime
    pub accelerator: bool,
    /// Labels attached to the container
    pub labels: Vec<(String, String)>,
}

/// Registry login.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// Registry address, e.g. `https://docker.synapse.org`
    pub server: String,
    /// Registry user
    pub username: String,
    /// Registry password or token
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Operations the pipeline consumes from a container runtime.
///
/// `stop` and `remove` address containers by name or ID so that a launch
/// that never produced a handle can still be cleaned up.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Register credentials for subsequent image pulls.
    async fn authenticate(&self, credentials: &RegistryCredentials) -> Result<()>;

    /// Start one detached container and return its handle.
    async fn run(&self, spec: &LaunchSpec) -> Result<RunHandle>;

    /// Handles of all running containers.
    async fn list_live(&self) -> Result<Vec<RunHandle>>;

    /// Full combined stdout/stderr history of a container.
    async fn logs(&self, handle: &RunHandle) -> Result<Vec<u8>>;

    /// Stop a container. Stopping a stopped container succeeds.
    async fn stop(&self, name_or_id: &str) -> Result<()>;

    /// Remove a container.
    async fn remove(&self, name_or_id: &str) -> Result<()>;

    /// Remove an image.
    async fn remove_image(&self, image: &ImageRef) -> Result<()>;

    /// Whether the handle is in the live set.
    async fn is_live(&self, handle: &RunHandle) -> Result<bool> {
        Ok(self
            .list_live()
            .await?
            .iter()
            .any(|live| live.id() == handle.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        let handle = RunHandle::new("0123456789abcdef0123", "9700001_case00001");
        assert_eq!(handle.short_id(), "0123456789ab");
        assert_eq!(RunHandle::new("abc", "x").short_id(), "abc");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = RegistryCredentials {
            server: "https://docker.synapse.org".to_string(),
            username: "runner".to_string(),
            password: "hunter2".to_string(),
        };

        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("runner"));
        assert!(!rendered.contains("hunter2"));
    }
}
