//! Container execution layer.
//!
//! Everything that touches the container runtime lives here: the daemon
//! connection, the [`ContainerRuntime`] collaborator trait and its bollard
//! implementation, and the per-case pipeline stages built on top of it.
//!
//! ## Architecture
//!
//! - [`client`]: Docker/Podman API client wrapper with connection management
//! - [`runtime`]: the runtime collaborator trait and the types that cross it
//! - [`docker`]: bollard-backed [`ContainerRuntime`]
//! - [`config`]: container configuration builder for the create call
//! - [`image`]: content-addressed image references
//! - [`volume`]: bind mounts derived from a case unit
//! - [`launcher`]: detached launch with cleanup on failure
//! - [`monitor`]: polling state machine enforcing the runtime quota
//! - [`cleanup`]: idempotent container and image removal
//!
//! ## Usage
//!
//! ```rust,no_run
//! use subrun::container::{DockerRuntime, ContainerRuntime, ImageRef};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = DockerRuntime::connect().await?;
//!     let image = ImageRef::new("docker.synapse.org/syn123/model", "sha256:abc")?;
//!
//!     for handle in runtime.list_live().await? {
//!         println!("{} is running", handle.name());
//!     }
//!
//!     subrun::container::cleanup::remove_image(&runtime, &image).await;
//!     Ok(())
//! }
//! ```

pub mod cleanup;
mod client;
mod config;
mod docker;
mod image;
pub mod launcher;
pub mod monitor;
mod runtime;
mod volume;

pub use client::{ContainerClient, ContainerClientConfig, RuntimeType};
pub use config::{ContainerConfig, ContainerConfigBuilder};
pub use docker::{DockerRuntime, DockerRuntimeConfig};
pub use image::ImageRef;
pub use launcher::LaunchOutcome;
pub use monitor::{ExecutionMonitor, MonitorState, TerminalReason};
pub use runtime::{ContainerRuntime, LaunchSpec, RegistryCredentials, RunHandle};
pub use volume::{MountLayout, MountMode, MountSpec};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Container or image not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Container could not be launched
    #[error("Launch error: {0}")]
    LaunchError(String),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// Whether the target container or image does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            ContainerError::NotFound(_) => true,
            ContainerError::ApiError(e) => status_code(e) == Some(404),
            _ => false,
        }
    }

    /// Whether the daemon reported the request as a no-op (already stopped).
    pub fn is_not_modified(&self) -> bool {
        match self {
            ContainerError::ApiError(e) => status_code(e) == Some(304),
            _ => false,
        }
    }
}

fn status_code(error: &bollard::errors::Error) -> Option<u16> {
    match error {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code)
        }
        _ => None,
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
