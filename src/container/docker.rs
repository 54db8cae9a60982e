//! bollard-backed container runtime.
//!
//! Implements [`ContainerRuntime`] against a Docker or Podman daemon: pulls the
//! pinned image with the registry credentials, creates and starts detached
//! containers, and stops, removes and reads logs by name or ID.

use crate::container::{
    ContainerClient, ContainerConfig, ContainerError, ContainerRuntime, ImageRef, LaunchSpec,
    RegistryCredentials, Result, RunHandle,
};
use crate::env;
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use futures::stream::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Docker runtime configuration.
#[derive(Debug, Clone)]
pub struct DockerRuntimeConfig {
    /// OCI runtime used when the accelerator is requested
    pub gpu_runtime: String,
    /// Seconds the daemon waits before killing a container on stop
    pub stop_timeout: i64,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            gpu_runtime: env::container::GPU_RUNTIME.to_string(),
            stop_timeout: env::container::STOP_TIMEOUT_SECS,
        }
    }
}

/// Container runtime backed by the Docker Engine API.
pub struct DockerRuntime {
    client: ContainerClient,
    config: DockerRuntimeConfig,
    credentials: RwLock<Option<DockerCredentials>>,
}

impl DockerRuntime {
    /// Connect to the local daemon with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn connect() -> Result<Self> {
        let client = ContainerClient::new().await?;
        Ok(Self::with_client(client, DockerRuntimeConfig::default()))
    }

    /// Create a runtime with an existing client.
    pub fn with_client(client: ContainerClient, config: DockerRuntimeConfig) -> Self {
        Self {
            client,
            config,
            credentials: RwLock::new(None),
        }
    }

    /// Get the underlying client.
    pub fn client(&self) -> &ContainerClient {
        &self.client
    }

    /// Pull the image unless it is already present locally.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.client.image_exists(image).await? {
            debug!("Image {} already exists locally", image);
            return Ok(());
        }

        info!("Pulling image: {}", image);
        let credentials = self.credentials.read().await.clone();

        let mut stream = self.client.docker().create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            credentials,
        );

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                debug!("Pull status: {}", status);
            }
            if let Some(error) = info.error {
                return Err(ContainerError::LaunchError(format!(
                    "Pull of {} failed: {}",
                    image, error
                )));
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }
}

fn not_found(name: &str, error: bollard::errors::Error) -> ContainerError {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::NotFound(name.to_string()),
        e => ContainerError::ApiError(e),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn authenticate(&self, credentials: &RegistryCredentials) -> Result<()> {
        if credentials.username.is_empty() {
            return Err(ContainerError::ConfigError(
                "Registry username is required".to_string(),
            ));
        }

        let docker_credentials = DockerCredentials {
            username: Some(credentials.username.clone()),
            password: Some(credentials.password.clone()),
            serveraddress: Some(credentials.server.clone()),
            ..Default::default()
        };
        *self.credentials.write().await = Some(docker_credentials);

        info!(
            "Using registry {} as {}",
            credentials.server, credentials.username
        );
        Ok(())
    }

    async fn run(&self, spec: &LaunchSpec) -> Result<RunHandle> {
        let reference = spec.image.to_string();
        self.ensure_image(&reference).await?;

        let config = ContainerConfig::for_launch(spec, &self.config.gpu_runtime)?;

        debug!("Creating container: {}", spec.name);
        let response = self
            .client
            .docker()
            .create_container(
                Some(bollard::container::CreateContainerOptions {
                    name: spec.name.as_str(),
                    ..Default::default()
                }),
                config.into_bollard(),
            )
            .await?;

        self.client
            .docker()
            .start_container(
                &response.id,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;

        let handle = RunHandle::new(response.id, spec.name.clone());
        info!("Started container: {} ({})", handle.name(), handle.short_id());
        Ok(handle)
    }

    async fn list_live(&self) -> Result<Vec<RunHandle>> {
        let containers = self
            .client
            .docker()
            .list_containers(Some(bollard::container::ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                Some(RunHandle::new(id, name))
            })
            .collect())
    }

    async fn logs(&self, handle: &RunHandle) -> Result<Vec<u8>> {
        let mut stream = self.client.docker().logs(
            handle.id(),
            Some(bollard::container::LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );

        let mut output = Vec::new();
        while let Some(result) = stream.next().await {
            let log = result.map_err(|e| not_found(handle.name(), e))?;
            output.extend_from_slice(&log.into_bytes());
        }

        Ok(output)
    }

    async fn stop(&self, name_or_id: &str) -> Result<()> {
        debug!("Stopping container: {}", name_or_id);

        match self
            .client
            .docker()
            .stop_container(
                name_or_id,
                Some(bollard::container::StopContainerOptions {
                    t: self.config.stop_timeout,
                }),
            )
            .await
        {
            Ok(()) => {
                info!("Stopped container: {}", name_or_id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!("Container {} was already stopped", name_or_id);
                Ok(())
            }
            Err(e) => Err(not_found(name_or_id, e)),
        }
    }

    async fn remove(&self, name_or_id: &str) -> Result<()> {
        debug!("Removing container: {}", name_or_id);

        self.client
            .docker()
            .remove_container(
                name_or_id,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| not_found(name_or_id, e))?;

        info!("Removed container: {}", name_or_id);
        Ok(())
    }

    async fn remove_image(&self, image: &ImageRef) -> Result<()> {
        let reference = image.to_string();
        info!("Removing image: {}", reference);

        self.client
            .docker()
            .remove_image(
                &reference,
                Some(bollard::image::RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map_err(|e| not_found(&reference, e))?;

        info!("Successfully removed image: {}", reference);
        Ok(())
    }
}
