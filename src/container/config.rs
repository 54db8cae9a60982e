//! Container configuration builders.
//!
//! Turns a [`LaunchSpec`] into the body of the daemon's create call.

use crate::container::{ContainerError, LaunchSpec, MountSpec, Result};
use bollard::service::HostConfig;
use std::collections::HashMap;

/// Container configuration builder.
///
/// Defaults to an isolated container: no network, no accelerator.
pub struct ContainerConfigBuilder {
    image: Option<String>,
    labels: HashMap<String, String>,
    binds: Vec<String>,
    network_disabled: bool,
    runtime: Option<String>,
}

impl Default for ContainerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerConfigBuilder {
    /// Create a new container configuration builder.
    pub fn new() -> Self {
        Self {
            image: None,
            labels: HashMap::new(),
            binds: Vec::new(),
            network_disabled: true,
            runtime: None,
        }
    }

    /// Set the container image.
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Add a label to the container.
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a bind mount.
    pub fn mount(mut self, mount: &MountSpec) -> Self {
        self.binds.push(mount.bind());
        self
    }

    /// Enable or disable networking.
    pub fn network_disabled(mut self, disabled: bool) -> Self {
        self.network_disabled = disabled;
        self
    }

    /// Set the OCI runtime (e.g. `nvidia` for accelerator access).
    pub fn runtime<S: Into<String>>(mut self, runtime: S) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    /// Build the container configuration.
    ///
    /// # Errors
    ///
    /// Returns error if required fields are missing.
    pub fn build(self) -> Result<ContainerConfig> {
        let image = self
            .image
            .ok_or_else(|| ContainerError::ConfigError("Image is required".to_string()))?;

        let host_config = HostConfig {
            binds: if self.binds.is_empty() {
                None
            } else {
                Some(self.binds)
            },
            network_mode: if self.network_disabled {
                Some("none".to_string())
            } else {
                None
            },
            runtime: self.runtime,
            // Logs must stay readable after the process exits.
            auto_remove: Some(false),
            ..Default::default()
        };

        Ok(ContainerConfig {
            image,
            labels: if self.labels.is_empty() {
                None
            } else {
                Some(self.labels)
            },
            network_disabled: self.network_disabled,
            host_config,
        })
    }
}

/// Container configuration.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Image reference
    pub image: String,
    /// Labels
    pub labels: Option<HashMap<String, String>>,
    /// Networking disabled
    pub network_disabled: bool,
    /// Host configuration
    pub host_config: HostConfig,
}

impl ContainerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ContainerConfigBuilder {
        ContainerConfigBuilder::new()
    }

    /// Build the configuration for a launch, using `gpu_runtime` when the
    /// launch requests the accelerator.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is incomplete.
    pub fn for_launch(spec: &LaunchSpec, gpu_runtime: &str) -> Result<Self> {
        let mut builder = Self::builder()
            .image(spec.image.to_string())
            .network_disabled(spec.network_disabled);

        for mount in &spec.mounts {
            builder = builder.mount(mount);
        }
        for (key, value) in &spec.labels {
            builder = builder.label(key.as_str(), value.as_str());
        }
        if spec.accelerator {
            builder = builder.runtime(gpu_runtime);
        }

        builder.build()
    }

    /// Convert into the bollard create body.
    pub fn into_bollard(self) -> bollard::container::Config<String> {
        bollard::container::Config {
            image: Some(self.image),
            labels: self.labels,
            network_disabled: Some(self.network_disabled),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(self.host_config),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ImageRef, MountMode};
    use std::path::PathBuf;

    fn launch_spec(accelerator: bool) -> LaunchSpec {
        LaunchSpec {
            image: ImageRef::new("team/model", "sha256:abcd").unwrap(),
            name: "9700001_case00001".to_string(),
            mounts: vec![
                MountSpec {
                    host_path: PathBuf::from("/work"),
                    container_path: "/data/results".to_string(),
                    mode: MountMode::ReadWrite,
                },
                MountSpec {
                    host_path: PathBuf::from("/input/case_00001"),
                    container_path: "/data".to_string(),
                    mode: MountMode::ReadWrite,
                },
            ],
            network_disabled: true,
            accelerator,
            labels: vec![("subrun.case".to_string(), "00001".to_string())],
        }
    }

    #[test]
    fn test_launch_config_is_isolated() {
        let config = ContainerConfig::for_launch(&launch_spec(true), "nvidia").unwrap();

        assert_eq!(config.image, "team/model@sha256:abcd");
        assert!(config.network_disabled);
        assert_eq!(config.host_config.network_mode.as_deref(), Some("none"));
        assert_eq!(config.host_config.runtime.as_deref(), Some("nvidia"));
        assert_eq!(config.host_config.auto_remove, Some(false));

        let binds = config.host_config.binds.clone().unwrap();
        assert_eq!(
            binds,
            vec!["/work:/data/results:rw", "/input/case_00001:/data:rw"]
        );
        assert_eq!(
            config.labels.as_ref().unwrap().get("subrun.case"),
            Some(&"00001".to_string())
        );
    }

    #[test]
    fn test_no_runtime_without_accelerator() {
        let config = ContainerConfig::for_launch(&launch_spec(false), "nvidia").unwrap();
        assert!(config.host_config.runtime.is_none());
    }

    #[test]
    fn test_bollard_body() {
        let body = ContainerConfig::for_launch(&launch_spec(true), "nvidia")
            .unwrap()
            .into_bollard();

        assert_eq!(body.image.as_deref(), Some("team/model@sha256:abcd"));
        assert_eq!(body.network_disabled, Some(true));
        assert!(body.host_config.is_some());
    }

    #[test]
    fn test_missing_image_error() {
        let result = ContainerConfig::builder().network_disabled(false).build();

        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }
}
