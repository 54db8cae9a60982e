//! Bind mounts for a case unit.
//!
//! Every case gets exactly two mounts: the shared output directory and the
//! case's own input directory. Both are bound read-write.

use crate::cases::CaseUnit;
use crate::container::{ContainerError, Result};
use crate::env;
use std::fmt;
use std::path::PathBuf;

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountMode {
    /// Read-only bind
    ReadOnly,
    /// Read-write bind
    ReadWrite,
}

impl MountMode {
    /// Mode suffix understood by the Docker bind syntax.
    pub fn as_str(&self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One host-path to container-path bind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountSpec {
    /// Path on the host
    pub host_path: PathBuf,
    /// Path inside the container
    pub container_path: String,
    /// Access mode
    pub mode: MountMode,
}

impl MountSpec {
    /// Render as `host_path:container_path:mode`.
    pub fn bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            self.mode
        )
    }
}

/// In-container targets of the two case mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountLayout {
    results_mount: String,
    data_mount: String,
}

impl Default for MountLayout {
    fn default() -> Self {
        Self {
            results_mount: env::container::RESULTS_MOUNT.to_string(),
            data_mount: env::container::DATA_MOUNT.to_string(),
        }
    }
}

impl MountLayout {
    /// Create a layout with custom in-container targets.
    ///
    /// # Errors
    ///
    /// Returns error if the targets are equal or not absolute.
    pub fn new<R: Into<String>, D: Into<String>>(results_mount: R, data_mount: D) -> Result<Self> {
        let results_mount = results_mount.into();
        let data_mount = data_mount.into();

        if results_mount == data_mount {
            return Err(ContainerError::ConfigError(format!(
                "Results and data mounts must differ, both are {}",
                results_mount
            )));
        }
        for target in [&results_mount, &data_mount] {
            if !target.starts_with('/') {
                return Err(ContainerError::ConfigError(format!(
                    "Mount target must be absolute: {}",
                    target
                )));
            }
        }

        Ok(Self {
            results_mount,
            data_mount,
        })
    }

    /// Derive the mounts for one case: output first, then input.
    pub fn mounts_for(&self, case: &CaseUnit) -> Vec<MountSpec> {
        // Input stays read-write; existing workloads write scratch files next to their data.
        vec![
            MountSpec {
                host_path: case.output_path().to_path_buf(),
                container_path: self.results_mount.clone(),
                mode: MountMode::ReadWrite,
            },
            MountSpec {
                host_path: case.input_path().to_path_buf(),
                container_path: self.data_mount.clone(),
                mode: MountMode::ReadWrite,
            },
        ]
    }
}
