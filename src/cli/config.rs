//! Configuration discovery and loading
//!
//! Settings are looked up in this order:
//! 1. The file given with `--config`
//! 2. Current directory: ./subrun.toml
//! 3. User config: ~/.subrun/config.toml
//! 4. System config: /etc/subrun/config.toml
//! 5. Built-in defaults
//!
//! Credentials always come from the file named on the command line.

use crate::container::RegistryCredentials;
use crate::env;
use crate::runner::RunnerSettings;
use crate::storage::{DirectoryLogStore, HttpLogStore, LogStore, StoreError};
use serde::Deserialize;
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for its schema
    #[error("Cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required section is absent
    #[error("Missing [{0}] section in credentials file")]
    MissingSection(&'static str),

    /// Storage section does not describe a usable backend
    #[error("Invalid storage configuration: {0}")]
    Storage(String),
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Where case logs are persisted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StorageCredentials {
    /// Upload endpoint
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint
    pub token: Option<String>,
    /// Local directory mirror, used when no endpoint is set
    pub directory: Option<PathBuf>,
}

impl StorageCredentials {
    /// Build the configured store.
    ///
    /// # Errors
    ///
    /// Returns error if neither an endpoint nor a directory is set, or the endpoint is invalid.
    pub fn build_store(&self) -> Result<Arc<dyn LogStore>, ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            let store = HttpLogStore::new(endpoint, self.token.clone())
                .map_err(|e: StoreError| ConfigError::Storage(e.to_string()))?;
            info!("Storing logs at {}", endpoint);
            return Ok(Arc::new(store));
        }

        if let Some(directory) = &self.directory {
            info!("Storing logs under {:?}", directory);
            return Ok(Arc::new(DirectoryLogStore::new(directory.clone())));
        }

        Err(ConfigError::Storage(
            "either endpoint or directory is required".to_string(),
        ))
    }
}

/// Contents of the credentials file.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Registry login
    pub registry: Option<RegistryCredentials>,
    /// Log storage
    pub storage: Option<StorageCredentials>,
}

impl Credentials {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_toml(path.as_ref())
    }

    /// Build the log store, required when persistence is enabled.
    pub fn log_store(&self) -> Result<Arc<dyn LogStore>, ConfigError> {
        self.storage
            .as_ref()
            .ok_or(ConfigError::MissingSection("storage"))?
            .build_store()
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load settings from `explicit` if given, else from the first file in the hierarchy.
    pub fn discover_settings(explicit: Option<&Path>) -> Result<RunnerSettings, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading settings from: {:?}", path);
            return read_toml(path);
        }

        if let Some(path) = Self::find_config_file() {
            info!("Loading settings from: {:?}", path);
            return read_toml(&path);
        }

        info!("No settings file found, using defaults");
        Ok(RunnerSettings::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::get_config_candidates().into_iter().find(|candidate| {
            debug!("Checking for config file: {:?}", candidate);
            candidate.is_file()
        })
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/subrun/config.toml"));

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credentials_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.toml");
        fs::write(
            &path,
            r#"
[registry]
server = "https://docker.synapse.org"
username = "runner"
password = "hunter2"

[storage]
directory = "/var/lib/subrun/logs"
"#,
        )
        .unwrap();

        let credentials = Credentials::from_toml_file(&path).unwrap();

        let registry = credentials.registry.as_ref().unwrap();
        assert_eq!(registry.server, "https://docker.synapse.org");
        assert_eq!(registry.username, "runner");
        assert!(credentials.log_store().is_ok());
    }

    #[test]
    fn test_storage_section_required_for_persistence() {
        let credentials: Credentials = toml::from_str(
            r#"
[registry]
server = "https://docker.synapse.org"
username = "runner"
password = "hunter2"
"#,
        )
        .unwrap();

        assert!(matches!(
            credentials.log_store(),
            Err(ConfigError::MissingSection("storage"))
        ));
    }

    #[test]
    fn test_empty_storage_section_is_rejected() {
        let storage = StorageCredentials {
            endpoint: None,
            token: None,
            directory: None,
        };
        assert!(matches!(storage.build_store(), Err(ConfigError::Storage(_))));

        let storage = StorageCredentials {
            endpoint: Some("::".to_string()),
            token: None,
            directory: None,
        };
        assert!(matches!(storage.build_store(), Err(ConfigError::Storage(_))));
    }

    #[test]
    fn test_explicit_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "poll_interval_secs = 30\nresult_extension = \".csv\"\n").unwrap();

        let settings = ConfigDiscovery::discover_settings(Some(&path)).unwrap();
        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.result_extension, ".csv");
        assert_eq!(settings.archive_name, "predictions.tar.gz");
    }

    #[test]
    fn test_unparsable_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "poll_interval_secs = \"soon\"").unwrap();

        assert!(matches!(
            ConfigDiscovery::discover_settings(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_config_candidates() {
        let candidates = ConfigDiscovery::get_config_candidates();
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].file_name().unwrap(), "subrun.toml");
    }
}
