//! Content-addressed image references.
//!
//! Submissions are pinned by digest, so the reference handed to the runtime
//! is always `repository@digest` rather than a mutable tag.

use crate::container::{ContainerError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Image reference of the form `repository@digest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    digest: String,
}

impl ImageRef {
    /// Create a reference from a repository and a content digest.
    ///
    /// # Errors
    ///
    /// Returns error if either part is empty or the repository already carries a digest.
    pub fn new<R: Into<String>, D: Into<String>>(repository: R, digest: D) -> Result<Self> {
        let repository = repository.into().trim().to_string();
        let digest = digest.into().trim().to_string();

        if repository.is_empty() {
            return Err(ContainerError::ConfigError(
                "Image repository is required".to_string(),
            ));
        }
        if digest.is_empty() {
            return Err(ContainerError::ConfigError(
                "Image digest is required".to_string(),
            ));
        }
        if repository.contains('@') {
            return Err(ContainerError::ConfigError(format!(
                "Image repository already contains a digest: {}",
                repository
            )));
        }
        if !digest.contains(':') {
            warn!("Image digest {} has no algorithm prefix", digest);
        }

        Ok(Self { repository, digest })
    }

    /// Repository part of the reference.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Digest part of the reference.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.digest)
    }
}

impl FromStr for ImageRef {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self> {
        let (repository, digest) = s.rsplit_once('@').ok_or_else(|| {
            ContainerError::ConfigError(format!("Image reference has no digest: {}", s))
        })?;
        Self::new(repository, digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_joins_repository_and_digest() {
        let image = ImageRef::new("docker.synapse.org/syn123/model", "sha256:abcd").unwrap();
        assert_eq!(image.to_string(), "docker.synapse.org/syn123/model@sha256:abcd");
        assert_eq!(image.repository(), "docker.synapse.org/syn123/model");
        assert_eq!(image.digest(), "sha256:abcd");
    }

    #[test]
    fn test_parse_reference() {
        let image: ImageRef = "registry:5000/team/model@sha256:ff00".parse().unwrap();
        assert_eq!(image.repository(), "registry:5000/team/model");
        assert_eq!(image.digest(), "sha256:ff00");

        assert!("team/model:latest".parse::<ImageRef>().is_err());
    }

    #[test]
    fn test_missing_parts_are_rejected() {
        assert!(matches!(
            ImageRef::new("", "sha256:abcd"),
            Err(ContainerError::ConfigError(_))
        ));
        assert!(matches!(
            ImageRef::new("team/model", "  "),
            Err(ContainerError::ConfigError(_))
        ));
        assert!(ImageRef::new("team/model@sha256:1", "sha256:2").is_err());
    }
}
