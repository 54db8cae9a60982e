//! Durable storage for case logs.
//!
//! [`LogStore`] is the collaborator the log sink hands finished log files to.
//! Two backends are provided: an HTTP upload endpoint and a local directory.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Local file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request could not be sent
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server refused the upload
    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    /// Endpoint or derived upload URL is not valid
    #[error("Invalid storage endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// File has no usable name
    #[error("Not a file: {0:?}")]
    NotAFile(PathBuf),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable-storage collaborator.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist the file at `path` under `parent_id` and return its remote identifier.
    async fn store(&self, path: &Path, parent_id: &str) -> Result<String>;
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::NotAFile(path.to_path_buf()))
}

/// Uploads log files with `PUT {endpoint}/{parent_id}/{file_name}`.
#[derive(Debug, Clone)]
pub struct HttpLogStore {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

impl HttpLogStore {
    /// Create a store for `endpoint`, authenticating with a bearer `token` if given.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid URL.
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            token,
        })
    }

    /// URL a file named `file_name` is uploaded to under `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the joined URL is invalid.
    pub fn upload_url(&self, parent_id: &str, file_name: &str) -> Result<Url> {
        Ok(self
            .endpoint
            .join(&format!("{}/", parent_id))?
            .join(file_name)?)
    }
}

#[async_trait]
impl LogStore for HttpLogStore {
    async fn store(&self, path: &Path, parent_id: &str) -> Result<String> {
        let name = file_name(path)?;
        let url = self.upload_url(parent_id, &name)?;
        let body = tokio::fs::read(path).await?;

        debug!("Uploading {} bytes to {}", body.len(), url);

        let mut request = self.client.put(url.clone()).body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected { status, body });
        }

        let text = response.text().await?;
        let id = serde_json::from_str::<UploadResponse>(&text)
            .map(|r| r.id)
            .unwrap_or_else(|_| url.to_string());

        info!("Stored {} as {}", name, id);
        Ok(id)
    }
}

/// Copies log files into `{root}/{parent_id}/`.
#[derive(Debug, Clone)]
pub struct DirectoryLogStore {
    root: PathBuf,
}

impl DirectoryLogStore {
    /// Create a store rooted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl LogStore for DirectoryLogStore {
    async fn store(&self, path: &Path, parent_id: &str) -> Result<String> {
        let name = file_name(path)?;
        let dir = self.root.join(parent_id);
        tokio::fs::create_dir_all(&dir).await?;

        let target = dir.join(&name);
        tokio::fs::copy(path, &target).await?;

        debug!("Copied {:?} to {:?}", path, target);
        Ok(target.display().to_string())
    }
}
