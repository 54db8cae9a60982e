//! Result collection.
//!
//! After every case has run, the result files the workload left in the
//! working directory are moved into a staging directory and archived as a
//! single gzip-compressed tarball. Finding no result files is fatal.

use crate::env;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Output collection errors.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The workload produced nothing
    #[error(
        "No *{extension} files found; please check whether running the container locally produces them"
    )]
    NoResultFiles { extension: String },

    /// Filesystem or archive error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output collection.
pub type Result<T> = std::result::Result<T, OutputError>;

/// The archived result files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBundle {
    /// Path of the archive
    pub archive_path: PathBuf,
    /// Names of the archived files
    pub files: Vec<String>,
}

/// Collects result files from a working directory into one archive.
#[derive(Debug, Clone)]
pub struct OutputCollector {
    work_dir: PathBuf,
    extension: String,
    staging_dir_name: String,
    archive_name: String,
}

impl OutputCollector {
    /// Create a collector with the default extension and names.
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> Self {
        Self {
            work_dir: work_dir.into(),
            extension: env::output::RESULT_EXTENSION.to_string(),
            staging_dir_name: env::output::STAGING_DIR_NAME.to_string(),
            archive_name: env::output::ARCHIVE_FILE_NAME.to_string(),
        }
    }

    /// Match result files by this extension.
    pub fn extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.extension = extension.into();
        self
    }

    /// Name of the staging directory inside the working directory.
    pub fn staging_dir_name<S: Into<String>>(mut self, name: S) -> Self {
        self.staging_dir_name = name.into();
        self
    }

    /// Name of the archive inside the working directory.
    pub fn archive_name<S: Into<String>>(mut self, name: S) -> Self {
        self.archive_name = name.into();
        self
    }

    /// Path the archive is written to.
    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join(&self.archive_name)
    }

    /// Result files directly inside the working directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns error if the working directory cannot be listed.
    pub fn find_result_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.work_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(&self.extension) {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Move the result files into the staging directory and archive it.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::NoResultFiles`] if there is nothing to collect,
    /// or an IO error if moving or archiving fails.
    pub fn collect(&self) -> Result<OutputBundle> {
        let results = self.find_result_files()?;
        if results.is_empty() {
            return Err(OutputError::NoResultFiles {
                extension: self.extension.clone(),
            });
        }

        let staging = self.work_dir.join(&self.staging_dir_name);
        fs::create_dir_all(&staging)?;

        let mut files = Vec::with_capacity(results.len());
        for path in results {
            let Some(name) = path.file_name() else {
                continue;
            };
            debug!("Staging {:?}", path);
            fs::rename(&path, staging.join(name))?;
            files.push(name.to_string_lossy().into_owned());
        }

        let archive_path = self.archive_path();
        write_archive(&staging, &self.staging_dir_name, &archive_path)?;

        info!("Archived {} result files into {:?}", files.len(), archive_path);
        Ok(OutputBundle {
            archive_path,
            files,
        })
    }
}

/// Write `dir` into a gzip-compressed tarball at `archive_path`, rooted at `name`.
fn write_archive(dir: &Path, name: &str, archive_path: &Path) -> std::io::Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(name, dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}
