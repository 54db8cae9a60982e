//! Command line argument parsing

use crate::container::{ContainerError, ImageRef};
use crate::runner::SubmissionStatus;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "subrun")]
#[command(author = "Subrun Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Runs a containerized submission against every case of an input directory"
)]
#[command(long_about = None)]
pub struct Args {
    /// Submission identifier
    #[arg(short = 's', long = "submission-id")]
    pub submission_id: String,

    /// Image repository
    #[arg(short = 'p', long = "docker-repository")]
    pub docker_repository: String,

    /// Image content digest
    #[arg(short = 'd', long = "docker-digest")]
    pub docker_digest: String,

    /// Directory with one subdirectory per case
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: PathBuf,

    /// Credentials file (TOML)
    #[arg(short = 'c', long = "credentials")]
    pub credentials: PathBuf,

    /// Parent identifier the case logs are stored under
    #[arg(long = "parent-id")]
    pub parent_id: String,

    /// Runtime quota per case, in seconds
    #[arg(short = 'r', long = "runtime-quota", value_name = "SECONDS")]
    pub runtime_quota: Option<u64>,

    /// Persist case logs to durable storage
    #[arg(long = "store")]
    pub store: bool,

    /// Precomputed image validity status
    #[arg(long = "status")]
    pub status: Option<SubmissionStatus>,

    /// Settings file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Working directory for results, logs and the archive (default: current directory)
    #[arg(short = 'w', long = "work-dir")]
    pub work_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Pinned image reference.
    pub fn image(&self) -> Result<ImageRef, ContainerError> {
        ImageRef::new(self.docker_repository.as_str(), self.docker_digest.as_str())
    }

    /// Runtime quota, if one was given.
    pub fn quota(&self) -> Option<Duration> {
        self.runtime_quota.map(Duration::from_secs)
    }

    /// Default tracing filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "subrun=debug"
        } else {
            "subrun=info"
        }
    }
}
