//! # Submission Runner
//!
//! Runs an untrusted, externally supplied container image against every case
//! of an input directory, one case at a time, under a wall-clock quota.
//! Each case's output is captured to a log file and optionally persisted to
//! durable storage; containers and the pulled image are always cleaned up;
//! the result files the workload produced are archived into a single bundle.
//!
//! ## Architecture Overview
//!
//! - **[`cases`]**: one [`CaseUnit`] per immediate subdirectory of the input root
//! - **[`container`]**: runtime collaborator, mounts, launch, monitoring, cleanup
//! - **[`logsink`]**: size-gated log file persistence
//! - **[`storage`]**: durable-storage collaborator backends
//! - **[`output`]**: result file staging and archiving
//! - **[`runner`]**: the per-submission orchestration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use subrun::{DockerRuntime, ImageRef, RunRequest, SubmissionRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(DockerRuntime::connect().await?);
//!     let runner = SubmissionRunner::new(runtime, None);
//!
//!     let summary = runner
//!         .run(&RunRequest {
//!             submission_id: "9700001".to_string(),
//!             image: ImageRef::new("docker.synapse.org/syn123/model", "sha256:abcd")?,
//!             input_dir: "/data/cases".into(),
//!             work_dir: std::env::current_dir()?,
//!             parent_id: "syn456".to_string(),
//!             quota: Some(Duration::from_secs(1800)),
//!             status: None,
//!             credentials: None,
//!         })
//!         .await?;
//!
//!     println!("Archived {} files", summary.result_files.len());
//!     Ok(())
//! }
//! ```

/// Case enumeration.
pub mod cases;

/// Container execution layer.
///
/// Runtime collaborator, bind mounts, detached launch, quota-enforcing
/// monitor and best-effort cleanup.
pub mod container;

/// Environment constants and path utilities.
///
/// Centralizes fixed names and defaults used throughout the application.
pub mod env;

/// Per-submission log file with size-gated persistence.
pub mod logsink;

/// Result file collection and archiving.
pub mod output;

/// Submission run orchestration.
pub mod runner;

/// Durable storage for case logs.
pub mod storage;

/// Scripted collaborators for exercising the pipeline without a daemon.
pub mod testing;

// CLI module for command-line interface
pub mod cli;

pub use cases::{CaseEnumerator, CaseUnit};
pub use container::{ContainerRuntime, DockerRuntime, ImageRef, RunHandle, TerminalReason};
pub use logsink::LogSink;
pub use output::{OutputBundle, OutputCollector};
pub use runner::{
    ExecutionRecord, RunError, RunRequest, RunSummary, RunnerSettings, SubmissionRunner,
    SubmissionStatus,
};
pub use storage::LogStore;
