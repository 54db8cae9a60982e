//! Submission run orchestration.
//!
//! Ties the pieces together for one submission:
//!
//! 1. refuse submissions already marked invalid
//! 2. register registry credentials
//! 3. for every case: mount, launch, monitor, persist the log, release the container
//! 4. remove the pulled image
//! 5. archive the result files, failing the run if there are none
//!
//! Cases run strictly one after another. A failing case is recorded and the
//! loop moves on; only the precondition failures of [`RunError`] end the run.

use crate::cases::{CaseEnumerator, CaseError, CaseUnit};
use crate::container::{
    ContainerRuntime, ExecutionMonitor, ImageRef, LaunchOutcome, LaunchSpec, MountLayout,
    RegistryCredentials, TerminalReason, cleanup, launcher,
};
use crate::env;
use crate::logsink::LogSink;
use crate::output::{OutputBundle, OutputCollector, OutputError};
use crate::storage::LogStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};

/// Run errors. Every variant aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Submission was marked invalid before the run
    #[error("Docker image is invalid (status {0})")]
    InvalidSubmission(SubmissionStatus),

    /// Input root is missing or unreadable
    #[error(transparent)]
    Cases(#[from] CaseError),

    /// No result files, or the bundle could not be written
    #[error(transparent)]
    Output(#[from] OutputError),

    /// Working directory is missing or unreadable
    #[error("Cannot resolve working directory {path:?}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings are inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Output collection task panicked or was cancelled
    #[error("Output collection did not finish: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RunError {
    /// Whether this is one of the precondition failures: invalid status,
    /// missing input root, or no result files.
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            RunError::InvalidSubmission(_)
                | RunError::Cases(_)
                | RunError::Output(OutputError::NoResultFiles { .. })
        )
    }
}

/// Result type for submission runs.
pub type Result<T> = std::result::Result<T, RunError>;

/// Validity status computed before the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    /// Image passed validation
    Validated,
    /// Image failed validation
    Invalid,
    /// Any other status string
    Other(String),
}

impl SubmissionStatus {
    /// Whether the run may proceed.
    pub fn allows_run(&self) -> bool {
        !matches!(self, SubmissionStatus::Invalid)
    }
}

impl FromStr for SubmissionStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "VALIDATED" => SubmissionStatus::Validated,
            "INVALID" => SubmissionStatus::Invalid,
            _ => SubmissionStatus::Other(s.trim().to_string()),
        })
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Validated => f.write_str("VALIDATED"),
            SubmissionStatus::Invalid => f.write_str("INVALID"),
            SubmissionStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Tunables read from the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Seconds between liveness polls
    pub poll_interval_secs: u64,
    /// Largest log file handed to durable storage
    pub log_size_limit_bytes: u64,
    /// Extension of the result files
    pub result_extension: String,
    /// In-container path of the shared output directory
    pub results_mount: String,
    /// In-container path of the case input directory
    pub data_mount: String,
    /// OCI runtime that exposes the accelerator
    pub gpu_runtime: String,
    /// Request the accelerator for every case
    pub accelerator: bool,
    /// Seconds the daemon waits before killing a container on stop
    pub stop_timeout_secs: i64,
    /// Staging directory name
    pub staging_dir: String,
    /// Archive file name
    pub archive_name: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: env::monitor::POLL_INTERVAL_SECS,
            log_size_limit_bytes: env::monitor::LOG_SIZE_LIMIT_BYTES,
            result_extension: env::output::RESULT_EXTENSION.to_string(),
            results_mount: env::container::RESULTS_MOUNT.to_string(),
            data_mount: env::container::DATA_MOUNT.to_string(),
            gpu_runtime: env::container::GPU_RUNTIME.to_string(),
            accelerator: true,
            stop_timeout_secs: env::container::STOP_TIMEOUT_SECS,
            staging_dir: env::output::STAGING_DIR_NAME.to_string(),
            archive_name: env::output::ARCHIVE_FILE_NAME.to_string(),
        }
    }
}

/// One submission to run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Submission identifier, used in container and log file names
    pub submission_id: String,
    /// Pinned image
    pub image: ImageRef,
    /// Directory holding one subdirectory per case
    pub input_dir: PathBuf,
    /// Directory the containers write results into
    pub work_dir: PathBuf,
    /// Parent identifier for stored logs
    pub parent_id: String,
    /// Wall-clock limit per case
    pub quota: Option<Duration>,
    /// Precomputed validity status
    pub status: Option<SubmissionStatus>,
    /// Registry login
    pub credentials: Option<RegistryCredentials>,
}

/// Outcome of one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Case identifier
    pub case_id: String,
    /// Container name
    pub container_name: String,
    /// Wall-clock launch time, absent if the launch failed
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds between launch and terminal state
    pub elapsed_secs: f64,
    /// Quota in seconds
    pub quota_secs: Option<u64>,
    /// Terminal state
    pub terminal_reason: TerminalReason,
    /// Launch error text
    pub error: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Submission identifier
    pub submission_id: String,
    /// Image reference
    pub image: String,
    /// Per-case outcomes in execution order
    pub cases: Vec<ExecutionRecord>,
    /// Archive path
    pub archive_path: PathBuf,
    /// Archived files
    pub result_files: Vec<String>,
}

impl RunSummary {
    /// Number of cases that ended with `reason`.
    pub fn count(&self, reason: TerminalReason) -> usize {
        self.cases
            .iter()
            .filter(|c| c.terminal_reason == reason)
            .count()
    }
}

/// Runs submissions against a container runtime and a log store.
pub struct SubmissionRunner {
    runtime: Arc<dyn ContainerRuntime>,
    store: Option<Arc<dyn LogStore>>,
    settings: RunnerSettings,
}

impl SubmissionRunner {
    /// Create a runner; `store` is `None` when logs are not persisted.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, store: Option<Arc<dyn LogStore>>) -> Self {
        Self {
            runtime,
            store,
            settings: RunnerSettings::default(),
        }
    }

    /// Replace the default settings.
    pub fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Run every case of `request` and archive the results.
    ///
    /// # Errors
    ///
    /// Returns error if the submission is invalid, the input root cannot be
    /// read, or no result files were produced.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary> {
        if let Some(status) = &request.status
            && !status.allows_run()
        {
            return Err(RunError::InvalidSubmission(status.clone()));
        }

        let layout = MountLayout::new(
            self.settings.results_mount.clone(),
            self.settings.data_mount.clone(),
        )
        .map_err(|e| RunError::Config(e.to_string()))?;

        if let Some(credentials) = &request.credentials
            && let Err(e) = self.runtime.authenticate(credentials).await
        {
            warn!("Registry authentication failed: {}", e);
        }

        // Bind sources must be absolute; a relative one is taken as a named volume.
        let work_dir = tokio::fs::canonicalize(&request.work_dir)
            .await
            .map_err(|source| RunError::WorkDir {
                path: request.work_dir.clone(),
                source,
            })?;

        let cases = CaseEnumerator::new(&request.input_dir, &work_dir)?;
        let sink = LogSink::new(
            env::log_file_path(&work_dir, &request.submission_id),
            request.parent_id.clone(),
            self.store.clone(),
        )
        .with_size_limit(self.settings.log_size_limit_bytes);

        let mut records = Vec::new();
        for case in cases {
            let span = info_span!("case", id = %case.case_id());
            let record = self
                .run_case(request, &layout, &sink, &case)
                .instrument(span)
                .await;
            records.push(record);
        }
        info!("Finished inference for {} cases", records.len());

        cleanup::remove_image(self.runtime.as_ref(), &request.image).await;

        let collector = OutputCollector::new(&work_dir)
            .extension(self.settings.result_extension.clone())
            .staging_dir_name(self.settings.staging_dir.clone())
            .archive_name(self.settings.archive_name.clone());
        let bundle: OutputBundle = tokio::task::spawn_blocking(move || collector.collect()).await??;

        Ok(RunSummary {
            submission_id: request.submission_id.clone(),
            image: request.image.to_string(),
            cases: records,
            archive_path: bundle.archive_path,
            result_files: bundle.files,
        })
    }

    /// Launch, monitor, log and release one case.
    async fn run_case(
        &self,
        request: &RunRequest,
        layout: &MountLayout,
        sink: &LogSink,
        case: &CaseUnit,
    ) -> ExecutionRecord {
        if let Err(e) = sink.reset().await {
            error!("Unable to reset log file {:?}: {}", sink.path(), e);
        }

        let container_name = env::container_name(&request.submission_id, case.case_id());
        let spec = LaunchSpec {
            image: request.image.clone(),
            name: container_name.clone(),
            mounts: layout.mounts_for(case),
            network_disabled: true,
            accelerator: self.settings.accelerator,
            labels: vec![
                ("subrun.submission".to_string(), request.submission_id.clone()),
                ("subrun.case".to_string(), case.case_id().to_string()),
            ],
        };

        let mut record = ExecutionRecord {
            case_id: case.case_id().to_string(),
            container_name,
            start_time: None,
            elapsed_secs: 0.0,
            quota_secs: request.quota.map(|q| q.as_secs()),
            terminal_reason: TerminalReason::LaunchFailed,
            error: None,
        };

        match launcher::launch(self.runtime.as_ref(), &spec).await {
            LaunchOutcome::Failed { error } => {
                sink.capture(format!("{}\n", error).as_bytes()).await;
                record.error = Some(error);
            }
            LaunchOutcome::Launched {
                handle,
                started_at,
                started,
            } => {
                let state = ExecutionMonitor::new(self.runtime.as_ref(), sink)
                    .poll_interval(Duration::from_secs(self.settings.poll_interval_secs))
                    .quota(request.quota)
                    .watch(case.case_id(), &handle, started)
                    .await;

                record.start_time = Some(started_at);
                record.elapsed_secs = started.elapsed().as_secs_f64();
                record.terminal_reason = state.into();

                cleanup::release(self.runtime.as_ref(), handle.name()).await;
            }
        }

        info!(
            "Case {} finished: {:?} after {:.0}s",
            record.case_id, record.terminal_reason, record.elapsed_secs
        );
        record
    }
}
