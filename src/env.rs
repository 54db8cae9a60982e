//! Environment constants and path utilities for the submission runner.
//!
//! This module centralizes the fixed names, in-container paths and defaults
//! used throughout the application, making them easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Application directory name in the user's home directory
pub const SUBRUN_DIR_NAME: &str = ".subrun";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "subrun.toml";

/// Paths the workload sees inside its container
pub mod container {
    /// Shared output directory inside the container
    pub const RESULTS_MOUNT: &str = "/data/results";

    /// Per-case input directory inside the container
    pub const DATA_MOUNT: &str = "/data";

    /// Container runtime that exposes the accelerator
    pub const GPU_RUNTIME: &str = "nvidia";

    /// Seconds the daemon waits before killing a container on stop
    pub const STOP_TIMEOUT_SECS: i64 = 10;
}

/// Execution monitoring defaults
pub mod monitor {
    /// Seconds between liveness polls
    pub const POLL_INTERVAL_SECS: u64 = 60;

    /// Largest log file, in bytes, handed to durable storage
    pub const LOG_SIZE_LIMIT_BYTES: u64 = 50_000;
}

/// Output bundle names
pub mod output {
    /// Extension of the files the workload is expected to produce
    pub const RESULT_EXTENSION: &str = ".nii.gz";

    /// Staging directory the result files are moved into
    pub const STAGING_DIR_NAME: &str = "predictions";

    /// Archive holding the staging directory
    pub const ARCHIVE_FILE_NAME: &str = "predictions.tar.gz";
}

/// Test-related constants
pub mod test {
    /// Submission identifier used by tests
    pub const TEST_SUBMISSION_ID: &str = "9700001";

    /// Parent identifier used by tests
    pub const TEST_PARENT_ID: &str = "syn00000001";
}

/// Name of the per-submission log file
pub fn log_file_name(submission_id: &str) -> String {
    format!("{}_log.txt", submission_id)
}

/// Build the per-submission log file path inside the working directory
pub fn log_file_path(work_dir: &Path, submission_id: &str) -> PathBuf {
    work_dir.join(log_file_name(submission_id))
}

/// Build the run summary path inside the working directory
pub fn summary_file_path(work_dir: &Path, submission_id: &str) -> PathBuf {
    work_dir.join(format!("{}_summary.json", submission_id))
}

/// Name of the container that runs one case of a submission
pub fn container_name(submission_id: &str, case_id: &str) -> String {
    format!("{}_case{}", submission_id, case_id)
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    home_dir.join(SUBRUN_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_submission_names() {
        let work_dir = Path::new("/work");

        assert_eq!(log_file_name("9700001"), "9700001_log.txt");
        assert_eq!(
            log_file_path(work_dir, "9700001"),
            Path::new("/work/9700001_log.txt")
        );
        assert_eq!(
            summary_file_path(work_dir, "9700001"),
            Path::new("/work/9700001_summary.json")
        );
        assert_eq!(container_name("9700001", "00013"), "9700001_case00013");
    }

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.subrun/config.toml")
        );
        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/subrun.toml")
        );
    }
}
