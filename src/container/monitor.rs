//! Execution monitoring.
//!
//! Polls a running container once per interval. Each tick either forces a
//! stop because the quota was exceeded, or replaces the case log with the
//! container's full output so far. When the container leaves the live set
//! on its own, one final drain captures whatever it wrote after the last tick.
//!
//! ```text
//!            +---------+  elapsed > quota   +----------+
//! launch --> | Running | -----------------> | TimedOut |
//!            +---------+                    +----------+
//!                 |  not in live set
//!                 v
//!            +-----------+
//!            | Completed |
//!            +-----------+
//! ```

use crate::container::{ContainerRuntime, RunHandle};
use crate::env;
use crate::logsink::LogSink;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Container is in the live set and within quota
    Running,
    /// Container left the live set on its own
    Completed,
    /// Quota exceeded; the container was stopped
    TimedOut,
}

/// Why a case stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalReason {
    /// Container exited on its own
    Completed,
    /// Container was stopped at the quota
    TimedOut,
    /// Container never started
    LaunchFailed,
}

impl From<MonitorState> for TerminalReason {
    fn from(state: MonitorState) -> Self {
        match state {
            MonitorState::TimedOut => TerminalReason::TimedOut,
            MonitorState::Running | MonitorState::Completed => TerminalReason::Completed,
        }
    }
}

/// Log text recorded for a case that hit its quota.
pub fn timeout_message(quota: Duration, case_id: &str) -> String {
    format!(
        "Time limit of {}s reached for case {} - no output generated.",
        quota.as_secs(),
        case_id
    )
}

/// Polls one container until it completes or exceeds its quota.
pub struct ExecutionMonitor<'a> {
    runtime: &'a dyn ContainerRuntime,
    sink: &'a LogSink,
    poll_interval: Duration,
    quota: Option<Duration>,
}

impl<'a> ExecutionMonitor<'a> {
    /// Create a monitor with the default poll interval and no quota.
    pub fn new(runtime: &'a dyn ContainerRuntime, sink: &'a LogSink) -> Self {
        Self {
            runtime,
            sink,
            poll_interval: Duration::from_secs(env::monitor::POLL_INTERVAL_SECS),
            quota: None,
        }
    }

    /// Set the interval between polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the wall-clock quota.
    pub fn quota(mut self, quota: Option<Duration>) -> Self {
        self.quota = quota;
        self
    }

    /// Watch `handle`, launched at `started`, until it reaches a terminal state.
    ///
    /// The case log holds the terminal snapshot when this returns.
    pub async fn watch(&self, case_id: &str, handle: &RunHandle, started: Instant) -> MonitorState {
        let mut state = MonitorState::Running;

        while state == MonitorState::Running {
            state = self.tick(handle, started).await;
            if state == MonitorState::Running {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        match (state, self.quota) {
            (MonitorState::TimedOut, Some(quota)) => {
                let message = timeout_message(quota, case_id);
                info!("{}", message);
                self.sink.capture(message.as_bytes()).await;
            }
            _ => {
                debug!("Container {} exited, collecting final logs", handle.name());
                self.drain(handle).await;
            }
        }

        state
    }

    /// One poll: check liveness, enforce the quota, drain.
    async fn tick(&self, handle: &RunHandle, started: Instant) -> MonitorState {
        match self.runtime.is_live(handle).await {
            Ok(true) => {}
            Ok(false) => return MonitorState::Completed,
            Err(e) => {
                warn!(
                    "Unable to list live containers, treating {} as exited: {}",
                    handle.name(),
                    e
                );
                return MonitorState::Completed;
            }
        }

        let elapsed = started.elapsed();
        if let Some(quota) = self.quota
            && elapsed > quota
        {
            warn!(
                "Container {} exceeded quota after {}s, stopping",
                handle.name(),
                elapsed.as_secs()
            );
            if let Err(e) = self.runtime.stop(handle.id()).await {
                warn!("Unable to stop container {}: {}", handle.name(), e);
            }
            return MonitorState::TimedOut;
        }

        self.drain(handle).await;
        MonitorState::Running
    }

    /// Replace the case log with the container's full output history.
    async fn drain(&self, handle: &RunHandle) {
        match self.runtime.logs(handle).await {
            Ok(output) => {
                self.sink.capture(&output).await;
            }
            Err(e) => warn!("Unable to read logs of {}: {}", handle.name(), e),
        }
    }
}
