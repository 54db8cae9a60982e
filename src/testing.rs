//! Scripted collaborators for exercising the pipeline without a daemon.
//!
//! [`ScriptedRuntime`] plays back liveness and log snapshots and counts every
//! call; [`RecordingStore`] records what the log sink hands to storage.

use crate::container::{
    ContainerError, ContainerRuntime, ImageRef, LaunchSpec, RegistryCredentials, Result, RunHandle,
};
use crate::storage::{self, LogStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Calls observed by a [`ScriptedRuntime`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCalls {
    /// `authenticate` calls
    pub authentications: usize,
    /// `run` calls, failed or not
    pub runs: usize,
    /// `stop` calls
    pub stops: usize,
    /// `stop` calls that stopped a live container
    pub forced_stops: usize,
    /// `remove` calls
    pub removes: usize,
    /// `logs` calls
    pub log_reads: usize,
    /// `remove_image` calls
    pub image_removals: usize,
}

#[derive(Debug)]
struct FakeContainer {
    id: String,
    live: bool,
    polls: usize,
    log_reads: usize,
}

type RunHook = Arc<dyn Fn(&LaunchSpec) + Send + Sync>;

#[derive(Default)]
struct Script {
    launch_error: Option<String>,
    image_removal_error: Option<String>,
    stop_error: Option<String>,
    remove_error: Option<String>,
    live_polls: Option<usize>,
    logs: Vec<Vec<u8>>,
    on_run: Option<RunHook>,
    containers: HashMap<String, FakeContainer>,
    next_id: usize,
    calls: RuntimeCalls,
}

/// In-memory [`ContainerRuntime`] driven by a script.
///
/// Containers stay live until stopped, or for a fixed number of liveness
/// polls if [`live_for_polls`](Self::live_for_polls) is set. Each `logs`
/// call returns the next scripted snapshot; the last one repeats.
#[derive(Default)]
pub struct ScriptedRuntime {
    script: Mutex<Script>,
}

impl ScriptedRuntime {
    /// Create a runtime whose launches succeed and whose containers never exit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `run` fail with `message`.
    pub fn failing_launch<S: Into<String>>(self, message: S) -> Self {
        self.lock().launch_error = Some(message.into());
        self
    }

    /// Make `remove_image` fail with `message`.
    pub fn failing_image_removal<S: Into<String>>(self, message: S) -> Self {
        self.lock().image_removal_error = Some(message.into());
        self
    }

    /// Make every `stop` fail with `message`; the container keeps running.
    pub fn failing_stop<S: Into<String>>(self, message: S) -> Self {
        self.lock().stop_error = Some(message.into());
        self
    }

    /// Make every `remove` fail with `message`; the container stays registered.
    pub fn failing_remove<S: Into<String>>(self, message: S) -> Self {
        self.lock().remove_error = Some(message.into());
        self
    }

    /// Containers leave the live set after `polls` liveness checks.
    pub fn live_for_polls(self, polls: usize) -> Self {
        self.lock().live_polls = Some(polls);
        self
    }

    /// Successive full-history snapshots returned by `logs`.
    pub fn with_logs<I, B>(self, snapshots: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        self.lock().logs = snapshots.into_iter().map(|s| s.as_ref().to_vec()).collect();
        self
    }

    /// Run `hook` on every successful launch, e.g. to write result files.
    pub fn on_run<F>(self, hook: F) -> Self
    where
        F: Fn(&LaunchSpec) + Send + Sync + 'static,
    {
        self.lock().on_run = Some(Arc::new(hook));
        self
    }

    /// Register a live container named `name` and return its handle.
    pub fn insert_live(&self, name: &str) -> RunHandle {
        Self::create(&mut self.lock(), name)
    }

    /// Calls observed so far.
    pub fn calls(&self) -> RuntimeCalls {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create(script: &mut Script, name: &str) -> RunHandle {
        script.next_id += 1;
        let id = format!("{:064x}", script.next_id);
        script.containers.insert(
            name.to_string(),
            FakeContainer {
                id: id.clone(),
                live: true,
                polls: 0,
                log_reads: 0,
            },
        );
        RunHandle::new(id, name)
    }

    fn find<'s>(script: &'s mut Script, name_or_id: &str) -> Option<(String, &'s mut FakeContainer)> {
        script
            .containers
            .iter_mut()
            .find(|(name, c)| name.as_str() == name_or_id || c.id == name_or_id)
            .map(|(name, c)| (name.clone(), c))
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn authenticate(&self, _credentials: &RegistryCredentials) -> Result<()> {
        self.lock().calls.authentications += 1;
        Ok(())
    }

    async fn run(&self, spec: &LaunchSpec) -> Result<RunHandle> {
        let hook = {
            let mut script = self.lock();
            script.calls.runs += 1;
            if let Some(message) = &script.launch_error {
                return Err(ContainerError::LaunchError(message.clone()));
            }
            script.on_run.clone()
        };

        if let Some(hook) = hook {
            hook(spec);
        }

        let mut script = self.lock();
        Ok(Self::create(&mut script, &spec.name))
    }

    async fn list_live(&self) -> Result<Vec<RunHandle>> {
        let mut script = self.lock();
        let live_polls = script.live_polls;

        let mut live = Vec::new();
        for (name, container) in script.containers.iter_mut() {
            if !container.live {
                continue;
            }
            if live_polls.is_some_and(|limit| container.polls >= limit) {
                container.live = false;
                continue;
            }
            container.polls += 1;
            live.push(RunHandle::new(container.id.clone(), name.clone()));
        }

        Ok(live)
    }

    async fn logs(&self, handle: &RunHandle) -> Result<Vec<u8>> {
        let mut script = self.lock();
        script.calls.log_reads += 1;

        let snapshot_count = script.logs.len();
        let (_, container) = Self::find(&mut script, handle.id())
            .ok_or_else(|| ContainerError::NotFound(handle.name().to_string()))?;

        let index = container.log_reads.min(snapshot_count.saturating_sub(1));
        container.log_reads += 1;

        Ok(script.logs.get(index).cloned().unwrap_or_default())
    }

    async fn stop(&self, name_or_id: &str) -> Result<()> {
        let mut script = self.lock();
        script.calls.stops += 1;
        if let Some(message) = &script.stop_error {
            return Err(ContainerError::Other(message.clone()));
        }

        let was_live = match Self::find(&mut script, name_or_id) {
            Some((_, container)) => std::mem::replace(&mut container.live, false),
            None => return Err(ContainerError::NotFound(name_or_id.to_string())),
        };
        if was_live {
            script.calls.forced_stops += 1;
        }
        Ok(())
    }

    async fn remove(&self, name_or_id: &str) -> Result<()> {
        let mut script = self.lock();
        script.calls.removes += 1;
        if let Some(message) = &script.remove_error {
            return Err(ContainerError::Other(message.clone()));
        }

        let name = Self::find(&mut script, name_or_id)
            .map(|(name, _)| name)
            .ok_or_else(|| ContainerError::NotFound(name_or_id.to_string()))?;
        script.containers.remove(&name);
        Ok(())
    }

    async fn remove_image(&self, _image: &ImageRef) -> Result<()> {
        let mut script = self.lock();
        script.calls.image_removals += 1;

        match &script.image_removal_error {
            Some(message) => Err(ContainerError::Other(message.clone())),
            None => Ok(()),
        }
    }
}

/// [`LogStore`] that records every file it is handed.
#[derive(Default)]
pub struct RecordingStore {
    failure: Option<String>,
    stored: Mutex<Vec<StoredLog>>,
}

/// One file handed to a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    /// Parent identifier
    pub parent_id: String,
    /// File content at the time of the call
    pub content: String,
}

impl RecordingStore {
    /// Create a store that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects everything with `message`.
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of store calls, including failed ones.
    pub fn calls(&self) -> usize {
        self.stored().len()
    }

    /// Content of the most recent call.
    pub fn last_content(&self) -> Option<String> {
        self.stored().last().map(|log| log.content.clone())
    }

    /// Every call in order.
    pub fn stored(&self) -> Vec<StoredLog> {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl LogStore for RecordingStore {
    async fn store(&self, path: &Path, parent_id: &str) -> storage::Result<String> {
        let content = tokio::fs::read_to_string(path).await?;

        let id = {
            let mut stored = self
                .stored
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            stored.push(StoredLog {
                parent_id: parent_id.to_string(),
                content,
            });
            format!("log-{}", stored.len())
        };

        match &self.failure {
            Some(message) => Err(StoreError::Io(std::io::Error::other(message.clone()))),
            None => Ok(id),
        }
    }
}
