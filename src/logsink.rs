//! Per-submission log file.
//!
//! Each capture replaces the file with the latest full snapshot of the
//! container output, then hands the file to durable storage when its size is
//! within `(0, size_limit]`. Oversized and empty files are skipped quietly;
//! storage failures are logged and swallowed.

use crate::env;
use crate::storage::LogStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What happened to a captured snapshot after it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Durable storage accepted the file under this identifier
    Stored(String),
    /// Size outside `(0, size_limit]`
    Skipped { size: u64 },
    /// No store configured
    Disabled,
    /// The store call failed
    StoreFailed(String),
    /// The local file could not be written
    WriteFailed(String),
}

/// Drop everything that is not printable ASCII text.
///
/// Invalid UTF-8 sequences and non-ASCII characters are removed; control
/// characters other than newline, carriage return and tab are removed too.
pub fn normalize(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| c.is_ascii() && (!c.is_ascii_control() || matches!(c, '\n' | '\r' | '\t')))
        .collect()
}

/// Log file writer with size-gated persistence.
pub struct LogSink {
    path: PathBuf,
    parent_id: String,
    size_limit: u64,
    store: Option<Arc<dyn LogStore>>,
}

impl LogSink {
    /// Create a sink writing to `path`; `store` is `None` when persistence is disabled.
    pub fn new<P: Into<PathBuf>, S: Into<String>>(
        path: P,
        parent_id: S,
        store: Option<Arc<dyn LogStore>>,
    ) -> Self {
        Self {
            path: path.into(),
            parent_id: parent_id.into(),
            size_limit: env::monitor::LOG_SIZE_LIMIT_BYTES,
            store,
        }
    }

    /// Override the persistence ceiling.
    pub fn with_size_limit(mut self, size_limit: u64) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the log file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created.
    pub async fn reset(&self) -> std::io::Result<()> {
        tokio::fs::write(&self.path, b"").await
    }

    /// Current size of the log file, zero if it does not exist.
    pub async fn size(&self) -> u64 {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Replace the log file with `raw` and persist it if eligible.
    pub async fn capture(&self, raw: &[u8]) -> PersistOutcome {
        let text = normalize(raw);
        if let Err(e) = tokio::fs::write(&self.path, text.as_bytes()).await {
            error!("Unable to write log file {:?}: {}", self.path, e);
            return PersistOutcome::WriteFailed(e.to_string());
        }

        self.persist().await
    }

    /// Hand the current file to durable storage if its size is within bounds.
    pub async fn persist(&self) -> PersistOutcome {
        let size = self.size().await;
        if size == 0 || size > self.size_limit {
            debug!(
                "Not storing {:?}: {} bytes (limit {})",
                self.path, size, self.size_limit
            );
            return PersistOutcome::Skipped { size };
        }

        let Some(store) = &self.store else {
            return PersistOutcome::Disabled;
        };

        match store.store(&self.path, &self.parent_id).await {
            Ok(id) => PersistOutcome::Stored(id),
            Err(e) => {
                warn!("Unable to store log file {:?}: {}", self.path, e);
                PersistOutcome::StoreFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStore;
    use tempfile::TempDir;

    fn sink(dir: &TempDir, store: &Arc<RecordingStore>) -> LogSink {
        let store: Arc<dyn LogStore> = store.clone();
        LogSink::new(dir.path().join("9700001_log.txt"), "syn123", Some(store))
    }

    #[test]
    fn test_normalize_drops_undecodable_bytes() {
        assert_eq!(normalize(b"line1\nline2"), "line1\nline2");
        assert_eq!(normalize(b"ok\xff\xfe done"), "ok done");
        assert_eq!(normalize("d\u{e9}j\u{e0} vu".as_bytes()), "dj vu");
        assert_eq!(normalize(b"bell\x07\tend\r\n"), "bell\tend\r\n");
    }

    #[tokio::test]
    async fn test_capture_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordingStore::new());
        let sink = sink(&dir, &store);

        sink.capture(b"line1").await;
        sink.capture(b"line1\nline2").await;

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "line1\nline2");
        assert_eq!(store.calls(), 2);
        assert_eq!(store.last_content().as_deref(), Some("line1\nline2"));
    }

    #[tokio::test]
    async fn test_empty_and_oversized_logs_are_not_stored() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordingStore::new());
        let sink = sink(&dir, &store);

        assert_eq!(sink.capture(b"").await, PersistOutcome::Skipped { size: 0 });
        assert_eq!(
            sink.capture(&vec![b'x'; 60_000]).await,
            PersistOutcome::Skipped { size: 60_000 }
        );
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_ceiling_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordingStore::new());
        let sink = sink(&dir, &store);

        let outcome = sink.capture(&vec![b'x'; 50_000]).await;
        assert!(matches!(outcome, PersistOutcome::Stored(_)));

        let outcome = sink.capture(&vec![b'x'; 50_001]).await;
        assert_eq!(outcome, PersistOutcome::Skipped { size: 50_001 });
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_absorbed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordingStore::failing("503 Service Unavailable"));
        let sink = sink(&dir, &store);

        let outcome = sink.capture(b"output").await;

        assert!(matches!(outcome, PersistOutcome::StoreFailed(ref e) if e.contains("503")));
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "output");
    }

    #[tokio::test]
    async fn test_disabled_persistence() {
        let dir = TempDir::new().unwrap();
        let sink = LogSink::new(dir.path().join("9700001_log.txt"), "syn123", None);

        assert_eq!(sink.capture(b"output").await, PersistOutcome::Disabled);
        sink.reset().await.unwrap();
        assert_eq!(sink.size().await, 0);
    }
}
