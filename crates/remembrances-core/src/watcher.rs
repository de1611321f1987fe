//! KB Watcher (C9, spec.md §4.9): keeps a directory of markdown files in
//! sync with the document store.
//!
//! An initial scan compares each file's mtime (truncated to whole seconds)
//! against the stored chunk set's `last_modified`, then a live
//! `notify`/`notify-debouncer-mini` subscription keeps reprocessing writes
//! and deleting removed files as they happen.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ignore::WalkBuilder;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use remembrances_search::embeddings::EmbedderFactory;
use remembrances_storage::MemoryStore;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunker::chunk_text;

/// Default debounce window for collapsing rapid successive writes to the
/// same path (spec.md §4.9 "Debounce rapid successive writes").
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error(transparent)]
    Storage(#[from] remembrances_storage::StorageError),

    #[error(transparent)]
    Search(#[from] remembrances_search::SearchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start filesystem watcher: {0}")]
    Notify(#[from] notify::Error),

    #[error("stored timestamp is not valid RFC3339: {0}")]
    BadTimestamp(#[from] chrono::ParseError),
}

pub struct KbWatcher {
    store: MemoryStore,
    embedders: Arc<EmbedderFactory>,
    root: PathBuf,
    debounce: Duration,
}

impl KbWatcher {
    pub fn new(store: MemoryStore, embedders: Arc<EmbedderFactory>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            embedders,
            root: root.into(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Walk every `.md` file under the root once, reprocessing any whose
    /// mtime is newer than its stored `last_modified` (spec.md §4.9
    /// "Initial scan"). Returns the number of files reprocessed.
    pub async fn initial_scan(&self) -> Result<usize, WatcherError> {
        let mut reprocessed = 0;
        for entry in WalkBuilder::new(&self.root).hidden(true).git_ignore(true).build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "error walking knowledge base root");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if self.process_path(path).await? {
                reprocessed += 1;
            }
        }
        info!(root = %self.root.display(), reprocessed, "knowledge base initial scan complete");
        Ok(reprocessed)
    }

    /// Subscribe to filesystem events under the root and keep reprocessing
    /// forever (spec.md §4.9 "Live updates"). Returns only on a fatal
    /// watcher-setup error; individual file failures are logged and
    /// skipped.
    pub async fn run(&self) -> Result<(), WatcherError> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();
        let root = self.root.clone();
        let debounce = self.debounce;

        let (setup_tx, setup_rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let (watch_tx, watch_rx) = std::sync::mpsc::channel();
            let mut debouncer = match new_debouncer(debounce, watch_tx) {
                Ok(d) => d,
                Err(e) => {
                    let _ = setup_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = debouncer.watcher().watch(&root, RecursiveMode::Recursive) {
                let _ = setup_tx.send(Err(e));
                return;
            }
            let _ = setup_tx.send(Ok(()));

            for result in watch_rx {
                match result {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event.path).is_err() {
                                return;
                            }
                        }
                    }
                    Err(errors) => {
                        for e in errors {
                            warn!(error = %e, "filesystem watch error");
                        }
                    }
                }
            }
        });

        setup_rx.await.unwrap_or_else(|_| Ok(()))?;
        info!(root = %self.root.display(), "watching knowledge base root for changes");

        while let Some(path) = rx.recv().await {
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let outcome = if path.exists() {
                self.process_path(&path).await
            } else {
                self.remove_path(&path).await.map(|_| false)
            };
            if let Err(e) = outcome {
                warn!(path = %path.display(), error = %e, "failed to handle knowledge base change");
            }
        }
        Ok(())
    }

    /// Reprocess `path` if its mtime is newer than the stored chunk set's
    /// `last_modified`, truncated to whole seconds (spec.md §4.9 step 2).
    /// Returns whether it actually reprocessed.
    async fn process_path(&self, path: &Path) -> Result<bool, WatcherError> {
        let rel_path = self.relative_path(path);
        let metadata = tokio::fs::metadata(path).await?;
        let file_mtime = metadata.modified()?;

        if !self.should_reprocess(&rel_path, file_mtime).await? {
            debug!(path = %rel_path, "skipping unchanged file");
            return Ok(false);
        }

        let content = tokio::fs::read_to_string(path).await?;
        self.reprocess_file(&rel_path, &content, file_mtime, metadata.len()).await?;
        Ok(true)
    }

    async fn should_reprocess(&self, rel_path: &str, file_mtime: SystemTime) -> Result<bool, WatcherError> {
        let existing = self.store.get_document(rel_path).await?;
        let Some(first) = existing.first() else {
            return Ok(true);
        };
        let Some(stored) = first.metadata.get("last_modified").and_then(|v| v.as_str()) else {
            return Ok(true);
        };
        let stored_dt = chrono::DateTime::parse_from_rfc3339(stored)?;
        let file_mtime_sec = file_mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(file_mtime_sec > stored_dt.timestamp())
    }

    async fn reprocess_file(
        &self,
        rel_path: &str,
        content: &str,
        file_mtime: SystemTime,
        total_size: u64,
    ) -> Result<(), WatcherError> {
        let provider = self.embedders.default();
        let windows = chunk_text(content, provider.max_chars(), 60);
        let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
        let embeddings = provider.embed_documents(&texts).await?;

        let last_modified: chrono::DateTime<chrono::Utc> = file_mtime.into();
        let metadata = serde_json::json!({
            "source": "watcher",
            "total_size": total_size,
            "last_modified": last_modified.to_rfc3339(),
        });

        let dimension = provider.dimension();
        let chunks: Vec<(String, Vec<f32>)> = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| {
                let embedding = embedding.unwrap_or_else(|| {
                    warn!(path = rel_path, "embedding failed for chunk, storing zero vector");
                    vec![0.0; dimension]
                });
                (text, embedding)
            })
            .collect();

        self.store.save_document(None, rel_path, chunks, metadata).await?;
        debug!(path = rel_path, "reprocessed knowledge base file");
        Ok(())
    }

    async fn remove_path(&self, path: &Path) -> Result<(), WatcherError> {
        let rel_path = self.relative_path(path);
        let deleted = self.store.delete_document(None, &rel_path).await?;
        if deleted {
            info!(path = %rel_path, "removed knowledge base file from document store");
        }
        Ok(())
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_strips_root_and_normalizes_separators() {
        let watcher_root = PathBuf::from("/kb/root");
        let watcher = KbWatcherTestHandle::new(watcher_root.clone());
        let rel = watcher.relative_path(Path::new("/kb/root/notes/today.md"));
        assert_eq!(rel, "notes/today.md");
    }

    /// Exercises just `relative_path`, which needs no store or embedder.
    struct KbWatcherTestHandle {
        root: PathBuf,
    }

    impl KbWatcherTestHandle {
        fn new(root: PathBuf) -> Self {
            Self { root }
        }

        fn relative_path(&self, path: &Path) -> String {
            path.strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/")
        }
    }
}
