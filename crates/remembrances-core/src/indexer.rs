//! Indexer (C8, spec.md §4.8): drives end-to-end indexing of a project,
//! maintaining project/file/symbol/chunk records and the job lifecycle.
//!
//! A worker pool of `W` tokio tasks (default 4) processes files
//! concurrently. Unlike the GGUF provider's explicit `catch_unwind`
//! boundary (native calls aren't unwind-safe across the FFI edge), a
//! panicking file-processing task is already isolated by `tokio::spawn` —
//! the panic surfaces as a `JoinError` on that task alone and never takes
//! down its peers, which is this pipeline's panic guard.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use remembrances_search::embeddings::{EmbedderFactory, EmbeddingProvider};
use remembrances_storage::{IndexingJob, MemoryStore, StorageError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunker::{chunk_text, compose_symbol_text, DEFAULT_CHUNK_THRESHOLD, DEFAULT_OVERLAP};
use crate::extractor::{extract_symbols, ExtractedSymbol};
use crate::merkle::MerkleTreeManager;
use crate::parser::SupportedLanguage;

/// Tunable knobs for one indexing run (spec.md §4.8's defaults).
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Worker pool size (spec.md §5 "bounded worker pool of W tasks").
    pub worker_count: usize,
    /// Embedding batch size B.
    pub batch_size: usize,
    /// Symbol body size above which the body is chunked.
    pub chunk_threshold: usize,
    /// Overlap between chunk windows, in characters.
    pub overlap: usize,
    /// Files larger than this are skipped entirely.
    pub max_file_size_bytes: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            batch_size: 10,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            overlap: DEFAULT_OVERLAP,
            max_file_size_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("indexing already in progress for project '{project_id}'")]
    AlreadyInProgress { project_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to walk project directory: {0}")]
    Walk(#[from] crate::merkle::MerkleError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Indexer {
    store: MemoryStore,
    embedders: Arc<EmbedderFactory>,
    config: IndexerConfig,
}

/// Outcome of processing a single file, used to roll up job counters.
enum FileOutcome {
    /// Unsupported extension, unchanged content hash, or over the size
    /// limit — not an error, just nothing to do.
    Skipped,
    Processed { symbols: u64 },
    Failed { path: String, reason: String },
}

impl Indexer {
    pub fn new(store: MemoryStore, embedders: Arc<EmbedderFactory>, config: IndexerConfig) -> Self {
        Self {
            store,
            embedders,
            config,
        }
    }

    /// Run the full pipeline for one project root (spec.md §4.8 steps
    /// 1-9). Returns the finished job record regardless of whether it
    /// completed or failed; only pre-flight problems (job conflict,
    /// directory scan failure) are returned as an `Err`.
    ///
    /// `languages`, when given, restricts indexing to files whose detected
    /// [`SupportedLanguage::as_str`] is in the list (case-insensitive);
    /// every other file is skipped, same as an unsupported extension.
    pub async fn index_project(
        &self,
        root_path: &Path,
        name: &str,
        languages: Option<&[String]>,
    ) -> Result<IndexingJob, IndexerError> {
        self.index_project_cancellable(root_path, name, languages, CancellationToken::new())
            .await
    }

    /// Same pipeline as [`Self::index_project`], but observing `cancel`
    /// at every suspension point (spec.md §5 "Cancellation"): once
    /// triggered, in-flight file tasks are left to finish or fail on
    /// their own, no further files are dispatched, and the job is marked
    /// `failed` with reason `"cancelled"`. Already-written symbols for
    /// completed files stay; nothing is rolled back, since each file's
    /// delete+insert is independently idempotent on retry.
    pub async fn index_project_cancellable(
        &self,
        root_path: &Path,
        name: &str,
        languages: Option<&[String]>,
        cancel: CancellationToken,
    ) -> Result<IndexingJob, IndexerError> {
        let root_path = root_path
            .canonicalize()
            .unwrap_or_else(|_| root_path.to_path_buf());
        let root_str = root_path.to_string_lossy().to_string();

        let project = self
            .store
            .upsert_project(name, &root_str, serde_json::json!({}))
            .await?;

        let job = match self.store.start_indexing_job(&project.project_id).await {
            Ok(job) => job,
            Err(StorageError::JobConflict { project_id }) => {
                return Err(IndexerError::AlreadyInProgress { project_id })
            }
            Err(e) => return Err(e.into()),
        };

        let tree = MerkleTreeManager::default().build_merkle_tree(&root_path)?;
        let total_files = tree.len() as u64;
        info!(project_id = %project.project_id, total_files, "starting indexing run");

        let files_indexed = Arc::new(AtomicU64::new(0));
        let symbols_found = Arc::new(AtomicU64::new(0));
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut tasks = JoinSet::new();

        let languages = languages.map(|l| l.to_vec());

        for (rel_path, hash) in tree {
            let store = self.store.clone();
            let embedders = self.embedders.clone();
            let config = self.config.clone();
            let project_id = project.project_id.clone();
            let root_path = root_path.clone();
            let semaphore = semaphore.clone();
            let languages = languages.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.expect("semaphore not closed"),
                    _ = cancel.cancelled() => return FileOutcome::Skipped,
                };
                if cancel.is_cancelled() {
                    drop(permit);
                    return FileOutcome::Skipped;
                }
                process_file(
                    &store,
                    &embedders,
                    &project_id,
                    &root_path,
                    &rel_path,
                    &hash,
                    &config,
                    languages.as_deref(),
                )
                .await
            });
        }

        let mut failures = Vec::new();
        let mut cancelled = false;
        while let Some(joined) = tasks.join_next().await {
            if cancel.is_cancelled() && !cancelled {
                cancelled = true;
                tasks.abort_all();
            }
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) if join_err.is_cancelled() => FileOutcome::Skipped,
                Err(join_err) => FileOutcome::Failed {
                    path: "<unknown>".to_string(),
                    reason: join_err.to_string(),
                },
            };
            match outcome {
                FileOutcome::Skipped => {}
                FileOutcome::Processed { symbols } => {
                    files_indexed.fetch_add(1, Ordering::Relaxed);
                    symbols_found.fetch_add(symbols, Ordering::Relaxed);
                }
                FileOutcome::Failed { path, reason } => {
                    warn!(project_id = %project.project_id, path, reason, "file indexing failed");
                    failures.push((path, reason));
                }
            }
            self.store
                .update_job_progress(
                    &job.job_id,
                    total_files,
                    files_indexed.load(Ordering::Relaxed),
                    symbols_found.load(Ordering::Relaxed),
                )
                .await?;
        }

        let indexed = files_indexed.load(Ordering::Relaxed);
        if cancelled {
            self.store
                .fail_job(&job.job_id, &project.project_id, "cancelled")
                .await?;
        } else if total_files > 0 && indexed == 0 && !failures.is_empty() {
            let summary = failures
                .iter()
                .take(10)
                .map(|(p, r)| format!("{p}: {r}"))
                .collect::<Vec<_>>()
                .join("; ");
            self.store.fail_job(&job.job_id, &project.project_id, &summary).await?;
        } else {
            self.store.complete_job(&job.job_id, &project.project_id).await?;
        }

        debug!(
            project_id = %project.project_id,
            indexed,
            failed = failures.len(),
            "indexing run finished"
        );

        Ok(self
            .store
            .get_job(&job.job_id)
            .await?
            .expect("job row disappeared immediately after writing to it"))
    }

    /// Re-run the indexing pipeline for a single file, outside of any job
    /// (`code_reindex_file`, spec.md §6). Hashes the file fresh and reuses
    /// the same hash-skip, parse, and embed path a full run takes; a file
    /// whose content hasn't changed since the last index is a no-op, same
    /// as incremental indexing.
    pub async fn reindex_file(
        &self,
        root_path: &Path,
        project_id: &str,
        rel_path: &str,
    ) -> Result<u64, IndexerError> {
        let abs_path = root_path.join(rel_path);
        let hash = crate::merkle::compute_file_hash(&abs_path)?;
        match process_file(
            &self.store,
            &self.embedders,
            project_id,
            root_path,
            rel_path,
            &hash,
            &self.config,
            None,
        )
        .await
        {
            FileOutcome::Processed { symbols } => Ok(symbols),
            FileOutcome::Skipped => Ok(0),
            FileOutcome::Failed { reason, .. } => Err(IndexerError::Io(std::io::Error::other(reason))),
        }
    }
}

/// Text paired with where its resulting embedding should land once the
/// batched `embed_documents` call returns.
enum EmbedTarget {
    Symbol(usize),
    Chunk(usize, usize),
}

async fn process_file(
    store: &MemoryStore,
    embedders: &EmbedderFactory,
    project_id: &str,
    root: &Path,
    rel_path: &str,
    hash: &str,
    config: &IndexerConfig,
    languages: Option<&[String]>,
) -> FileOutcome {
    let abs_path = root.join(rel_path);

    let language = match SupportedLanguage::from_path(Path::new(rel_path)) {
        Some(lang) => lang,
        None => return FileOutcome::Skipped,
    };
    if let Some(allowed) = languages {
        if !allowed.iter().any(|l| l.eq_ignore_ascii_case(language.as_str())) {
            return FileOutcome::Skipped;
        }
    }

    let metadata = match tokio::fs::metadata(&abs_path).await {
        Ok(m) => m,
        Err(e) => {
            return FileOutcome::Failed {
                path: rel_path.to_string(),
                reason: e.to_string(),
            }
        }
    };
    if metadata.len() > config.max_file_size_bytes {
        debug!(path = rel_path, size = metadata.len(), "skipping oversized file");
        return FileOutcome::Skipped;
    }

    let existing_file = match store
        .upsert_file(project_id, rel_path, language.as_str(), hash, metadata.len())
        .await
    {
        Ok(result) => result,
        Err(e) => {
            return FileOutcome::Failed {
                path: rel_path.to_string(),
                reason: e.to_string(),
            }
        }
    };
    if existing_file.is_none() {
        return FileOutcome::Skipped;
    }

    let content = match tokio::fs::read_to_string(&abs_path).await {
        Ok(c) => c,
        Err(e) => {
            return FileOutcome::Failed {
                path: rel_path.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let symbols = match extract_symbols(language, &content) {
        Ok(symbols) => symbols,
        Err(e) => {
            return FileOutcome::Failed {
                path: rel_path.to_string(),
                reason: e.to_string(),
            }
        }
    };

    if let Err(e) = store.delete_symbols_for_file(project_id, rel_path).await {
        return FileOutcome::Failed {
            path: rel_path.to_string(),
            reason: e.to_string(),
        };
    }

    let flattened: Vec<(ExtractedSymbol, Option<String>)> = symbols
        .iter()
        .flat_map(|s| s.flatten(None))
        .collect();
    if flattened.is_empty() {
        return FileOutcome::Processed { symbols: 0 };
    }

    let provider = embedders.code();
    let max_chars = provider.max_chars();

    let mut symbol_texts = Vec::with_capacity(flattened.len());
    let mut chunk_texts_per_symbol: Vec<Vec<String>> = Vec::with_capacity(flattened.len());
    for (symbol, _) in &flattened {
        symbol_texts.push(compose_symbol_text(&symbol.signature, &symbol.name_path, &symbol.body, max_chars));
        if symbol.body.chars().count() > config.chunk_threshold {
            let windows = chunk_text(&symbol.body, max_chars, config.overlap);
            chunk_texts_per_symbol.push(windows.into_iter().map(|w| w.text).collect());
        } else {
            chunk_texts_per_symbol.push(Vec::new());
        }
    }

    let mut all_texts = Vec::new();
    let mut targets = Vec::new();
    for (i, text) in symbol_texts.iter().enumerate() {
        all_texts.push(text.clone());
        targets.push(EmbedTarget::Symbol(i));
    }
    for (symbol_idx, chunks) in chunk_texts_per_symbol.iter().enumerate() {
        for (chunk_idx, text) in chunks.iter().enumerate() {
            all_texts.push(text.clone());
            targets.push(EmbedTarget::Chunk(symbol_idx, chunk_idx));
        }
    }

    let embeddings = embed_in_batches(provider.as_ref(), &all_texts, config.batch_size).await;

    let mut symbol_embeddings: Vec<Option<Vec<f32>>> = vec![None; flattened.len()];
    let mut chunk_embeddings: Vec<Vec<Option<Vec<f32>>>> =
        chunk_texts_per_symbol.iter().map(|c| vec![None; c.len()]).collect();
    for (target, embedding) in targets.into_iter().zip(embeddings.into_iter()) {
        match target {
            EmbedTarget::Symbol(i) => symbol_embeddings[i] = embedding,
            EmbedTarget::Chunk(s, c) => chunk_embeddings[s][c] = embedding,
        }
    }

    let mut parent_ids: HashMap<String, String> = HashMap::new();
    let mut symbol_count = 0u64;

    for (i, (symbol, parent_path)) in flattened.iter().enumerate() {
        let parent_id = parent_path.as_ref().and_then(|p| parent_ids.get(p)).cloned();
        let saved = store
            .save_symbol(
                project_id,
                rel_path,
                language.as_str(),
                &symbol.name,
                &symbol.name_path,
                symbol.kind,
                symbol.start_line,
                symbol.end_line,
                symbol.start_byte,
                symbol.end_byte,
                &symbol.signature,
                &symbol.body,
                parent_id.as_deref(),
                symbol_embeddings[i].take(),
            )
            .await;

        let saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                warn!(path = rel_path, symbol = %symbol.name_path, error = %e, "failed to persist symbol");
                continue;
            }
        };
        parent_ids.insert(symbol.name_path.clone(), saved.id.clone());
        symbol_count += 1;

        for (chunk_idx, embedding) in chunk_embeddings[i].iter_mut().enumerate() {
            let content = &chunk_texts_per_symbol[i][chunk_idx];
            if let Err(e) = store
                .save_chunk(&saved.id, project_id, rel_path, chunk_idx, content, embedding.take())
                .await
            {
                warn!(path = rel_path, symbol = %symbol.name_path, chunk_idx, error = %e, "failed to persist chunk");
            }
        }
    }

    FileOutcome::Processed { symbols: symbol_count }
}

/// Embed `texts` in groups of `batch_size`, never letting one failed
/// batch fail the whole file: a batch that fails entirely yields `None`
/// for every item in it (spec.md §4.8 step 6).
async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Vec<Option<Vec<f32>>> {
    let mut results = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        match provider.embed_documents(batch).await {
            Ok(embeddings) => results.extend(embeddings),
            Err(e) => {
                warn!(batch_size = batch.len(), error = %e, "embedding batch failed entirely");
                results.extend(std::iter::repeat(None).take(batch.len()));
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.chunk_threshold, 1500);
    }
}
