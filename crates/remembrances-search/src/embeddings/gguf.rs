//! Local GGUF embedding provider via llama.cpp bindings.
//!
//! The native model is not reentrant (spec.md §5 "Embedder rentrancy"), so
//! every dispatch acquires `context` through a [`tokio::sync::Mutex`] and
//! runs the blocking native call on a blocking-pool thread, wrapped in
//! `catch_unwind` so a native abort surfaces as a typed [`SearchError`]
//! instead of taking down the process (spec.md §9 "Panic/abort
//! boundaries").

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::LlamaModel;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::provider::{
    truncate_to_budget, EmbeddingProvider, EmbeddingProviderKind, DEFAULT_CHARS_PER_TOKEN,
    MAX_CHARS_CEILING, UBATCH_SAFETY_MARGIN,
};
use crate::error::{Result, SearchError};

/// A loaded GGUF model and its context, serialized behind a mutex.
struct Inner {
    backend: LlamaBackend,
    model: LlamaModel,
    context: Mutex<LlamaContext<'static>>,
}

/// Local embedding provider backed by a `.gguf` model file.
pub struct GgufProvider {
    inner: Arc<Inner>,
    path: PathBuf,
    dimension: usize,
    max_tokens: usize,
    max_chars: usize,
    chars_per_token: usize,
}

/// Configuration for loading a GGUF embedding model.
#[derive(Debug, Clone)]
pub struct GgufConfig {
    pub model_path: PathBuf,
    pub n_threads: u32,
    pub n_gpu_layers: u32,
}

impl GgufProvider {
    /// Load the model and derive the dynamic token/character budget from
    /// its physical ubatch size (spec.md §4.1 "Dynamic limits").
    pub fn load(cfg: &GgufConfig) -> Result<Self> {
        let backend = LlamaBackend::init().map_err(|e| SearchError::ModelLoad {
            path: cfg.model_path.display().to_string(),
            message: e.to_string(),
        })?;

        let model_params = LlamaModelParams::default().with_n_gpu_layers(cfg.n_gpu_layers);
        let model = LlamaModel::load_from_file(&backend, &cfg.model_path, &model_params).map_err(
            |e| SearchError::ModelLoad {
                path: cfg.model_path.display().to_string(),
                message: e.to_string(),
            },
        )?;

        let ctx_params = LlamaContextParams::default()
            .with_embeddings(true)
            .with_n_threads(cfg.n_threads as i32);
        let u_batch = ctx_params.n_ubatch();

        let context = model
            .new_context(&backend, ctx_params)
            .map_err(|e| SearchError::ModelLoad {
                path: cfg.model_path.display().to_string(),
                message: e.to_string(),
            })?;
        // SAFETY: `context` borrows from `model` and `backend`, both of
        // which are co-owned by the same `Inner` and dropped together;
        // the context never outlives its borrows in practice because
        // `Inner` holds all three.
        let context: LlamaContext<'static> = unsafe { std::mem::transmute(context) };

        let dimension = model.n_embd() as usize;
        let max_tokens = (u_batch as f32 * UBATCH_SAFETY_MARGIN).floor() as usize;
        let max_chars = (max_tokens * DEFAULT_CHARS_PER_TOKEN).min(MAX_CHARS_CEILING);

        info!(
            path = %cfg.model_path.display(),
            dimension,
            u_batch,
            max_tokens,
            max_chars,
            "loaded GGUF embedding model"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                model,
                context: Mutex::new(context),
            }),
            path: cfg.model_path.clone(),
            dimension,
            max_tokens,
            max_chars,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        })
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_to_budget(text, self.max_chars).into_owned();
        let inner = self.inner.clone();
        let dimension = self.dimension;
        let path = self.path.display().to_string();

        // The native decode runs for multiple milliseconds; parking it on
        // a blocking-pool thread (rather than inline in this async fn)
        // keeps the executor thread free to drive other tasks while this
        // call holds the context mutex, per this module's own contract
        // and spec.md §5's "callers may still submit concurrently" model.
        let join_result = tokio::task::spawn_blocking(move || {
            let guard = inner.context.blocking_lock();
            // Native call wrapped in catch_unwind: a model abort becomes
            // a typed error rather than a process crash.
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                embed_blocking(&inner.model, &guard, &text, dimension)
            }));
            drop(guard);
            result
        })
        .await;

        match join_result {
            Ok(Ok(Ok(vec))) => Ok(vec),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => {
                warn!(path, "native embedding call aborted");
                Err(SearchError::Aborted(format!(
                    "gguf model at {path} aborted during embedding"
                )))
            }
            Err(e) => Err(SearchError::Aborted(format!(
                "blocking embedding task for {path} panicked: {e}"
            ))),
        }
    }
}

/// Runs the actual llama.cpp decode + embedding extraction. Kept as a
/// free function so it can be wrapped uniformly in `catch_unwind`.
fn embed_blocking(
    _model: &LlamaModel,
    context: &LlamaContext<'static>,
    text: &str,
    dimension: usize,
) -> Result<Vec<f32>> {
    if text.is_empty() {
        return Err(SearchError::EmptyText);
    }
    let tokens = context
        .model
        .str_to_token(text, llama_cpp_2::model::AddBos::Always)
        .map_err(|e| SearchError::Aborted(e.to_string()))?;

    let mut batch = LlamaBatch::new(tokens.len(), 1);
    for (i, token) in tokens.iter().enumerate() {
        let is_last = i == tokens.len() - 1;
        batch
            .add(*token, i as i32, &[0], is_last)
            .map_err(|e| SearchError::Aborted(e.to_string()))?;
    }

    context
        .decode(&mut batch)
        .map_err(|e| SearchError::Aborted(e.to_string()))?;

    let embedding = context
        .embeddings_seq_ith(0)
        .map_err(|e| SearchError::Aborted(e.to_string()))?
        .to_vec();

    if embedding.len() != dimension {
        return Err(SearchError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for GgufProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(SearchError::EmptyText);
        }
        self.embed_one(text).await
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        let mut out = Vec::with_capacity(texts.len());
        let mut failures = 0usize;
        for text in texts {
            match self.embed_one(text).await {
                Ok(vec) => out.push(Some(vec)),
                Err(e) => {
                    warn!(error = %e, "embedding item failed, storing without vector");
                    failures += 1;
                    out.push(None);
                }
            }
        }
        if failures == texts.len() && !texts.is_empty() {
            return Err(SearchError::BatchFailed { count: failures });
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    fn kind(&self) -> EmbeddingProviderKind {
        EmbeddingProviderKind::Gguf
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
