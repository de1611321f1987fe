//! Error types for remembrances-search.

use thiserror::Error;

/// Errors that can occur during embedding provider selection or dispatch.
/// Corresponds to the workspace taxonomy's `EmbeddingError` (spec.md §7):
/// model load failure, all-batch failure, dimension mismatch with a stored
/// index.
#[derive(Error, Debug)]
pub enum SearchError {
    /// No embedder provider is configured at all.
    #[error("no embedding provider configured: set a GGUF model path, an Ollama URL, or an OpenAI key")]
    NoProviderConfigured,

    /// The local GGUF model failed to load.
    #[error("failed to load GGUF model at {path}: {message}")]
    ModelLoad { path: String, message: String },

    /// A remote HTTP embedder returned a non-success response.
    #[error("embedding request to {endpoint} failed: {message}")]
    Http { endpoint: String, message: String },

    /// `embed_query` was called with empty text.
    #[error("cannot embed empty text")]
    EmptyText,

    /// Every item in a batch failed to embed.
    #[error("all {count} items in batch failed to embed")]
    BatchFailed { count: usize },

    /// A stored embedding's dimension does not match the configured model
    /// dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A storage-layer call failed outside the per-branch failure model
    /// (e.g. embedding succeeded but the query itself could not be
    /// dispatched).
    #[error("storage error: {0}")]
    Storage(#[from] remembrances_storage::StorageError),

    /// The native model call panicked or aborted; converted to a typed
    /// error by the panic guard (spec.md §9 "Panic/abort boundaries").
    #[error("embedding call aborted: {0}")]
    Aborted(String),

    /// Underlying HTTP client error.
    #[error("http client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (e.g. loading a GGUF model file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for remembrances-search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
