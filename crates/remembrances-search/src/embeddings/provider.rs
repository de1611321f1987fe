//! Embedding provider trait: the uniform surface the rest of the system
//! calls, regardless of whether the backing model runs in-process or over
//! HTTP (spec.md §4.1).

use async_trait::async_trait;

use crate::error::Result;

/// Default characters-per-token ratio used to derive `max_chars` from
/// `max_tokens` when a provider doesn't measure it directly.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 2;

/// Hard ceiling on `max_chars` regardless of what the token budget would
/// otherwise allow (spec.md §4.1).
pub const MAX_CHARS_CEILING: usize = 900;

/// Safety margin subtracted from a model's physical ubatch size before it
/// is treated as the dispatchable token budget.
pub const UBATCH_SAFETY_MARGIN: f32 = 0.88;

/// Identifies which kind of model sits behind an [`EmbeddingProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingProviderKind {
    /// Local GGUF model loaded in-process via llama.cpp bindings.
    Gguf,
    /// Local Ollama-compatible HTTP endpoint.
    OllamaHttp,
    /// Remote OpenAI-compatible HTTP endpoint.
    OpenAiHttp,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gguf => write!(f, "gguf"),
            Self::OllamaHttp => write!(f, "ollama-http"),
            Self::OpenAiHttp => write!(f, "openai-http"),
        }
    }
}

/// Turns text batches into fixed-dimension float vectors (spec.md §4.1).
///
/// Implementations must be `Send + Sync`: the local GGUF provider
/// serializes calls internally behind a mutex because the native model is
/// not reentrant (spec.md §5 "Embedder rentrancy"); HTTP-based providers
/// dispatch concurrently.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single query string. Fails when `text` is empty or the
    /// model is unavailable.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of documents. Never aborts the whole batch: a
    /// failure on item *i* yields `None` at position *i* and logs the
    /// cause. Fails only when *every* item failed.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>>;

    /// Fixed output dimension D.
    fn dimension(&self) -> usize;

    /// Maximum input length in characters a caller may pass without the
    /// provider truncating it itself.
    fn max_chars(&self) -> usize;

    /// Maximum input length in tokens, derived from the model's physical
    /// ubatch size.
    fn max_tokens(&self) -> usize;

    /// Characters-per-token ratio used to derive `max_chars` from
    /// `max_tokens`.
    fn chars_per_token(&self) -> usize;

    /// Which kind of provider this is.
    fn kind(&self) -> EmbeddingProviderKind;

    /// Release any held resources. Idempotent; safe to call more than
    /// once.
    async fn close(&self) -> Result<()>;
}

/// Truncate `text` to at most `max_chars` bytes at a `char` boundary,
/// logging a warning with the original length when truncation occurs.
/// Shared by every provider per spec.md §4.1's "Contract with callers".
pub(crate) fn truncate_to_budget(text: &str, max_chars: usize) -> std::borrow::Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return std::borrow::Cow::Borrowed(text);
    }
    let original_len = text.chars().count();
    let truncated: String = text.chars().take(max_chars).collect();
    tracing::warn!(
        original_len,
        max_chars,
        "truncating text to embedder's character budget"
    );
    std::borrow::Cow::Owned(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_budget_passthrough() {
        assert_eq!(truncate_to_budget("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_to_budget_truncates() {
        assert_eq!(truncate_to_budget("hello world", 5), "hello");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EmbeddingProviderKind::Gguf.to_string(), "gguf");
        assert_eq!(EmbeddingProviderKind::OllamaHttp.to_string(), "ollama-http");
        assert_eq!(EmbeddingProviderKind::OpenAiHttp.to_string(), "openai-http");
    }
}
