//! Embedder factory: resolves the configured "default" and "code"
//! [`EmbeddingProvider`] instances from an [`AppConfig`], applying the
//! selection priority local GGUF > local HTTP > remote HTTP (spec.md §4.1).

use std::sync::Arc;

use remembrances_config::AppConfig;

use super::gguf::{GgufConfig, GgufProvider};
use super::http::{HttpConfig, HttpFlavor, HttpProvider};
use super::provider::EmbeddingProvider;
use crate::error::{Result, SearchError};

/// Default embedding dimension assumed for HTTP providers that don't
/// report one up front. Overridden once the first real embedding comes
/// back, via [`validate_dimension`].
const DEFAULT_HTTP_DIMENSION: usize = 768;

/// Holds the "default" embedder and, when configured, a separate "code"
/// embedder. The rest of the system asks for one or the other by name
/// (spec.md §4.1 "Selection priority") and never constructs a provider
/// directly.
pub struct EmbedderFactory {
    default: Arc<dyn EmbeddingProvider>,
    code: Arc<dyn EmbeddingProvider>,
}

impl EmbedderFactory {
    /// Build both instances from configuration. The code embedder falls
    /// back to the default instance when no code-specific variant is
    /// set.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let default = build_default_provider(cfg)?;
        let code = build_code_provider(cfg)?.unwrap_or_else(|| default.clone());
        Ok(Self { default, code })
    }

    /// Build a factory from already-constructed providers, bypassing
    /// configuration resolution. Used by callers (tests, embedders) that
    /// need a deterministic or in-memory provider instead of a real
    /// GGUF model or network endpoint.
    pub fn from_providers(default: Arc<dyn EmbeddingProvider>, code: Arc<dyn EmbeddingProvider>) -> Self {
        Self { default, code }
    }

    /// The embedder used for facts, memory vectors, knowledge-base
    /// documents, and any caller not asking specifically for "code".
    pub fn default(&self) -> Arc<dyn EmbeddingProvider> {
        self.default.clone()
    }

    /// The embedder used for code symbols and code chunks.
    pub fn code(&self) -> Arc<dyn EmbeddingProvider> {
        self.code.clone()
    }
}

fn build_default_provider(cfg: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if let Some(path) = &cfg.gguf_model_path {
        let provider = GgufProvider::load(&GgufConfig {
            model_path: path.clone(),
            n_threads: cfg.gguf_threads.unwrap_or(4),
            n_gpu_layers: cfg.gguf_gpu_layers.unwrap_or(0),
        })?;
        return Ok(Arc::new(provider));
    }

    if let Some(url) = &cfg.ollama_url {
        let provider = HttpProvider::new(HttpConfig {
            flavor: HttpFlavor::Ollama,
            base_url: url.clone(),
            model: cfg
                .ollama_model
                .clone()
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            api_key: None,
            dimension: DEFAULT_HTTP_DIMENSION,
            max_tokens: None,
            timeout: std::time::Duration::from_secs(60),
        })?;
        return Ok(Arc::new(provider));
    }

    if let Some(key) = &cfg.openai_key {
        let provider = HttpProvider::new(HttpConfig {
            flavor: HttpFlavor::OpenAi,
            base_url: "https://api.openai.com".to_string(),
            model: cfg
                .openai_model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            api_key: Some(key.clone()),
            dimension: DEFAULT_HTTP_DIMENSION,
            max_tokens: None,
            timeout: std::time::Duration::from_secs(60),
        })?;
        return Ok(Arc::new(provider));
    }

    Err(SearchError::NoProviderConfigured)
}

fn build_code_provider(cfg: &AppConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    if let Some(path) = &cfg.code_gguf_model_path {
        let provider = GgufProvider::load(&GgufConfig {
            model_path: path.clone(),
            n_threads: cfg.gguf_threads.unwrap_or(4),
            n_gpu_layers: cfg.gguf_gpu_layers.unwrap_or(0),
        })?;
        return Ok(Some(Arc::new(provider)));
    }

    if let Some(model) = &cfg.code_ollama_model {
        if let Some(url) = &cfg.ollama_url {
            let provider = HttpProvider::new(HttpConfig {
                flavor: HttpFlavor::Ollama,
                base_url: url.clone(),
                model: model.clone(),
                api_key: None,
                dimension: DEFAULT_HTTP_DIMENSION,
                max_tokens: None,
                timeout: std::time::Duration::from_secs(60),
            })?;
            return Ok(Some(Arc::new(provider)));
        }
    }

    if let Some(model) = &cfg.code_openai_model {
        if let Some(key) = &cfg.openai_key {
            let provider = HttpProvider::new(HttpConfig {
                flavor: HttpFlavor::OpenAi,
                base_url: "https://api.openai.com".to_string(),
                model: model.clone(),
                api_key: Some(key.clone()),
                dimension: DEFAULT_HTTP_DIMENSION,
                max_tokens: None,
                timeout: std::time::Duration::from_secs(60),
            })?;
            return Ok(Some(Arc::new(provider)));
        }
    }

    Ok(None)
}

/// Check a stored index's dimension against the currently configured
/// embedder; used at startup to catch a model swap that would silently
/// corrupt similarity scores.
pub fn validate_dimension(provider: &dyn EmbeddingProvider, stored_dimension: usize) -> Result<()> {
    if provider.dimension() != stored_dimension {
        return Err(SearchError::DimensionMismatch {
            expected: stored_dimension,
            actual: provider.dimension(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_provider_errors_when_unconfigured() {
        let cfg = AppConfig::default();
        let err = build_default_provider(&cfg).unwrap_err();
        assert!(matches!(err, SearchError::NoProviderConfigured));
    }

    #[test]
    fn test_build_code_provider_none_when_unset() {
        let cfg = AppConfig::default();
        let result = build_code_provider(&cfg).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_build_default_provider_prefers_ollama_over_openai() {
        let mut cfg = AppConfig::default();
        cfg.ollama_url = Some("http://127.0.0.1:11434".to_string());
        cfg.openai_key = Some("sk-test".to_string());
        let provider = build_default_provider(&cfg).unwrap();
        assert_eq!(
            provider.kind(),
            crate::embeddings::EmbeddingProviderKind::OllamaHttp
        );
    }
}
