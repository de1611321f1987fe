//! HTTP embedding provider speaking the OpenAI-compatible `/embeddings`
//! REST shape. Used for both local-HTTP (Ollama) and remote-HTTP (OpenAI
//! and compatible services) per spec.md §4.1 — both backends accept the
//! same request/response envelope, so one client covers both.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{
    truncate_to_budget, EmbeddingProvider, EmbeddingProviderKind, DEFAULT_CHARS_PER_TOKEN,
    MAX_CHARS_CEILING,
};
use crate::error::{Result, SearchError};

const DEFAULT_MAX_TOKENS: usize = 400;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 250;

/// Which flavor of HTTP embedder this is, purely for the `kind()` report
/// back to callers (local-HTTP vs. remote-HTTP per spec.md §4.1's
/// selection priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFlavor {
    /// Ollama-compatible local HTTP endpoint.
    Ollama,
    /// OpenAI-compatible remote HTTP endpoint.
    OpenAi,
}

/// Configuration for an HTTP-backed embedding provider.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub flavor: HttpFlavor,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub max_tokens: Option<usize>,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            flavor: HttpFlavor::Ollama,
            base_url: "http://127.0.0.1:11434".to_string(),
            model: String::new(),
            api_key: None,
            dimension: 768,
            max_tokens: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding provider that calls a remote or local HTTP endpoint
/// implementing the OpenAI `/v1/embeddings` contract.
pub struct HttpProvider {
    client: reqwest::Client,
    cfg: HttpConfig,
    max_chars: usize,
    max_tokens: usize,
}

impl HttpProvider {
    pub fn new(cfg: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        let max_tokens = cfg.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let max_chars = (max_tokens * DEFAULT_CHARS_PER_TOKEN).min(MAX_CHARS_CEILING);
        Ok(Self {
            client,
            cfg,
            max_chars,
            max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.cfg.base_url.trim_end_matches('/'))
    }

    async fn post_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let endpoint = self.endpoint();
        let body = EmbeddingRequest {
            model: &self.cfg.model,
            input: texts.to_vec(),
        };

        let mut attempt = 0u32;
        loop {
            let mut req = self.client.post(&endpoint).json(&body);
            if let Some(key) = &self.cfg.api_key {
                req = req.bearer_auth(key);
            }

            let send_result = req.send().await;
            match send_result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingResponse = resp.json().await?;
                    let mut ordered = vec![Vec::new(); texts.len()];
                    for datum in parsed.data {
                        if datum.index < ordered.len() {
                            ordered[datum.index] = datum.embedding;
                        }
                    }
                    return Ok(ordered);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let message = resp.text().await.unwrap_or_default();
                    if attempt >= MAX_RETRIES || !status.is_server_error() {
                        return Err(SearchError::Http {
                            endpoint,
                            message: format!("{status}: {message}"),
                        });
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(SearchError::Reqwest(e));
                    }
                }
            }

            attempt += 1;
            let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt.min(5));
            tracing::warn!(endpoint, attempt, backoff, "retrying embedding request");
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(SearchError::EmptyText);
        }
        let truncated = truncate_to_budget(text, self.max_chars);
        let mut vectors = self.post_batch(&[&truncated]).await?;
        let embedding = vectors.pop().unwrap_or_default();
        if embedding.len() != self.cfg.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.cfg.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<std::borrow::Cow<'_, str>> = texts
            .iter()
            .map(|t| truncate_to_budget(t, self.max_chars))
            .collect();
        let refs: Vec<&str> = truncated.iter().map(|c| c.as_ref()).collect();

        match self.post_batch(&refs).await {
            Ok(vectors) => {
                let mut out = Vec::with_capacity(vectors.len());
                let mut failures = 0usize;
                for embedding in vectors {
                    if embedding.len() != self.cfg.dimension {
                        tracing::warn!(
                            expected = self.cfg.dimension,
                            actual = embedding.len(),
                            "embedding item returned the wrong dimension, storing without vector"
                        );
                        failures += 1;
                        out.push(None);
                    } else {
                        out.push(Some(embedding));
                    }
                }
                if failures == texts.len() && !texts.is_empty() {
                    return Err(SearchError::BatchFailed { count: failures });
                }
                Ok(out)
            }
            Err(e) => {
                tracing::warn!(error = %e, count = texts.len(), "batch embedding request failed entirely");
                Err(SearchError::BatchFailed { count: texts.len() })
            }
        }
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn chars_per_token(&self) -> usize {
        DEFAULT_CHARS_PER_TOKEN
    }

    fn kind(&self) -> EmbeddingProviderKind {
        match self.cfg.flavor {
            HttpFlavor::Ollama => EmbeddingProviderKind::OllamaHttp,
            HttpFlavor::OpenAi => EmbeddingProviderKind::OpenAiHttp,
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_query_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(HttpConfig {
            flavor: HttpFlavor::Ollama,
            base_url: server.uri(),
            model: "test-model".to_string(),
            dimension: 3,
            ..Default::default()
        })
        .unwrap();

        let embedding = provider.embed_query("hello world").await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_query_rejects_empty_text() {
        let provider = HttpProvider::new(HttpConfig::default()).unwrap();
        let err = provider.embed_query("").await.unwrap_err();
        assert!(matches!(err, SearchError::EmptyText));
    }

    #[tokio::test]
    async fn test_embed_documents_partial_batch_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [1.0, 0.0], "index": 1},
                    {"embedding": [0.0, 1.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(HttpConfig {
            flavor: HttpFlavor::OpenAi,
            base_url: server.uri(),
            model: "test-model".to_string(),
            dimension: 2,
            ..Default::default()
        })
        .unwrap();

        let result = provider
            .embed_documents(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(result[0], Some(vec![0.0, 1.0]));
        assert_eq!(result[1], Some(vec![1.0, 0.0]));
    }
}
