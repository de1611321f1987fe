//! Remembrances-MCP Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.remembrances-mcp/config.yaml`
//! - Local config: `.remembrances-mcp/config.yaml` (in workspace)
//! - Environment variables, prefix `GOMEM_`, dashes → underscores
//! - CLI overrides via [`ConfigOverrides`]
//!
//! Configuration is merged in order: global → local → env → CLI overrides
//! (each later source wins over the earlier ones, per field).

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for Remembrances-MCP.
///
/// Field names match the dashed CLI flag / YAML key names from the spec
/// (`db-path`, `gguf-model-path`, ...) via `rename_all = "kebab-case"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    /// Path to an additional YAML config file to load (set via `--config`,
    /// consumed by the CLI before this struct is built; kept here only so
    /// it round-trips through a written-out config file).
    pub config: Option<PathBuf>,

    /// Storage connection URL. Scheme selects embedded vs. remote:
    /// `memory://`, `rocksdb://path`, `surrealkv://path` (embedded);
    /// `ws://` / `wss://` (remote).
    pub db_path: String,
    pub db_user: Option<String>,
    pub db_pass: Option<String>,
    pub db_namespace: String,
    pub db_database: String,

    // Default embedder selection (local GGUF > local HTTP > remote HTTP).
    pub gguf_model_path: Option<PathBuf>,
    pub gguf_threads: Option<u32>,
    pub gguf_gpu_layers: Option<u32>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub openai_key: Option<String>,
    pub openai_model: Option<String>,

    // Optional separate "code embedder", falls back to the default embedder
    // instance when unset.
    pub code_gguf_model_path: Option<PathBuf>,
    pub code_ollama_model: Option<String>,
    pub code_openai_model: Option<String>,

    // Transport selection. stdio is the default when none of these are set.
    pub sse: bool,
    pub sse_addr: Option<String>,
    pub http: bool,
    pub http_addr: Option<String>,
    pub mcp_http: bool,
    pub mcp_http_addr: Option<String>,
    pub mcp_http_endpoint: Option<String>,

    /// Directory of markdown documents watched into the knowledge base.
    pub knowledge_base: Option<PathBuf>,

    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            db_path: "memory://".to_string(),
            db_user: None,
            db_pass: None,
            db_namespace: "test".to_string(),
            db_database: "test".to_string(),
            gguf_model_path: None,
            gguf_threads: None,
            gguf_gpu_layers: None,
            ollama_url: None,
            ollama_model: None,
            openai_key: None,
            openai_model: None,
            code_gguf_model_path: None,
            code_ollama_model: None,
            code_openai_model: None,
            sse: false,
            sse_addr: None,
            http: false,
            http_addr: None,
            mcp_http: false,
            mcp_http_addr: None,
            mcp_http_endpoint: None,
            knowledge_base: None,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

impl AppConfig {
    /// Validate the configuration.
    ///
    /// A `ConfigError::ValidationError` is returned when no embedder is
    /// selected at all — `ConfigError`'s canonical example per the error
    /// taxonomy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gguf_model_path.is_none()
            && self.ollama_url.is_none()
            && self.openai_key.is_none()
        {
            return Err(ConfigError::ValidationError(
                "no embedder configured: set one of gguf-model-path, ollama-url, or openai-key"
                    .to_string(),
            ));
        }
        if self.db_path.is_empty() {
            return Err(ConfigError::invalid_value("db-path", "must not be empty"));
        }
        Ok(())
    }

    /// Apply CLI-resolved overrides on top of this (file-loaded) config.
    ///
    /// Each override field in [`ConfigOverrides`] has already resolved the
    /// env-vs-CLI precedence (via clap's `env` attribute on the caller's
    /// argument struct); only `Some` values here win over the YAML value.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        macro_rules! apply {
            ($field:ident) => {
                if let Some(ref v) = overrides.$field {
                    self.$field = v.clone();
                }
            };
        }
        apply!(db_path);
        apply!(db_user);
        apply!(db_pass);
        apply!(db_namespace);
        apply!(db_database);
        apply!(gguf_model_path);
        apply!(gguf_threads);
        apply!(gguf_gpu_layers);
        apply!(ollama_url);
        apply!(ollama_model);
        apply!(openai_key);
        apply!(openai_model);
        apply!(code_gguf_model_path);
        apply!(code_ollama_model);
        apply!(code_openai_model);
        apply!(sse_addr);
        apply!(http_addr);
        apply!(mcp_http_addr);
        apply!(mcp_http_endpoint);
        apply!(knowledge_base);
        apply!(log_level);

        if let Some(v) = overrides.sse {
            self.sse = v;
        }
        if let Some(v) = overrides.http {
            self.http = v;
        }
        if let Some(v) = overrides.mcp_http {
            self.mcp_http = v;
        }
        if let Some(v) = overrides.log_format {
            self.log_format = v;
        }
    }
}

/// Overrides collected from CLI flags (each already env-resolved by clap).
///
/// Every field is `Option<T>`; `None` means "use whatever the lower-priority
/// sources (global/local YAML) supplied, or the struct default".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<String>,
    pub db_user: Option<Option<String>>,
    pub db_pass: Option<Option<String>>,
    pub db_namespace: Option<String>,
    pub db_database: Option<String>,

    pub gguf_model_path: Option<Option<PathBuf>>,
    pub gguf_threads: Option<Option<u32>>,
    pub gguf_gpu_layers: Option<Option<u32>>,
    pub ollama_url: Option<Option<String>>,
    pub ollama_model: Option<Option<String>>,
    pub openai_key: Option<Option<String>>,
    pub openai_model: Option<Option<String>>,

    pub code_gguf_model_path: Option<Option<PathBuf>>,
    pub code_ollama_model: Option<Option<String>>,
    pub code_openai_model: Option<Option<String>>,

    pub sse: Option<bool>,
    pub sse_addr: Option<Option<String>>,
    pub http: Option<bool>,
    pub http_addr: Option<Option<String>>,
    pub mcp_http: Option<bool>,
    pub mcp_http_addr: Option<Option<String>>,
    pub mcp_http_endpoint: Option<Option<String>>,

    pub knowledge_base: Option<Option<PathBuf>>,

    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// Normalize an address flag value: a bare port number is prepended with
/// `:`; `host:port` passes through unchanged.
///
/// Per spec.md §6: "Address values accept either `port` or `host:port`; a
/// bare number is normalized by prepending `:`."
pub fn normalize_addr(raw: &str) -> String {
    if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
        format!(":{raw}")
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, "memory://");
        assert_eq!(config.db_namespace, "test");
        assert_eq!(config.db_database, "test");
        assert!(!config.sse);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_validate_requires_embedder() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no embedder configured"));
    }

    #[test]
    fn test_validate_passes_with_openai_key() {
        let mut config = AppConfig::default();
        config.openai_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::default();
        let overrides = ConfigOverrides {
            db_path: Some("rocksdb:///tmp/data".to_string()),
            log_level: Some("debug".to_string()),
            sse: Some(true),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.db_path, "rocksdb:///tmp/data");
        assert_eq!(config.log_level, "debug");
        assert!(config.sse);
    }

    #[test]
    fn test_apply_overrides_can_clear_optional_field() {
        let mut config = AppConfig::default();
        config.ollama_url = Some("http://localhost:11434".to_string());

        let overrides = ConfigOverrides {
            ollama_url: Some(None),
            ..Default::default()
        };
        config.apply_overrides(&overrides);

        assert_eq!(config.ollama_url, None);
    }

    #[test]
    fn test_yaml_roundtrip_uses_kebab_case_keys() {
        let mut config = AppConfig::default();
        config.gguf_model_path = Some(PathBuf::from("/models/e5.gguf"));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("gguf-model-path"));
        assert!(yaml.contains("db-path"));

        let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_normalize_addr_bare_port() {
        assert_eq!(normalize_addr("8080"), ":8080");
    }

    #[test]
    fn test_normalize_addr_host_port_unchanged() {
        assert_eq!(normalize_addr("0.0.0.0:8080"), "0.0.0.0:8080");
        assert_eq!(normalize_addr("localhost:8080"), "localhost:8080");
    }
}
