//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them, each source
//! overriding the previous:
//! 1. Global config: `~/.remembrances-mcp/config.yaml`
//! 2. Local config: `.remembrances-mcp/config.yaml` (in workspace)
//! 3. Environment variables, prefix `GOMEM_`
//! 4. CLI overrides (already env-resolved by the caller's `clap` parser)

use crate::error::ConfigError;
use crate::{AppConfig, ConfigOverrides};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const CONFIG_FILE_NAME: &str = "config.yaml";
const GLOBAL_CONFIG_DIR: &str = ".remembrances-mcp";
const LOCAL_CONFIG_DIR: &str = ".remembrances-mcp";
const ENV_PREFIX: &str = "GOMEM_";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.remembrances-mcp`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<AppConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory
    /// (`~/.remembrances-mcp`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → env → CLI overrides.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<AppConfig, ConfigError> {
        self.load_with_explicit(workspace_root, None, overrides)
    }

    /// Load configuration for a workspace, additionally merging an
    /// explicit `--config <path>` file between the local config and the
    /// env/CLI overrides.
    ///
    /// Merges config in order: global → local → explicit file → env →
    /// CLI overrides.
    pub fn load_with_explicit(
        &mut self,
        workspace_root: &Path,
        explicit_path: Option<&Path>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(path) = explicit_path {
            let explicit_config = load_config_file(path)?;
            config = merge_configs(config, explicit_config);
        }

        let env_overrides = load_env_overrides();
        config.apply_overrides(&env_overrides);

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<AppConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<AppConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        let global_path = global_dir.join(CONFIG_FILE_NAME);
        save_config_file(&global_path, config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(&self, workspace_root: &Path, config: &AppConfig) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        save_config_file(&local_path, config)
    }

    /// Initialize global configuration directory.
    ///
    /// Creates `~/.remembrances-mcp/config.yaml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        if !global_dir.exists() {
            std::fs::create_dir_all(global_dir)
                .map_err(|e| ConfigError::create_dir(global_dir, e))?;
        }

        let config_path = global_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            save_config_file(&config_path, &AppConfig::default())?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::parse_yaml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two fully-materialized configs, with `overlay` taking precedence
/// for any field that differs from [`AppConfig::default`].
///
/// Because `AppConfig` is flat (unlike a partial/`Option`-wrapped document),
/// we treat "still at default" as "not set by this layer" — the same
/// sentinel-comparison approach the CLI-override merge uses, just applied
/// file-to-file instead of file-to-CLI.
fn merge_configs(base: AppConfig, overlay: AppConfig) -> AppConfig {
    let default = AppConfig::default();
    AppConfig {
        config: overlay.config.or(base.config),
        db_path: if overlay.db_path != default.db_path {
            overlay.db_path
        } else {
            base.db_path
        },
        db_user: overlay.db_user.or(base.db_user),
        db_pass: overlay.db_pass.or(base.db_pass),
        db_namespace: if overlay.db_namespace != default.db_namespace {
            overlay.db_namespace
        } else {
            base.db_namespace
        },
        db_database: if overlay.db_database != default.db_database {
            overlay.db_database
        } else {
            base.db_database
        },
        gguf_model_path: overlay.gguf_model_path.or(base.gguf_model_path),
        gguf_threads: overlay.gguf_threads.or(base.gguf_threads),
        gguf_gpu_layers: overlay.gguf_gpu_layers.or(base.gguf_gpu_layers),
        ollama_url: overlay.ollama_url.or(base.ollama_url),
        ollama_model: overlay.ollama_model.or(base.ollama_model),
        openai_key: overlay.openai_key.or(base.openai_key),
        openai_model: overlay.openai_model.or(base.openai_model),
        code_gguf_model_path: overlay.code_gguf_model_path.or(base.code_gguf_model_path),
        code_ollama_model: overlay.code_ollama_model.or(base.code_ollama_model),
        code_openai_model: overlay.code_openai_model.or(base.code_openai_model),
        sse: overlay.sse || base.sse,
        sse_addr: overlay.sse_addr.or(base.sse_addr),
        http: overlay.http || base.http,
        http_addr: overlay.http_addr.or(base.http_addr),
        mcp_http: overlay.mcp_http || base.mcp_http,
        mcp_http_addr: overlay.mcp_http_addr.or(base.mcp_http_addr),
        mcp_http_endpoint: overlay.mcp_http_endpoint.or(base.mcp_http_endpoint),
        knowledge_base: overlay.knowledge_base.or(base.knowledge_base),
        log_level: if overlay.log_level != default.log_level {
            overlay.log_level
        } else {
            base.log_level
        },
        log_format: if overlay.log_format != default.log_format {
            overlay.log_format
        } else {
            base.log_format
        },
    }
}

/// Read `GOMEM_*` environment variables into a [`ConfigOverrides`].
///
/// Key mapping: same field name, uppercased, prefixed with `GOMEM_`
/// (dashes in the CLI/YAML key become underscores, e.g.
/// `gguf-model-path` → `GOMEM_GGUF_MODEL_PATH`).
fn load_env_overrides() -> ConfigOverrides {
    fn var(key: &str) -> Option<String> {
        std::env::var(format!("{ENV_PREFIX}{key}")).ok()
    }
    fn flag(key: &str) -> Option<bool> {
        var(key).map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
    }

    ConfigOverrides {
        db_path: var("DB_PATH"),
        db_user: var("DB_USER").map(Some),
        db_pass: var("DB_PASS").map(Some),
        db_namespace: var("DB_NAMESPACE"),
        db_database: var("DB_DATABASE"),
        gguf_model_path: var("GGUF_MODEL_PATH").map(|v| Some(PathBuf::from(v))),
        gguf_threads: var("GGUF_THREADS").map(|v| v.parse().ok()),
        gguf_gpu_layers: var("GGUF_GPU_LAYERS").map(|v| v.parse().ok()),
        ollama_url: var("OLLAMA_URL").map(Some),
        ollama_model: var("OLLAMA_MODEL").map(Some),
        openai_key: var("OPENAI_KEY").map(Some),
        openai_model: var("OPENAI_MODEL").map(Some),
        code_gguf_model_path: var("CODE_GGUF_MODEL_PATH").map(|v| Some(PathBuf::from(v))),
        code_ollama_model: var("CODE_OLLAMA_MODEL").map(Some),
        code_openai_model: var("CODE_OPENAI_MODEL").map(Some),
        sse: flag("SSE"),
        sse_addr: var("SSE_ADDR").map(Some),
        http: flag("HTTP"),
        http_addr: var("HTTP_ADDR").map(Some),
        mcp_http: flag("MCP_HTTP"),
        mcp_http_addr: var("MCP_HTTP_ADDR").map(Some),
        mcp_http_endpoint: var("MCP_HTTP_ENDPOINT").map(Some),
        knowledge_base: var("KNOWLEDGE_BASE").map(|v| Some(PathBuf::from(v))),
        log_level: var("LOG_LEVEL"),
        log_format: var("LOG_FORMAT").and_then(|v| match v.to_lowercase().as_str() {
            "json" => Some(crate::LogFormat::Json),
            "text" => Some(crate::LogFormat::Text),
            _ => None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_global_config_path() {
        let loader = ConfigLoader::with_global_dir("/home/user/.remembrances-mcp");
        assert_eq!(
            loader.global_config_path(),
            Some(PathBuf::from("/home/user/.remembrances-mcp/config.yaml"))
        );
    }

    #[test]
    fn test_load_missing_files_returns_default() {
        let tmp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(tmp.path().join("global"));
        let config = loader.load(tmp.path(), None).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_local_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(tmp.path().join("global"));

        let mut config = AppConfig::default();
        config.db_path = "rocksdb:///tmp/store".to_string();
        loader.save_local(tmp.path(), &config).unwrap();

        let loaded = loader.load_local(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded.db_path, "rocksdb:///tmp/store");
    }

    #[test]
    fn test_local_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global_dir = tmp.path().join("global");
        let loader = ConfigLoader::with_global_dir(global_dir.clone());

        let mut global = AppConfig::default();
        global.log_level = "warn".to_string();
        save_config_file(&global_dir.join(CONFIG_FILE_NAME), &global).unwrap();

        let mut local = AppConfig::default();
        local.log_level = "trace".to_string();
        loader.save_local(tmp.path(), &local).unwrap();

        let mut loader = loader;
        let merged = loader.load(tmp.path(), None).unwrap();
        assert_eq!(merged.log_level, "trace");
    }

    #[test]
    fn test_cli_overrides_win_over_files() {
        let tmp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(tmp.path().join("global"));

        let overrides = ConfigOverrides {
            db_path: Some("memory://".to_string()),
            ..Default::default()
        };
        let config = loader.load(tmp.path(), Some(&overrides)).unwrap();
        assert_eq!(config.db_path, "memory://");
    }
}
