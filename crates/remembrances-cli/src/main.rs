//! Remembrances-MCP command-line entry point.
//!
//! Loads configuration (global YAML → local YAML → `--config` file → env →
//! CLI flags, per spec.md §6), builds the storage/embedding/indexing
//! stack, optionally starts the knowledge-base watcher, and serves the
//! tool router over stdio, SSE, or streamable HTTP.
//!
//! CLI flag parsing, config loading, and transport selection are the
//! "external collaborator" layer spec.md §1 calls out as out of scope for
//! the core engine; this crate is that thin glue.

mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use remembrances_config::{normalize_addr, AppConfig, ConfigLoader, ConfigOverrides, LogFormat};
use remembrances_core::{Indexer, IndexerConfig, KbWatcher};
use remembrances_mcp::RemembrancesServer;
use remembrances_search::embeddings::EmbedderFactory;
use remembrances_search::HybridSearcher;
use remembrances_storage::{ConnectConfig, MemoryStore, SchemaManager, StorageDriver};

/// Persistent, queryable memory tool-server for AI agents.
#[derive(Parser, Debug)]
#[command(name = "remembrances-mcp", author, version, about, long_about = None)]
struct Cli {
    /// Path to an additional YAML config file to load
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage connection URL: memory://, rocksdb://<path>, surrealkv://<path>
    /// (embedded); ws://host:port, wss://host:port (remote)
    #[arg(long = "db-path", env = "GOMEM_DB_PATH")]
    db_path: Option<String>,
    #[arg(long = "db-user", env = "GOMEM_DB_USER")]
    db_user: Option<String>,
    #[arg(long = "db-pass", env = "GOMEM_DB_PASS")]
    db_pass: Option<String>,
    #[arg(long = "db-namespace", env = "GOMEM_DB_NAMESPACE")]
    db_namespace: Option<String>,
    #[arg(long = "db-database", env = "GOMEM_DB_DATABASE")]
    db_database: Option<String>,

    /// Path to a local GGUF embedding model (highest selection priority)
    #[arg(long = "gguf-model-path", env = "GOMEM_GGUF_MODEL_PATH")]
    gguf_model_path: Option<PathBuf>,
    #[arg(long = "gguf-threads", env = "GOMEM_GGUF_THREADS")]
    gguf_threads: Option<u32>,
    #[arg(long = "gguf-gpu-layers", env = "GOMEM_GGUF_GPU_LAYERS")]
    gguf_gpu_layers: Option<u32>,

    /// Ollama-compatible local HTTP embedder
    #[arg(long = "ollama-url", env = "GOMEM_OLLAMA_URL")]
    ollama_url: Option<String>,
    #[arg(long = "ollama-model", env = "GOMEM_OLLAMA_MODEL")]
    ollama_model: Option<String>,

    /// OpenAI-compatible remote HTTP embedder
    #[arg(long = "openai-key", env = "GOMEM_OPENAI_KEY")]
    openai_key: Option<String>,
    #[arg(long = "openai-model", env = "GOMEM_OPENAI_MODEL")]
    openai_model: Option<String>,

    /// Optional separate embedder for code symbols/chunks; falls back to
    /// the default embedder above when unset
    #[arg(long = "code-gguf-model-path", env = "GOMEM_CODE_GGUF_MODEL_PATH")]
    code_gguf_model_path: Option<PathBuf>,
    #[arg(long = "code-ollama-model", env = "GOMEM_CODE_OLLAMA_MODEL")]
    code_ollama_model: Option<String>,
    #[arg(long = "code-openai-model", env = "GOMEM_CODE_OPENAI_MODEL")]
    code_openai_model: Option<String>,

    /// Serve over the legacy SSE transport instead of stdio
    #[arg(long, env = "GOMEM_SSE")]
    sse: bool,
    #[arg(long = "sse-addr", env = "GOMEM_SSE_ADDR")]
    sse_addr: Option<String>,

    /// Serve over streamable HTTP (default endpoint) instead of stdio
    #[arg(long, env = "GOMEM_HTTP")]
    http: bool,
    #[arg(long = "http-addr", env = "GOMEM_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Serve over streamable HTTP at a configurable endpoint path
    #[arg(long = "mcp-http", env = "GOMEM_MCP_HTTP")]
    mcp_http: bool,
    #[arg(long = "mcp-http-addr", env = "GOMEM_MCP_HTTP_ADDR")]
    mcp_http_addr: Option<String>,
    #[arg(long = "mcp-http-endpoint", env = "GOMEM_MCP_HTTP_ENDPOINT")]
    mcp_http_endpoint: Option<String>,

    /// Directory of markdown documents watched into the knowledge base
    #[arg(long = "knowledge-base", env = "GOMEM_KNOWLEDGE_BASE")]
    knowledge_base: Option<PathBuf>,

    #[arg(long = "log-level", env = "GOMEM_LOG_LEVEL")]
    log_level: Option<String>,
    #[arg(long = "log-format", env = "GOMEM_LOG_FORMAT", value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(raw: &str) -> Result<LogFormat, String> {
    match raw.to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "text" => Ok(LogFormat::Text),
        other => Err(format!("unknown log format '{other}' (expected 'text' or 'json')")),
    }
}

impl Cli {
    /// Fold every `Some` flag into a [`ConfigOverrides`]; clap's `env`
    /// attribute has already resolved CLI-over-env precedence per field,
    /// so every `Some` here outranks whatever the YAML layers supplied.
    fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            db_path: self.db_path.clone(),
            db_user: self.db_user.clone().map(Some),
            db_pass: self.db_pass.clone().map(Some),
            db_namespace: self.db_namespace.clone(),
            db_database: self.db_database.clone(),
            gguf_model_path: self.gguf_model_path.clone().map(Some),
            gguf_threads: self.gguf_threads.map(Some),
            gguf_gpu_layers: self.gguf_gpu_layers.map(Some),
            ollama_url: self.ollama_url.clone().map(Some),
            ollama_model: self.ollama_model.clone().map(Some),
            openai_key: self.openai_key.clone().map(Some),
            openai_model: self.openai_model.clone().map(Some),
            code_gguf_model_path: self.code_gguf_model_path.clone().map(Some),
            code_ollama_model: self.code_ollama_model.clone().map(Some),
            code_openai_model: self.code_openai_model.clone().map(Some),
            sse: self.sse.then_some(true),
            sse_addr: self.sse_addr.clone().map(|v| Some(normalize_addr(&v))),
            http: self.http.then_some(true),
            http_addr: self.http_addr.clone().map(|v| Some(normalize_addr(&v))),
            mcp_http: self.mcp_http.then_some(true),
            mcp_http_addr: self.mcp_http_addr.clone().map(|v| Some(normalize_addr(&v))),
            mcp_http_endpoint: self.mcp_http_endpoint.clone().map(Some),
            knowledge_base: self.knowledge_base.clone().map(Some),
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

fn init_bootstrap_tracing() {
    // A minimal stderr subscriber so config-loading failures are visible
    // before the real level/format from AppConfig is known. stdout is
    // reserved for the stdio transport's JSON-RPC framing.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn reconfigure_tracing(config: &AppConfig) {
    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(builder.json().finish()),
        LogFormat::Text => Box::new(builder.finish()),
    };
    // A subscriber is already installed by `init_bootstrap_tracing`; only
    // the writer/level/format actually change here, so a failed swap
    // (e.g. a host process already forced its own subscriber) is not
    // fatal — logs simply keep using whatever was set first.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<()> {
    init_bootstrap_tracing();
    let cli = Cli::parse();

    let workspace_root = std::env::current_dir().context("resolving working directory")?;
    let overrides = cli.to_overrides();

    let mut loader = ConfigLoader::new();
    let config = loader
        .load_with_explicit(&workspace_root, cli.config.as_deref(), Some(&overrides))
        .context("loading configuration")?;

    config.validate().context("invalid configuration")?;
    reconfigure_tracing(&config);

    info!(db_path = %config.db_path, "starting remembrances-mcp");

    let driver = StorageDriver::connect(&ConnectConfig {
        url: config.db_path.clone(),
        username: config.db_user.clone(),
        password: config.db_pass.clone(),
        namespace: config.db_namespace.clone(),
        database: config.db_database.clone(),
        query_timeout: Duration::from_secs(30),
    })
    .await
    .context("connecting to storage backend")?;

    let schema_version = SchemaManager::migrate(&driver)
        .await
        .context("applying schema migrations")?;
    info!(schema_version, "schema up to date");

    let store = MemoryStore::new(driver);
    let embedders =
        Arc::new(EmbedderFactory::from_config(&config).context("configuring embedder")?);
    let searcher = Arc::new(HybridSearcher::new(store.clone()));
    let indexer = Arc::new(Indexer::new(
        store.clone(),
        embedders.clone(),
        IndexerConfig::default(),
    ));

    if let Some(kb_root) = config.knowledge_base.clone() {
        spawn_kb_watcher(store.clone(), embedders.clone(), kb_root);
    }

    let server = RemembrancesServer::new(store, embedders, searcher, indexer)
        .await
        .context("initializing MCP server")?;

    transport::serve(server, &config).await
}

/// Run the knowledge-base watcher's initial scan, then hand it a
/// background task for live filesystem events (spec.md §4.9). A failure
/// here is logged, not fatal — the server still starts and serves every
/// other tool.
fn spawn_kb_watcher(store: MemoryStore, embedders: Arc<EmbedderFactory>, root: PathBuf) {
    tokio::spawn(async move {
        let watcher = KbWatcher::new(store, embedders, root.clone());
        match watcher.initial_scan().await {
            Ok(count) => info!(root = %root.display(), reprocessed = count, "knowledge base initial scan done"),
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "knowledge base initial scan failed");
                return;
            }
        }
        if let Err(e) = watcher.run().await {
            tracing::warn!(root = %root.display(), error = %e, "knowledge base watcher stopped");
        }
    });
}
