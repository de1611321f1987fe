//! Transport selection (spec.md §1 "Transport framing", §6 CLI flags):
//! stdio by default, or SSE / streamable-HTTP when selected.
//!
//! This is thin glue over the `rmcp` SDK's transport implementations —
//! the tool router itself (`RemembrancesServer`) is transport-agnostic, so
//! every branch here just wires the same server value into a different
//! `rmcp`/`axum` listener.

use anyhow::{Context, Result};
use rmcp::transport::sse_server::SseServer;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::ServiceExt;
use tracing::info;

use remembrances_config::AppConfig;
use remembrances_mcp::RemembrancesServer;

const DEFAULT_SSE_ADDR: &str = ":8787";
const DEFAULT_HTTP_ADDR: &str = ":8788";
const DEFAULT_MCP_HTTP_ADDR: &str = ":8789";
const DEFAULT_MCP_HTTP_ENDPOINT: &str = "/mcp";

/// Serve `server` over whichever transport `config` selects. At most one
/// of `sse`/`http`/`mcp_http` should be set; when several are, SSE wins,
/// then plain streamable-HTTP, then the configurable-endpoint variant,
/// matching CLI flag declaration order in spec.md §6. stdio is the
/// fallback when none are set.
pub async fn serve(server: RemembrancesServer, config: &AppConfig) -> Result<()> {
    if config.sse {
        return serve_sse(server, config).await;
    }
    if config.http {
        return serve_streamable_http(server, config, DEFAULT_HTTP_ADDR, "/").await;
    }
    if config.mcp_http {
        let addr = config.mcp_http_addr.as_deref().unwrap_or(DEFAULT_MCP_HTTP_ADDR);
        let endpoint = config
            .mcp_http_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_MCP_HTTP_ENDPOINT);
        return serve_streamable_http(server, config, addr, endpoint).await;
    }
    serve_stdio(server).await
}

async fn serve_stdio(server: RemembrancesServer) -> Result<()> {
    info!("serving MCP over stdio");
    let service = server.serve(stdio()).await.context("starting stdio MCP transport")?;
    service.waiting().await.context("stdio MCP transport ended with an error")?;
    Ok(())
}

async fn serve_sse(server: RemembrancesServer, config: &AppConfig) -> Result<()> {
    let addr = config.sse_addr.as_deref().unwrap_or(DEFAULT_SSE_ADDR);
    info!(addr, "serving MCP over SSE");
    let ct = SseServer::serve(addr.parse().context("parsing --sse-addr")?)
        .await
        .context("starting SSE MCP transport")?
        .with_service(move || server.clone());
    tokio::signal::ctrl_c().await.ok();
    ct.cancel();
    Ok(())
}

async fn serve_streamable_http(
    server: RemembrancesServer,
    _config: &AppConfig,
    addr: &str,
    endpoint: &str,
) -> Result<()> {
    info!(addr, endpoint, "serving MCP over streamable HTTP");
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = axum::Router::new().nest_service(endpoint, service);
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding streamable-HTTP listener")?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("streamable-HTTP MCP transport ended with an error")?;
    Ok(())
}
