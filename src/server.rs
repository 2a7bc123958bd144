//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that open the
//! knowledge base and hand it to the MCP tool handler.

use crate::config::NoesisConfig;
use crate::knowledge::KnowledgeBase;
use crate::tools::NoesisTools;
use anyhow::Result;
use rmcp::ServiceExt;

/// Open the knowledge base off the async executor; catching the index up
/// may re-embed every note.
async fn open_knowledge_base(config: NoesisConfig) -> Result<KnowledgeBase> {
    let kb = tokio::task::spawn_blocking(move || {
        let kb = KnowledgeBase::open(config)?;
        kb.rebuild_if_stale()?;
        anyhow::Ok(kb)
    })
    .await??;
    tracing::info!(
        db = %kb.config().resolved_db_path().display(),
        ai_enabled = kb.coordinator().ai_enabled(),
        indexed = kb.index().len(),
        "knowledge base ready"
    );
    Ok(kb)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: NoesisConfig) -> Result<()> {
    tracing::info!("starting Noesis MCP server on stdio");

    let kb = open_knowledge_base(config).await?;

    let tools = NoesisTools::new(kb);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: NoesisConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting Noesis MCP server on HTTP");

    let kb = open_knowledge_base(config).await?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(NoesisTools::new(kb.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
