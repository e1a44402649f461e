use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{call_tool, health_check, list_tools, AppState};
use crate::config::ServiceConfig;
use crate::source::{
    BackendClient, Dispatcher, GraphqlCatalog, ProjectCatalog, RestCatalog, SchemaCatalog,
};
use crate::tools::ToolContext;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl From<&ServiceConfig> for ServerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Tools
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Wire the backend client into a tool context
pub fn tool_context(config: &ServiceConfig) -> Result<ToolContext, Box<dyn std::error::Error>> {
    let client = BackendClient::new(config.backend_settings())?;
    let catalogs: Vec<Arc<dyn ProjectCatalog>> = vec![
        Arc::new(RestCatalog::new(client.clone())),
        Arc::new(GraphqlCatalog::new(client.clone())),
    ];
    let schemas: Vec<Arc<dyn SchemaCatalog>> = vec![Arc::new(GraphqlCatalog::new(client.clone()))];

    Ok(ToolContext::new(Arc::new(client), catalogs)
        .with_schemas(schemas)
        .with_dispatcher(Dispatcher::new(config.source_timeout))
        .with_usage_fields(config.usage_fields.clone()))
}

/// Run the HTTP server
pub async fn run_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState {
        tools: tool_context(&config)?,
    });
    tracing::info!(
        export_url = %config.export_url,
        rest_url = %config.rest_url,
        graphql_url = %config.graphql_url,
        timeout_secs = config.source_timeout.as_secs(),
        "Backend configured"
    );

    let app = build_router(state);

    let server = ServerConfig::from(&config);
    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
    tracing::info!("Starting tracescope server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("tracescope server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
