//! MCP agent gateway HTTP server
//!
//! Axum server providing Cognito login, HTML forms and a JSON API over one
//! shared MCP connection and a per-user session store.

mod auth;
mod config;
mod error;
mod handlers;
mod state;
mod views;
mod web;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentConfig, LlmProvider, SessionStore};
use agent_gateway::{ConnectionManager, McpConnector, QueryService, ServerRegistry};
use agent_runtime::OllamaProvider;

use crate::auth::AuthService;
use crate::config::ServerConfig;
use crate::state::AppState;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

pub fn app(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health_check))

        // Login
        .route("/auth/login", get(web::login))
        .route("/auth/callback", get(web::callback))
        .route("/auth/logout", get(web::logout))
        .route("/logout", get(web::logged_out))

        // HTML forms
        .route("/", get(web::home))
        .route("/web/connect", get(web::connect_form).post(web::connect))
        .route("/web/add_server", get(web::add_server_form).post(web::add_server))
        .route("/web/query", post(web::query))

        // JSON API
        .route("/connect", post(handlers::connect))
        .route("/query", post(handlers::query))
        .route("/session/{session_id}", delete(handlers::cleanup_session))
        .route("/sessions/{session_id}", get(handlers::get_session))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env()?;

    // LLM provider
    let provider = Arc::new(OllamaProvider::from_env()?);
    match provider.health_check().await {
        Ok(true) => tracing::info!(url = %provider.config().host, "Connected to Ollama"),
        Ok(false) | Err(_) => {
            tracing::warn!("Ollama not available, queries will fail until it is running");
        }
    }

    let connections = Arc::new(ConnectionManager::new(
        Arc::new(McpConnector::default()),
        provider,
        AgentConfig::default(),
    ));
    let sessions = Arc::new(SessionStore::with_history_limit(config.history_limit));
    let queries = Arc::new(QueryService::new(sessions.clone(), connections.clone()));
    let auth = Arc::new(AuthService::from_env()?);

    // Warm the default connection; the server still starts without it
    match connections.ensure_connection(&config.default_mcp_server).await {
        Ok(handle) => tracing::info!(
            endpoint = %config.default_mcp_server,
            tools = ?handle.tool_names(),
            "Default MCP server connected"
        ),
        Err(e) => tracing::warn!(error = %e, "Default MCP server unavailable"),
    }

    let reaper = {
        let auth = auth.clone();
        let idle_ttl = config.idle_ttl;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REAP_INTERVAL);
            loop {
                tick.tick().await;
                let sessions = sessions.reap_idle(idle_ttl).await;
                let logins = auth.logins().purge_expired().await;
                if sessions + logins > 0 {
                    tracing::debug!(sessions, logins, "Reaped idle sessions and expired logins");
                }
            }
        })
    };

    let state = AppState {
        queries,
        registry: Arc::new(ServerRegistry::new(config.servers_file.clone())),
        model_file: config.model_file.clone(),
        default_server: config.default_mcp_server.clone(),
        auth,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "MCP agent gateway listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    connections.teardown().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C");
    }
}
