use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use chgd_core::generate::TextGenerator;
use chgd_engine::{QueryEngine, StatsAggregator};
use chgd_store::Database;

use crate::chat::ChatBridge;
use crate::handlers;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub query: Arc<QueryEngine>,
    pub stats: Arc<StatsAggregator>,
    pub bridge: Arc<ChatBridge>,
}

impl AppState {
    pub fn new(db: Database, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            query: Arc::new(QueryEngine::new(db.clone())),
            stats: Arc::new(StatsAggregator::new(db.clone())),
            bridge: Arc::new(ChatBridge::new(db.clone(), generator)),
            db,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tickets", get(handlers::list_tickets))
        .route("/tickets/{id}", get(handlers::get_ticket))
        .route("/stats", get(handlers::get_stats))
        .route("/chat", post(handlers::chat))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle holding the bound port.
pub async fn start(
    config: ServerConfig,
    db: Database,
    generator: Arc<dyn TextGenerator>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(db, generator);
    let router = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "chgd server started");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server terminated");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}
