pub mod api_routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::ModelCatalog;
use crate::config::RelayConfig;

use api_routes::{chat_handler, health_handler, list_models_handler};

/// Shared state of the relay server.
#[derive(Clone)]
pub struct RelayState {
    pub client: reqwest::Client,
    pub config: Arc<RelayConfig>,
    pub catalog: Arc<ModelCatalog>,
}

impl RelayState {
    pub fn new(config: RelayConfig, catalog: ModelCatalog) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/models", get(list_models_handler))
        .route("/api/chat", post(chat_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
