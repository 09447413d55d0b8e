use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::BridgeConfig;
use crate::tryon::provider::{HttpTryOnProvider, ProviderError};
use crate::tryon::service::TryOnService;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub tryon: TryOnService,
}

impl AppState {
    pub fn new(tryon: TryOnService) -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME"),
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            tryon,
        }
    }
}

pub fn build_router(config: &BridgeConfig) -> Result<Router, ProviderError> {
    let provider = HttpTryOnProvider::new(config.http_timeout)?;
    let service = TryOnService::new(Arc::new(provider), config.service_settings());
    Ok(build_router_with_service(service, config.body_limit_bytes))
}

pub fn build_router_with_service(service: TryOnService, body_limit_bytes: usize) -> Router {
    let state = AppState::new(service);
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tryon", post(crate::api::tryon::tryon_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: BridgeConfig) -> std::io::Result<()> {
    let app = build_router(&config).map_err(std::io::Error::other)?;
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        bind = %config.bind,
        provider = %config.endpoint_url,
        "starting tryon-bridge HTTP surface"
    );
    axum::serve(listener, app).await
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
