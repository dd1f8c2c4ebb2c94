//! HTTP surface: upgrade dispatch, health, CORS, banner.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use flare_config::RelayConfig;
use serde::Serialize;

use crate::connection::handle_socket;
use crate::origin::OriginPolicy;
use crate::registry::ConnectionRegistry;

const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Shared state for every request handler.
#[derive(Clone)]
pub struct RelayState {
    pub registry: ConnectionRegistry,
    pub origins: Arc<OriginPolicy>,
    pub banner: Arc<str>,
    pub member_buffer: usize,
}

impl RelayState {
    pub fn new(config: &RelayConfig, registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            origins: Arc::new(OriginPolicy::new(&config.allowed_origins)),
            banner: Arc::from(config.banner.as_str()),
            member_buffer: config.member_buffer.max(1),
        }
    }
}

/// Health report body.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub clients: usize,
    pub timestamp: String,
}

/// Build the relay router.
///
/// `/health` reports liveness; every other path either upgrades to a relay
/// connection or answers with the banner.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .with_state(state)
}

async fn health(State(state): State<RelayState>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        clients: state.registry.count().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn fallback(
    State(state): State<RelayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(ws) = ws else {
        return banner(&state);
    };

    let origin = request_origin(&headers);
    if !state.origins.allows(origin) {
        tracing::warn!(peer = %addr, origin = ?origin, "Rejected upgrade from disallowed origin");
        return (StatusCode::FORBIDDEN, "Origin not allowed\n").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

fn banner(state: &RelayState) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.banner.to_string(),
    )
        .into_response()
}

fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(ORIGIN).and_then(|v| v.to_str().ok())
}

/// Answer preflights and stamp CORS headers on every response.
async fn cors(State(state): State<RelayState>, request: Request, next: Next) -> Response {
    let allow_origin = state
        .origins
        .allow_origin_header(request_origin(request.headers()));

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(value) = allow_origin.and_then(|o| HeaderValue::from_str(&o).ok()) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );

    response
}
