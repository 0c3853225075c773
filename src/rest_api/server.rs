//! # REST API HTTP Server
//!
//! Axum router for the data API. Every method on `{prefix}` and
//! `{prefix}/{*path}` lands in one handler; OPTIONS is answered locally as a
//! CORS preflight.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
        },
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::errors::ApiResult;
use super::executor::RequestExecutor;
use super::request::{ApiMethod, ApiRequest};
use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::observability::Event;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, PATCH";
pub const ALLOWED_HEADERS: &str = "Content-Type, Prefer";

/// Shared handler state
pub struct AppState {
    executor: RequestExecutor,
    authenticator: Authenticator,
}

/// REST API server
pub struct RestServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RestServer {
    pub fn new(config: ServerConfig, executor: RequestExecutor, authenticator: Authenticator) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                executor,
                authenticator,
            }),
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let prefix = self.config.api_prefix.trim_end_matches('/').to_string();

        Router::new()
            .route("/health", get(health_handler))
            .route(&prefix, any(api_handler))
            .route(&format!("{prefix}/{{*path}}"), any(api_handler))
            .layer(SetResponseHeaderLayer::if_not_present(
                ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Bind and serve until ctrl-c
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = self.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(
            event = Event::Serving.as_str(),
            addr = %addr,
            prefix = %self.config.api_prefix,
            "Serving data API"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!(event = Event::ShutdownComplete.as_str(), "Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(event = Event::ShutdownStart.as_str(), "Shutdown requested");
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Data API handler
async fn api_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return preflight_response();
    }

    let request = ApiRequest {
        method,
        path: uri.path().to_string(),
        query,
        headers,
        body,
    };

    match handle(&state, &request).await {
        Ok(payload) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/json")],
            payload.to_string(),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle(state: &AppState, request: &ApiRequest) -> ApiResult<serde_json::Value> {
    ApiMethod::parse(&request.method)?;
    let auth = state.authenticator.authenticate(&request.headers)?;
    state.executor.execute(request, &auth).await
}

fn preflight_response() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
            (ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
        ],
    )
        .into_response()
}
