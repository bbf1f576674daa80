//! HTTP API for the Ferry node.
//!
//! Git paths have arbitrary repository prefixes, so they cannot be expressed as
//! axum routes. Everything that is not an operational endpoint falls through to
//! [`git_http`], which dispatches on the route table in [`crate::routes`].

use axum::{
    extract::{Query, Request, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ferry_git::{AccessPolicy, GitCommand};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::files;
use crate::observability::{access_log_layer, metrics_handler, metrics_layer, request_id_layer};
use crate::routes::{self, Dispatch, RouteKind};
use crate::smart;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Services that may be run.
    pub policy: AccessPolicy,
    /// Transfer executable invocation.
    pub git: Arc<GitCommand>,
}

impl AppState {
    /// Builds handler state from a loaded configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            policy: config.access_policy(),
            git: Arc::new(config.git_command()),
            config: Arc::new(config),
        }
    }
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .fallback(git_http)
        .layer(metrics_layer())
        .layer(access_log_layer())
        .layer(request_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Serves every git path, dumb or smart.
///
/// Routing and file resolution both work on the percent-decoded path.
async fn git_http(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    // Repository names may be percent-encoded by clients.
    let decoded = match percent_decode_str(parts.uri.path()).decode_utf8() {
        Ok(path) => path,
        Err(_) => {
            debug!(path = %parts.uri.path(), "Request path is not valid UTF-8");
            return ApiError::NotFound.into_response();
        }
    };
    let path: &str = &decoded;

    let matched = match routes::dispatch(&parts.method, path) {
        Dispatch::Handle(matched) => matched,
        Dispatch::MethodNotAllowed => {
            return ApiError::MethodNotAllowed(parts.version).into_response()
        }
        Dispatch::NotFound => return ApiError::NotFound.into_response(),
    };

    let result = match matched.kind {
        RouteKind::InfoRefs => {
            let service = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(mut params)| params.remove("service"));
            smart::info_refs(
                &state,
                &matched.repo,
                path,
                service.as_deref(),
                &parts.headers,
            )
            .await
        }
        RouteKind::Rpc(service) => {
            smart::service_rpc(&state, &matched.repo, service, &parts.headers, body).await
        }
        kind => match kind.static_file() {
            Some((content_type, policy)) => {
                files::send_file(&state.config.root, path, content_type, policy).await
            }
            None => Err(ApiError::NotFound),
        },
    };

    result.into_response()
}
