//! Request ID propagation and HTTP metrics.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, header::HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::metrics::METRICS;
use crate::routes;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Type alias for the middleware future.
type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type alias for middleware function pointer.
type MiddlewareFn = fn(Request, Next) -> MiddlewareFuture;

/// Type alias for the middleware layer.
pub type MiddlewareLayer = axum::middleware::FromFnLayer<MiddlewareFn, (), (Request,)>;

/// Request ID extension type.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Layer that tags every request with an ID and runs it inside a span.
pub fn request_id_layer() -> MiddlewareLayer {
    axum::middleware::from_fn(request_id_middleware)
}

fn request_id_middleware(mut request: Request, next: Next) -> MiddlewareFuture {
    Box::pin(async move {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        request
            .extensions_mut()
            .insert(RequestId(request_id.clone()));

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        );

        let mut response = next.run(request).instrument(span).await;

        if let Ok(header_value) = HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), header_value);
        }

        response
    })
}

/// Layer that logs every request before it is handled.
pub fn access_log_layer() -> MiddlewareLayer {
    axum::middleware::from_fn(access_log_middleware)
}

fn access_log_middleware(request: Request, next: Next) -> MiddlewareFuture {
    Box::pin(async move {
        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.to_string());

        tracing::info!(
            remote = %remote,
            method = %request.method(),
            path = %request.uri().path(),
            version = ?request.version(),
            "Request received"
        );

        next.run(request).await
    })
}

/// Layer that records request counts and latency per git route.
pub fn metrics_layer() -> MiddlewareLayer {
    axum::middleware::from_fn(metrics_middleware)
}

fn metrics_middleware(request: Request, next: Next) -> MiddlewareFuture {
    Box::pin(async move {
        let start = Instant::now();
        let method = request.method().to_string();
        let route = routes::route(request.uri().path())
            .map_or("other", |(_, matched)| matched.kind.label());

        METRICS.http_requests_in_flight.inc();
        let response = next.run(request).await;
        METRICS.http_requests_in_flight.dec();

        let duration = start.elapsed().as_secs_f64();
        let status = response.status().as_u16();
        METRICS.record_http_request(&method, route, status, duration);

        tracing::debug!(
            method = %method,
            route = route,
            status = status,
            duration_ms = %format!("{:.2}", duration * 1000.0),
            "Request completed"
        );

        response
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics_handler() -> Response {
    let mut response = Response::new(Body::from(METRICS.encode()));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    response
}
