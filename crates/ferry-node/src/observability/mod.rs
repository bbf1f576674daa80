//! # Observability
//!
//! - **Structured logging**: pretty or JSON output through `tracing-subscriber`
//! - **Prometheus metrics**: HTTP requests by git route, transfer processes by outcome
//! - **Request IDs**: `x-request-id` propagation and per-request spans
//! - **Access log**: remote address, method, path and version of every request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use ferry_node::observability::{init_logging, request_id_layer, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let app: Router<()> = Router::new().layer(request_id_layer());
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use metrics::{MetricsState, METRICS};
pub use middleware::{
    access_log_layer, metrics_handler, metrics_layer, request_id_layer, MiddlewareLayer,
    REQUEST_ID_HEADER,
};
