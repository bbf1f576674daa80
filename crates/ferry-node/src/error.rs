//! HTTP error type.

use crate::routes::method_not_allowed_status;
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode, Version},
    response::{IntoResponse, Response},
};

/// Errors returned by git HTTP handlers.
///
/// Every variant renders as a complete `text/plain` response. Server-side
/// failures are logged in full but never echo paths or process output to the
/// client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("service not enabled: {0}")]
    Forbidden(String),
    #[error("method not allowed")]
    MethodNotAllowed(Version),
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("git error: {0}")]
    Git(#[from] ferry_git::GitError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::MethodNotAllowed(version) => method_not_allowed_status(*version),
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Git(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::NotFound => Body::from("Not Found\n"),
            ApiError::Forbidden(_) | ApiError::MethodNotAllowed(_) => Body::empty(),
            ApiError::PayloadTooLarge(_) | ApiError::BadRequest(_) => {
                Body::from(format!("{self}\n"))
            }
            ApiError::Git(_) | ApiError::Io(_) => {
                tracing::error!(error = %self, "Request failed");
                Body::from("Internal Server Error\n")
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
    }
}
