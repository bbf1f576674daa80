//! Dumb protocol: repository files served straight from disk.

use crate::error::ApiError;
use crate::headers::{self, http_date, CachePolicy};
use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::Response,
};
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Joins a URL path onto `root`.
///
/// Returns `None` when any segment would step outside `root` (`.`, `..`, or
/// anything the platform treats as a root or prefix) or contains a backslash
/// or NUL. Empty segments are ignored, so the result is always `root` followed
/// by plain names.
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in request_path.split('/').filter(|s| !s.is_empty()) {
        if segment.contains(['\\', '\0']) {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => resolved.push(name),
            _ => return None,
        }
    }
    Some(resolved)
}

/// Streams the file at `root` + `request_path`.
///
/// The whole request path is trusted here, not just the repository prefix;
/// [`resolve`] keeps it inside `root`.
pub async fn send_file(
    root: &Path,
    request_path: &str,
    content_type: &'static str,
    policy: CachePolicy,
) -> Result<Response, ApiError> {
    let path = resolve(root, request_path).ok_or(ApiError::NotFound)?;

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %request_path, error = %e, "Repository file not found");
            return Err(ApiError::NotFound);
        }
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound);
    }

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let response_headers = response.headers_mut();
    headers::apply(response_headers, policy.headers());
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    if let Ok(modified) = metadata.modified() {
        response_headers.insert(header::LAST_MODIFIED, http_date(modified.into()));
    }

    Ok(response)
}
