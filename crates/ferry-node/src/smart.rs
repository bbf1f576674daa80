//! Smart protocol: ref advertisement and stateless RPC over HTTP.
//!
//! Both handlers hand the actual protocol work to a fresh transfer process and
//! only frame or relay its output.

use crate::api::AppState;
use crate::error::ApiError;
use crate::files::{self, resolve};
use crate::headers::{self, CachePolicy};
use crate::observability::METRICS;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use bytes::Bytes;
use ferry_git::{service_header, GitError, ProcessBridge, Service};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};

/// Content type of a dumb `info/refs` file.
const INFO_REFS_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Request header carrying the client's wire protocol preference.
const GIT_PROTOCOL_HEADER: &str = "git-protocol";

/// `GET <repo>/info/refs[?service=<service>]`.
///
/// With an enabled service this is a smart advertisement: the
/// `# service=` preamble followed by the output of the transfer process in
/// advertise-only mode. Without one the client is a dumb client (or asked for
/// something it may not have) and gets the `info/refs` file from disk.
pub async fn info_refs(
    state: &AppState,
    repo: &str,
    request_path: &str,
    service: Option<&str>,
    request_headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let service = match service {
        Some(name) if state.policy.permits(name) => name.parse::<Service>()?,
        requested => {
            debug!(
                service = requested.unwrap_or("-"),
                "No enabled smart service requested, serving info/refs from disk"
            );
            return files::send_file(
                &state.config.root,
                request_path,
                INFO_REFS_CONTENT_TYPE,
                CachePolicy::NoCache,
            )
            .await;
        }
    };

    let repo_path = repository_dir(state, repo).await?;
    let protocol = git_protocol(request_headers);
    let v2 = protocol.as_deref().is_some_and(is_protocol_v2);

    let bridge = ProcessBridge::new(&state.git, repo_path, service)
        .advertise_refs()
        .git_protocol(protocol);
    let refs = run_tracked(&bridge).await?;

    // Protocol v2 capability advertisements carry no service preamble.
    let mut body = if v2 {
        Vec::with_capacity(refs.len())
    } else {
        service_header(service.as_str())
    };
    body.extend_from_slice(&refs);

    let mut response = Response::new(Body::from(body));
    let response_headers = response.headers_mut();
    headers::apply(response_headers, CachePolicy::NoCache.headers());
    response_headers.insert(
        header::CONTENT_TYPE,
        content_type(&service.advertisement_content_type()),
    );

    Ok(response)
}

/// `POST <repo>/git-upload-pack` and `POST <repo>/git-receive-pack`.
///
/// The request body is buffered, inflated if gzip-encoded, and written to the
/// transfer process. Its standard output is streamed back, followed by its
/// standard error.
pub async fn service_rpc(
    state: &AppState,
    repo: &str,
    service: Service,
    request_headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if !state.policy.permits_service(service) {
        info!(service = %service, repo = %repo, "Service not enabled");
        return Err(ApiError::Forbidden(service.to_string()));
    }

    let repo_path = repository_dir(state, repo).await?;
    let input = read_body(body, request_headers, state.config.max_request_body).await?;

    let bridge = ProcessBridge::new(&state.git, repo_path, service)
        .git_protocol(git_protocol(request_headers));
    let running = bridge.start().inspect_err(|_| {
        METRICS.record_git_process(service, "spawn_error");
    })?;

    debug!(
        service = %service,
        repo = %repo,
        pid = ?running.id(),
        input_bytes = input.len(),
        "Relaying RPC"
    );

    let output = running.into_output_stream_with(input, move |status| {
        let outcome = if status.success() { "ok" } else { "failed" };
        METRICS.record_git_process(service, outcome);
    });

    let mut response = Response::new(Body::from_stream(output));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        content_type(&service.result_content_type()),
    );

    Ok(response)
}

async fn run_tracked(bridge: &ProcessBridge) -> Result<Vec<u8>, GitError> {
    let result = bridge.run_to_completion().await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(GitError::Spawn { .. }) => "spawn_error",
        Err(_) => "failed",
    };
    METRICS.record_git_process(bridge.service(), outcome);
    result
}

/// Resolves the repository prefix and requires it to be an existing directory.
async fn repository_dir(state: &AppState, repo: &str) -> Result<PathBuf, ApiError> {
    let path = resolve(&state.config.root, repo).ok_or(ApiError::NotFound)?;
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_dir() => Ok(path),
        _ => {
            debug!(repo = %repo, "Repository not found");
            Err(ApiError::NotFound)
        }
    }
}

fn git_protocol(request_headers: &HeaderMap) -> Option<String> {
    request_headers
        .get(GIT_PROTOCOL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn is_protocol_v2(value: &str) -> bool {
    value.split(':').any(|param| param == "version=2")
}

fn content_type(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// Buffers the request body, honouring `Content-Encoding: gzip`.
async fn read_body(body: Body, request_headers: &HeaderMap, limit: usize) -> Result<Bytes, ApiError> {
    let declared = request_headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge(limit));
    }

    let raw = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(limit))?;

    let encoding = request_headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    match encoding {
        None | Some("") => Ok(raw),
        Some(e) if e.eq_ignore_ascii_case("identity") => Ok(raw),
        Some(e) if e.eq_ignore_ascii_case("gzip") || e.eq_ignore_ascii_case("x-gzip") => {
            tokio::task::spawn_blocking(move || inflate(&raw, limit))
                .await
                .map_err(|e| ApiError::Io(std::io::Error::other(e)))?
        }
        Some(other) => Err(ApiError::BadRequest(format!(
            "unsupported content encoding {other}"
        ))),
    }
}

fn inflate(raw: &[u8], limit: usize) -> Result<Bytes, ApiError> {
    let mut decoded = Vec::new();
    GzDecoder::new(raw)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| ApiError::BadRequest(format!("invalid gzip body: {e}")))?;
    if decoded.len() > limit {
        return Err(ApiError::PayloadTooLarge(limit));
    }
    Ok(Bytes::from(decoded))
}
