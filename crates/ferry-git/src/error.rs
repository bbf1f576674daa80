//! Git transport error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while framing protocol data or driving a transfer process.
#[derive(Debug, Error)]
pub enum GitError {
    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// Service name other than `git-upload-pack` / `git-receive-pack`.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// The transfer executable could not be started.
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        /// Program that was being started.
        program: PathBuf,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The transfer process exited unsuccessfully.
    #[error("transfer process exited with {}: {stderr}", exit_description(.code))]
    ProcessFailed {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Captured standard error, lossily decoded.
        stderr: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}
