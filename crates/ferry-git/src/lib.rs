//! Git transport plumbing for Ferry.
//!
//! This crate holds everything the HTTP layer needs to speak the git smart
//! protocol without knowing anything about objects or packs: pkt-line framing,
//! the two transfer services and the policy that enables them, and a bridge to
//! the external `git upload-pack` / `git receive-pack` executable.

mod error;
mod pktline;
mod process;
mod service;

pub use error::GitError;
pub use pktline::{
    encode_line, flush_marker, service_header, PktLine, PktLineReader, PktLineWriter,
    MAX_PAYLOAD_LEN, MAX_PKT_LEN,
};
pub use process::{BridgeOptions, BridgeOutput, GitCommand, ProcessBridge, RunningBridge};
pub use service::{AccessPolicy, Service};

/// Result type for git transport operations.
pub type Result<T> = std::result::Result<T, GitError>;
