//! Server configuration.
//!
//! Values come from an optional YAML file; command-line flags override them.

use ferry_git::{AccessPolicy, GitCommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default limit for RPC request bodies (512 MiB).
pub const DEFAULT_MAX_REQUEST_BODY: usize = 512 * 1024 * 1024;

/// Configuration for the Ferry node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Directory all repository paths are resolved against.
    pub root: PathBuf,
    /// Serve `git-upload-pack` (fetch/clone).
    pub upload_pack: bool,
    /// Serve `git-receive-pack` (push).
    pub receive_pack: bool,
    /// Transfer executable.
    pub git_program: PathBuf,
    /// Extra arguments placed before the service subcommand.
    pub git_args: Vec<String>,
    /// Largest accepted RPC request body, after decompression.
    pub max_request_body: usize,
    /// Log level.
    pub log_level: String,
    /// Log format (`pretty` or `json`).
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            root: PathBuf::from("./repos"),
            upload_pack: true,
            receive_pack: false,
            git_program: PathBuf::from("git"),
            git_args: Vec::new(),
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("repository root {} is not a directory", .0.display())]
    RootNotADirectory(PathBuf),
    #[error("max_request_body must be greater than zero")]
    InvalidBodyLimit,
}

impl ServerConfig {
    /// Loads configuration from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Checks values that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root.is_dir() {
            return Err(ConfigError::RootNotADirectory(self.root.clone()));
        }
        if self.max_request_body == 0 {
            return Err(ConfigError::InvalidBodyLimit);
        }
        Ok(())
    }

    /// Services the server is allowed to run.
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.upload_pack, self.receive_pack)
    }

    /// Invocation of the transfer executable.
    pub fn git_command(&self) -> GitCommand {
        GitCommand::new(&self.git_program).with_leading_args(&self.git_args)
    }
}
