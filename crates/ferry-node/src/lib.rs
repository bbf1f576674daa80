//! # Ferry Node
//!
//! Git HTTP server library.
//!
//! A Ferry node serves git repositories found under a single root directory
//! over HTTP, speaking both transports git clients understand:
//!
//! - **Dumb HTTP**: `HEAD`, `info/refs`, `info/packs`, loose objects and packs
//!   are streamed straight from disk with the cache headers clients expect.
//! - **Smart HTTP**: ref advertisement and the `git-upload-pack` /
//!   `git-receive-pack` RPCs are delegated to the git executable, which runs in
//!   stateless-RPC mode with the request body on its standard input.
//!
//! ```text
//!   request ──► routes::dispatch ──┬──► files::send_file      (dumb)
//!                                  └──► smart::info_refs      (smart)
//!                                       smart::service_rpc ──► git <service>
//! ```
//!
//! Which services may run is decided by [`ferry_git::AccessPolicy`]; by default
//! fetching is enabled and pushing is not.

pub mod api;
pub mod config;
pub mod error;
pub mod files;
pub mod headers;
pub mod observability;
pub mod routes;
pub mod smart;
