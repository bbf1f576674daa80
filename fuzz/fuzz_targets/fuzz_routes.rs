//! Fuzz target for git route dispatch and path resolution.
//!
//! Arbitrary request paths must never resolve outside the repository root.

#![no_main]

use ferry_node::files::resolve;
use ferry_node::routes::{dispatch, Dispatch};
use libfuzzer_sys::fuzz_target;
use std::path::{Component, Path};

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else {
        return;
    };

    let _ = dispatch(&axum::http::Method::GET, path);
    if let Dispatch::Handle(matched) = dispatch(&axum::http::Method::POST, path) {
        assert!(path.starts_with(&matched.repo));
    }

    let root = Path::new("/srv/git");
    if let Some(resolved) = resolve(root, path) {
        assert!(resolved.starts_with(root));
        assert!(resolved
            .components()
            .all(|c| !matches!(c, Component::ParentDir | Component::CurDir)));
    }
});
