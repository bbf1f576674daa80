//! Git HTTP route table.
//!
//! Every git URL is `<repository prefix><suffix>`, where the prefix is an
//! arbitrary path. The table below maps suffix shapes to what the server does
//! with them. It is evaluated top to bottom and the first shape that matches
//! decides the outcome, even if its method does not match: a matching shape
//! with the wrong method is rejected without looking further. The GET and POST
//! shapes are disjoint, so this never hides a route.

use crate::headers::CachePolicy;
use axum::http::{Method, StatusCode, Version};
use ferry_git::Service;
use once_cell::sync::Lazy;
use regex::Regex;

/// What a matched route does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// `HEAD` symbolic ref.
    Head,
    /// `objects/info/alternates`.
    Alternates,
    /// `objects/info/http-alternates`.
    HttpAlternates,
    /// `info/packs` listing.
    InfoPacks,
    /// `info/refs`, smart advertisement or dumb file.
    InfoRefs,
    /// `objects/xx/yyyy..` loose object.
    LooseObject,
    /// `objects/pack/pack-<sha>.pack`.
    Pack,
    /// `objects/pack/pack-<sha>.idx`.
    PackIndex,
    /// Smart protocol RPC.
    Rpc(Service),
}

impl RouteKind {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RouteKind::Head => "head",
            RouteKind::Alternates => "alternates",
            RouteKind::HttpAlternates => "http_alternates",
            RouteKind::InfoPacks => "info_packs",
            RouteKind::InfoRefs => "info_refs",
            RouteKind::LooseObject => "loose_object",
            RouteKind::Pack => "pack",
            RouteKind::PackIndex => "pack_index",
            RouteKind::Rpc(Service::UploadPack) => "upload_pack",
            RouteKind::Rpc(Service::ReceivePack) => "receive_pack",
        }
    }

    /// Content type and cache policy for routes served straight from disk.
    pub fn static_file(&self) -> Option<(&'static str, CachePolicy)> {
        match self {
            RouteKind::Head | RouteKind::Alternates | RouteKind::HttpAlternates => {
                Some(("text/plain", CachePolicy::NoCache))
            }
            RouteKind::InfoPacks => Some(("text/plain; charset=utf-8", CachePolicy::NoCache)),
            RouteKind::LooseObject => {
                Some(("application/x-git-loose-object", CachePolicy::Forever))
            }
            RouteKind::Pack => Some(("application/x-git-packed-objects", CachePolicy::Forever)),
            RouteKind::PackIndex => Some((
                "application/x-git-packed-objects-toc",
                CachePolicy::Forever,
            )),
            RouteKind::InfoRefs | RouteKind::Rpc(_) => None,
        }
    }
}

/// One entry of the route table.
#[derive(Debug)]
pub struct Route {
    /// Method the shape accepts.
    pub method: Method,
    /// Shape; group 1 captures the repository prefix.
    pub pattern: Regex,
    /// Capability.
    pub kind: RouteKind,
}

impl Route {
    fn new(method: Method, pattern: &str, kind: RouteKind) -> Self {
        Self {
            method,
            pattern: Regex::new(pattern).expect("Invalid route pattern"),
            kind,
        }
    }
}

/// The route table, in priority order.
pub static ROUTES: Lazy<Vec<Route>> = Lazy::new(|| {
    vec![
        Route::new(Method::GET, r"^(.*)/HEAD$", RouteKind::Head),
        Route::new(Method::GET, r"^(.*)/info/packs$", RouteKind::InfoPacks),
        Route::new(Method::GET, r"^(.*)/info/refs$", RouteKind::InfoRefs),
        Route::new(
            Method::GET,
            r"^(.*)/objects/info/alternates$",
            RouteKind::Alternates,
        ),
        Route::new(
            Method::GET,
            r"^(.*)/objects/info/http-alternates$",
            RouteKind::HttpAlternates,
        ),
        Route::new(
            Method::GET,
            r"^(.*)/objects/[0-9a-f]{2}/[0-9a-f]{38}$",
            RouteKind::LooseObject,
        ),
        Route::new(
            Method::GET,
            r"^(.*)/objects/pack/pack-[0-9a-f]{40}\.pack$",
            RouteKind::Pack,
        ),
        Route::new(
            Method::GET,
            r"^(.*)/objects/pack/pack-[0-9a-f]{40}\.idx$",
            RouteKind::PackIndex,
        ),
        Route::new(
            Method::POST,
            r"^(.*)/git-upload-pack$",
            RouteKind::Rpc(Service::UploadPack),
        ),
        Route::new(
            Method::POST,
            r"^(.*)/git-receive-pack$",
            RouteKind::Rpc(Service::ReceivePack),
        ),
    ]
});

/// A path matched against a route shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Capability of the matched route.
    pub kind: RouteKind,
    /// Repository prefix, relative to the server root (may be empty).
    pub repo: String,
}

/// Result of dispatching a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A route accepts the request.
    Handle(RouteMatch),
    /// The first matching shape does not accept this method.
    MethodNotAllowed,
    /// No shape matches.
    NotFound,
}

/// Finds the first route whose shape matches `path`, ignoring the method.
pub fn route(path: &str) -> Option<(&'static Route, RouteMatch)> {
    ROUTES.iter().find_map(|route| {
        route.pattern.captures(path).map(|caps| {
            let repo = caps.get(1).map_or("", |m| m.as_str()).to_string();
            (
                route,
                RouteMatch {
                    kind: route.kind,
                    repo,
                },
            )
        })
    })
}

/// Decides how to handle `method path`.
pub fn dispatch(method: &Method, path: &str) -> Dispatch {
    match route(path) {
        Some((route, matched)) if route.method == *method => Dispatch::Handle(matched),
        Some(_) => Dispatch::MethodNotAllowed,
        None => Dispatch::NotFound,
    }
}

/// Status for a method mismatch: HTTP/1.1 and later clients understand 405,
/// older ones get a plain 400.
pub fn method_not_allowed_status(version: Version) -> StatusCode {
    match version {
        Version::HTTP_09 | Version::HTTP_10 => StatusCode::BAD_REQUEST,
        _ => StatusCode::METHOD_NOT_ALLOWED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SHA: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";

    /// One representative suffix per route, in table order.
    fn samples() -> Vec<(String, RouteKind)> {
        vec![
            ("/HEAD".to_string(), RouteKind::Head),
            ("/info/packs".to_string(), RouteKind::InfoPacks),
            ("/info/refs".to_string(), RouteKind::InfoRefs),
            (
                "/objects/info/alternates".to_string(),
                RouteKind::Alternates,
            ),
            (
                "/objects/info/http-alternates".to_string(),
                RouteKind::HttpAlternates,
            ),
            (
                format!("/objects/{}/{}", &SHA[..2], &SHA[2..]),
                RouteKind::LooseObject,
            ),
            (format!("/objects/pack/pack-{SHA}.pack"), RouteKind::Pack),
            (format!("/objects/pack/pack-{SHA}.idx"), RouteKind::PackIndex),
            (
                "/git-upload-pack".to_string(),
                RouteKind::Rpc(Service::UploadPack),
            ),
            (
                "/git-receive-pack".to_string(),
                RouteKind::Rpc(Service::ReceivePack),
            ),
        ]
    }

    #[test]
    fn test_every_route_has_a_sample() {
        let kinds: Vec<RouteKind> = ROUTES.iter().map(|r| r.kind).collect();
        let sampled: Vec<RouteKind> = samples().into_iter().map(|(_, k)| k).collect();
        assert_eq!(kinds, sampled);
    }

    #[test]
    fn test_no_two_shapes_overlap() {
        let samples = samples();
        for (i, route) in ROUTES.iter().enumerate() {
            for (j, (suffix, _)) in samples.iter().enumerate() {
                let path = format!("/team/project.git{suffix}");
                assert_eq!(
                    route.pattern.is_match(&path),
                    i == j,
                    "route {:?} vs sample {path}",
                    route.kind
                );
            }
        }
    }

    #[test]
    fn test_get_and_post_shapes_disjoint() {
        for (suffix, kind) in samples() {
            let path = format!("/repo{suffix}");
            let matching: Vec<&Method> = ROUTES
                .iter()
                .filter(|r| r.pattern.is_match(&path))
                .map(|r| &r.method)
                .collect();
            assert_eq!(matching.len(), 1, "{kind:?}");
        }
    }

    #[test]
    fn test_dispatch_captures_repo_prefix() {
        assert_eq!(
            dispatch(&Method::GET, "/alice/tools.git/info/refs"),
            Dispatch::Handle(RouteMatch {
                kind: RouteKind::InfoRefs,
                repo: "/alice/tools.git".to_string(),
            })
        );
        assert_eq!(
            dispatch(&Method::POST, "/deep/nested/repo/git-receive-pack"),
            Dispatch::Handle(RouteMatch {
                kind: RouteKind::Rpc(Service::ReceivePack),
                repo: "/deep/nested/repo".to_string(),
            })
        );
        assert_eq!(
            dispatch(&Method::GET, "/HEAD"),
            Dispatch::Handle(RouteMatch {
                kind: RouteKind::Head,
                repo: String::new(),
            })
        );
    }

    #[test]
    fn test_dispatch_method_mismatch() {
        assert_eq!(
            dispatch(&Method::POST, "/repo.git/info/refs"),
            Dispatch::MethodNotAllowed
        );
        assert_eq!(
            dispatch(&Method::GET, "/repo.git/git-upload-pack"),
            Dispatch::MethodNotAllowed
        );
        assert_eq!(
            dispatch(&Method::HEAD, "/repo.git/HEAD"),
            Dispatch::MethodNotAllowed
        );
    }

    #[test]
    fn test_dispatch_not_found() {
        let short_object = format!("/repo.git/objects/{}/{}", &SHA[..2], &SHA[2..39]);
        let upper_pack = format!("/repo.git/objects/pack/pack-{}.pack", SHA.to_uppercase());
        for path in [
            "/",
            "/repo.git",
            "/repo.git/config",
            "/repo.git/objects/AB/CDEF",
            short_object.as_str(),
            upper_pack.as_str(),
            "/repo.git/git-upload-archive",
            "/repo.git/HEAD/",
        ] {
            assert_eq!(dispatch(&Method::GET, path), Dispatch::NotFound, "{path}");
        }
    }

    #[test]
    fn test_method_not_allowed_status() {
        assert_eq!(
            method_not_allowed_status(Version::HTTP_11),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            method_not_allowed_status(Version::HTTP_2),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            method_not_allowed_status(Version::HTTP_10),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            method_not_allowed_status(Version::HTTP_09),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_static_file_policies() {
        assert_eq!(
            RouteKind::LooseObject.static_file(),
            Some(("application/x-git-loose-object", CachePolicy::Forever))
        );
        assert_eq!(
            RouteKind::InfoPacks.static_file(),
            Some(("text/plain; charset=utf-8", CachePolicy::NoCache))
        );
        assert!(RouteKind::InfoRefs.static_file().is_none());
        assert!(RouteKind::Rpc(Service::UploadPack).static_file().is_none());
    }

    proptest! {
        #[test]
        fn prop_prefix_is_captured_verbatim(
            prefix in "(/[a-zA-Z0-9._-]{1,12}){0,4}",
            index in 0usize..10,
        ) {
            let (suffix, kind) = samples().swap_remove(index);
            let path = format!("{prefix}{suffix}");
            let method = match kind {
                RouteKind::Rpc(_) => Method::POST,
                _ => Method::GET,
            };

            prop_assert_eq!(
                dispatch(&method, &path),
                Dispatch::Handle(RouteMatch { kind, repo: prefix })
            );
        }
    }
}
