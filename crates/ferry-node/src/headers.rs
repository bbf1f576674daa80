//! Cache headers for git responses.
//!
//! Content-addressed files (loose objects, packs and their indexes) never
//! change once named, so they may be cached for a year. Everything else (refs,
//! pack listings, advertisements) must be revalidated on every request.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};

/// One year, in seconds.
pub const CACHE_FOREVER_SECS: i64 = 31_536_000;

/// Fixed date in the past used to expire volatile responses immediately.
const EXPIRED: &str = "Fri, 01 Jan 1980 00:00:00 GMT";

/// Cache policy applied to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Must revalidate on every request.
    NoCache,
    /// Publicly cacheable for a year.
    Forever,
}

impl CachePolicy {
    /// Materializes the header set for a response generated at `now`.
    pub fn headers_at(self, now: DateTime<Utc>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            CachePolicy::NoCache => {
                headers.insert(header::EXPIRES, HeaderValue::from_static(EXPIRED));
                headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-cache, max-age=0, must-revalidate"),
                );
            }
            CachePolicy::Forever => {
                let expires = now + Duration::seconds(CACHE_FOREVER_SECS);
                headers.insert(header::DATE, http_date(now));
                headers.insert(header::EXPIRES, http_date(expires));
                headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=31536000"),
                );
            }
        }
        headers
    }

    /// Header set for a response generated now.
    pub fn headers(self) -> HeaderMap {
        self.headers_at(Utc::now())
    }
}

/// Formats a timestamp as an HTTP date (IMF-fixdate).
pub fn http_date(at: DateTime<Utc>) -> HeaderValue {
    let formatted = at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    HeaderValue::from_str(&formatted).unwrap_or_else(|_| HeaderValue::from_static(EXPIRED))
}

/// Copies every header in `set` onto `headers`, replacing existing values.
pub fn apply(headers: &mut HeaderMap, set: HeaderMap) {
    for (name, value) in set {
        if let Some(name) = name {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_no_cache_headers() {
        let headers = CachePolicy::NoCache.headers();
        assert_eq!(headers[header::EXPIRES], EXPIRED);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, max-age=0, must-revalidate"
        );
        assert!(!headers.contains_key(header::DATE));
    }

    #[test]
    fn test_cache_forever_headers() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let headers = CachePolicy::Forever.headers_at(now);

        assert_eq!(headers[header::DATE], "Sat, 09 Mar 2024 14:05:07 GMT");
        assert_eq!(headers[header::EXPIRES], "Sun, 09 Mar 2025 14:05:07 GMT");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=31536000");
        assert!(!headers.contains_key(header::PRAGMA));
    }

    #[test]
    fn test_apply_replaces() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        apply(&mut headers, CachePolicy::NoCache.headers());

        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, max-age=0, must-revalidate"
        );
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers.len(), 4);
    }
}
