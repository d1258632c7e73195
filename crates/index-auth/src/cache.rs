//! Response cache
//!
//! Memoizes successful responses to `GET`/`HEAD` requests. Keys never
//! include credentials, so a cached body fetched with one credential is
//! served to any caller of the same URL.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use url::Url;

use crate::origin::host_of;
use crate::transport::{Method, Response};

/// Normalized request identity: userinfo and fragment are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl RequestKey {
    /// Build the key for `method url`.
    pub fn new(method: Method, url: &Url) -> Self {
        Self {
            method,
            scheme: url.scheme().to_ascii_lowercase(),
            host: host_of(url),
            port: url.port_or_known_default(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }
}

/// In-memory store of successful responses.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<RequestKey, Response>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached response for `key`, if any.
    pub fn get(&self, key: &RequestKey) -> Option<Response> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a response. Returns `false` without storing when the request
    /// method is not cacheable or the status is not 2xx.
    ///
    /// The stored copy has an empty history: a later hit is not a replay of
    /// the challenge that preceded the original response.
    pub fn put(&self, key: RequestKey, response: &Response) -> bool {
        if !key.method.is_cacheable() || !response.is_success() {
            return false;
        }
        let mut stored = response.clone();
        stored.history.clear();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, stored);
        true
    }

    /// Drop every cached response.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn ok(s: &str) -> Response {
        Response::new(200, url(s)).with_body("<html>test</html>")
    }

    #[test]
    fn test_key_ignores_credentials_and_fragment() {
        assert_eq!(
            RequestKey::new(Method::Get, &url("https://user:pw@pypi.org/simple#frag")),
            RequestKey::new(Method::Get, &url("https://pypi.org/simple"))
        );
        assert_eq!(
            RequestKey::new(Method::Get, &url("https://pypi.org:443/simple")),
            RequestKey::new(Method::Get, &url("https://pypi.org/simple"))
        );
    }

    #[test]
    fn test_key_distinguishes_method_query_and_path() {
        let key = |method, s: &str| RequestKey::new(method, &url(s));
        let base = key(Method::Get, "https://pypi.org/simple");
        assert_ne!(base, key(Method::Head, "https://pypi.org/simple"));
        assert_ne!(base, key(Method::Get, "https://pypi.org/simple?x=1"));
        assert_ne!(base, key(Method::Get, "https://pypi.org/simple/"));
    }

    #[test]
    fn test_put_and_get() {
        let cache = ResponseCache::new();
        let key = RequestKey::new(Method::Get, &url("https://pypi.org/simple"));
        assert!(cache.get(&key).is_none());

        assert!(cache.put(key.clone(), &ok("https://pypi.org/simple")));
        assert_eq!(cache.get(&key).unwrap().text(), "<html>test</html>");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_rejects_non_success_and_unsafe_methods() {
        let cache = ResponseCache::new();
        let target = url("https://pypi.org/simple");

        let denied = Response::new(401, target.clone());
        assert!(!cache.put(RequestKey::new(Method::Get, &target), &denied));

        let missing = Response::new(404, target.clone());
        assert!(!cache.put(RequestKey::new(Method::Get, &target), &missing));

        let posted = ok("https://pypi.org/simple");
        assert!(!cache.put(RequestKey::new(Method::Post, &target), &posted));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stored_response_drops_history() {
        let cache = ResponseCache::new();
        let target = url("https://pypi.org/simple");
        let key = RequestKey::new(Method::Get, &target);

        let mut response = ok("https://pypi.org/simple");
        response.history.push(Response::new(401, target));
        assert!(cache.put(key.clone(), &response));

        let hit = cache.get(&key).unwrap();
        assert_eq!(hit.status, 200);
        assert!(hit.history.is_empty());
        // The caller's copy is untouched
        assert_eq!(response.history.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new();
        let key = RequestKey::new(Method::Get, &url("https://pypi.org/simple"));
        cache.put(key.clone(), &ok("https://pypi.org/simple"));
        cache.clear();
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}
