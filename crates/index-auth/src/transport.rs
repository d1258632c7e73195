//! Transport seam and HTTP request/response types.
//!
//! [`AuthSession`](crate::AuthSession) never talks to the network directly:
//! it hands a fully-built [`Request`] to a [`Transport`]. The reqwest-backed
//! [`HttpTransport`] is available with the `http_client` feature; tests plug
//! in scripted transports.
//!
//! # Limits (HttpTransport)
//!
//! - Response body capped at `max_response_bytes` (10MB default), checked
//!   against Content-Length and again while streaming
//! - Connect timeout (10s) and overall request timeout (30s default)
//! - At most [`MAX_REDIRECTS`] redirects are followed
//! - Auto-decompression disabled to avoid compression bombs

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};

/// Default maximum response body size (10 MB)
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Default request timeout (30 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum allowed timeout (10 minutes)
pub const MAX_TIMEOUT_SECS: u64 = 600;

/// Minimum allowed timeout (1 second)
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Maximum number of redirects followed by [`HttpTransport`].
pub const MAX_REDIRECTS: usize = 10;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl Method {
    /// Upper-case method name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
        }
    }

    /// Only safe, body-less reads are memoized.
    pub fn is_cacheable(self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "PATCH" => Ok(Method::Patch),
            other => Err(Error::Config(format!("unsupported HTTP method: {}", other))),
        }
    }
}

/// Outgoing HTTP request.
///
/// The URL never carries userinfo by the time a transport sees it;
/// credentials travel only in the `Authorization` header.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Header name/value pairs, in insertion order
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Set a header, replacing any existing value (names compare case-insensitively).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers (key-value pairs)
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
    /// Final URL after redirects
    pub url: Url,
    /// Intermediate responses preceding this one, oldest first
    /// (redirects, or the 401 challenge before an authenticated retry)
    pub history: Vec<Response>,
}

impl Response {
    /// Response with an empty body and no history.
    pub fn new(status: u16, url: Url) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            url,
            history: Vec::new(),
        }
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get the body as a UTF-8 string (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Check if the response was successful (2xx status)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the server rejected the request with 401
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends fully-built requests.
///
/// Implementations own connection handling, TLS, redirects and timeouts.
/// Transport failures come back as [`Error::Network`] and are propagated to
/// the caller unmodified.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the final response.
    async fn send(&self, request: &Request) -> Result<Response>;
}

#[cfg(feature = "http_client")]
pub use http::HttpTransport;

#[cfg(feature = "http_client")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Client;

    use super::{
        DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_TIMEOUT_SECS, MAX_REDIRECTS, MAX_TIMEOUT_SECS,
        MIN_TIMEOUT_SECS, Method, Request, Response, Transport,
    };
    use crate::error::{Error, Result};
    use crate::logging::redact_url;

    impl Method {
        fn as_reqwest(self) -> reqwest::Method {
            match self {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Delete => reqwest::Method::DELETE,
                Method::Head => reqwest::Method::HEAD,
                Method::Patch => reqwest::Method::PATCH,
            }
        }
    }

    /// reqwest-backed [`Transport`].
    pub struct HttpTransport {
        client: Client,
        /// Maximum response body size in bytes
        max_response_bytes: usize,
    }

    impl HttpTransport {
        /// Create a transport with default settings:
        /// - 30 second timeout
        /// - 10 MB max response size
        pub fn new() -> Result<Self> {
            Self::with_config(
                Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                DEFAULT_MAX_RESPONSE_BYTES,
            )
        }

        /// Create a transport with full configuration.
        ///
        /// # Arguments
        ///
        /// * `timeout` - Request timeout, clamped to [`MIN_TIMEOUT_SECS`, `MAX_TIMEOUT_SECS`]
        /// * `max_response_bytes` - Maximum response body size
        pub fn with_config(timeout: Duration, max_response_bytes: usize) -> Result<Self> {
            // reqwest is built with `rustls-no-provider`; a second install is a no-op error.
            let _ = rustls::crypto::ring::default_provider().install_default();

            let timeout =
                Duration::from_secs(timeout.as_secs().clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS));
            let client = Client::builder()
                .timeout(timeout)
                .connect_timeout(std::cmp::min(timeout, Duration::from_secs(10)))
                .user_agent(concat!("index-auth/", env!("CARGO_PKG_VERSION")))
                .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
                .no_gzip()
                .no_brotli()
                .no_deflate()
                .build()
                .map_err(|e| Error::Network(format!("failed to create client: {}", e)))?;

            Ok(Self {
                client,
                max_response_bytes,
            })
        }

        /// Get the maximum response size in bytes.
        pub fn max_response_bytes(&self) -> usize {
            self.max_response_bytes
        }

        /// Read response body with size limit enforcement.
        async fn read_body_with_limit(&self, response: reqwest::Response) -> Result<Vec<u8>> {
            use futures_util::StreamExt;

            let mut body = Vec::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk_result) = stream.next().await {
                let chunk = chunk_result
                    .map_err(|e| Error::Network(format!("failed to read response chunk: {}", e)))?;

                if body.len() + chunk.len() > self.max_response_bytes {
                    return Err(Error::Network(format!(
                        "response too large: exceeded {} bytes limit",
                        self.max_response_bytes
                    )));
                }

                body.extend_from_slice(&chunk);
            }

            Ok(body)
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(&self, request: &Request) -> Result<Response> {
            let mut builder = self
                .client
                .request(request.method.as_reqwest(), request.url.clone());

            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Network("operation timed out".to_string())
                } else {
                    // reqwest errors embed the URL; never leak userinfo
                    Error::Network(format!(
                        "request to {} failed: {}",
                        redact_url(&request.url),
                        e.without_url()
                    ))
                }
            })?;

            let status = response.status().as_u16();
            let url = response.url().clone();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            // Fail fast on a declared oversized body
            if let Some(content_length) = response.content_length() {
                if content_length as usize > self.max_response_bytes {
                    return Err(Error::Network(format!(
                        "response too large: {} bytes (max: {} bytes)",
                        content_length, self.max_response_bytes
                    )));
                }
            }

            let body = self.read_body_with_limit(response).await?;

            Ok(Response {
                status,
                headers,
                body,
                url,
                history: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_and_display() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(Method::Delete.to_string(), "DELETE");
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn test_only_reads_are_cacheable() {
        assert!(Method::Get.is_cacheable());
        assert!(Method::Head.is_cacheable());
        assert!(!Method::Post.is_cacheable());
        assert!(!Method::Delete.is_cacheable());
    }

    #[test]
    fn test_request_set_header_replaces() {
        let mut req = Request::new(Method::Get, Url::parse("https://pypi.org/simple").unwrap());
        req.set_header("Authorization", "Basic a");
        req.set_header("authorization", "Basic b");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("AUTHORIZATION"), Some("Basic b"));
    }

    #[test]
    fn test_response_status_helpers() {
        let url = Url::parse("https://pypi.org/simple").unwrap();
        let ok = Response::new(200, url.clone()).with_body("<html>");
        assert!(ok.is_success());
        assert_eq!(ok.text(), "<html>");

        let denied = Response::new(401, url);
        assert!(denied.is_unauthorized());
        assert!(!denied.is_success());
    }

    #[cfg(feature = "http_client")]
    #[tokio::test]
    async fn test_http_transport_connection_refused_is_network_error() {
        let timeout = std::time::Duration::from_secs(2);
        let transport = HttpTransport::with_config(timeout, 1024).unwrap();
        let req = Request::new(Method::Get, Url::parse("http://127.0.0.1:9/").unwrap());
        let err = transport.send(&req).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
