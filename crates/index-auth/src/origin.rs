//! Secure-origin policy
//!
//! Decides whether a URL's origin may receive plaintext Basic credentials.
//!
//! # Rules
//!
//! Evaluated in order, first match wins:
//!
//! 1. `https`, `wss`, `file` and `ftp` schemes are secure regardless of host
//! 2. Loopback hosts (`localhost`, `127.0.0.0/8`, `::1`) are secure on any scheme or port
//! 3. A host in the trusted set is secure on any port
//! 4. A `host:port` in the trusted set qualifies only that port
//! 5. Everything else is insecure

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};

use url::{Host, Url};

/// Schemes that never need a trusted-host entry.
const SECURE_SCHEMES: &[&str] = &["https", "wss", "file", "ftp"];

/// Origin of a URL, used only as policy input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Lowercased scheme
    pub scheme: String,
    /// Lowercased host, IPv6 literals without brackets. Empty for hostless URLs.
    pub host: String,
    /// Explicit port or the scheme's default
    pub port: Option<u16>,
}

impl Origin {
    /// Derive the origin of a parsed URL.
    pub fn from_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: host_of(url),
            port: url.port_or_known_default(),
        }
    }

    /// `host:port` form used for trusted-host lookups. IPv6 hosts are bracketed.
    pub fn host_port(&self) -> Option<String> {
        let port = self.port?;
        if self.host.contains(':') {
            Some(format!("[{}]:{}", self.host, port))
        } else {
            Some(format!("{}:{}", self.host, port))
        }
    }

    /// Whether the host is a loopback name or address.
    pub fn is_loopback(&self) -> bool {
        if self.host == "localhost" {
            return true;
        }
        self.host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }
}

/// Lowercased host of a URL without IPv6 brackets.
pub(crate) fn host_of(url: &Url) -> String {
    match url.host() {
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => String::new(),
    }
}

/// Set of trusted `host` or `host:port` entries.
///
/// Cloning shares the underlying set, so a host added through one handle is
/// visible to every policy built from it.
#[derive(Debug, Clone, Default)]
pub struct TrustedHosts {
    hosts: Arc<RwLock<HashSet<String>>>,
}

impl TrustedHosts {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. `"example.org"` trusts every port, `"10.0.0.1:8080"`
    /// trusts only port 8080.
    pub fn add(&self, host: &str) {
        let entry = normalize_entry(host);
        if entry.is_empty() {
            return;
        }
        self.hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry);
    }

    /// Exact-match membership test.
    pub fn contains(&self, entry: &str) -> bool {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(entry)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no host has been trusted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_entry(host: &str) -> String {
    let entry = host.trim().to_ascii_lowercase();
    // "[::1]" and "::1" name the same bare host
    match entry.strip_prefix('[').and_then(|e| e.strip_suffix(']')) {
        Some(inner) => inner.to_string(),
        None => entry,
    }
}

/// Why an origin was judged secure or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginMatch {
    /// Scheme is secure by itself
    SecureScheme,
    /// Host is a loopback address
    Loopback,
    /// Bare host is trusted
    TrustedHost,
    /// Exact `host:port` is trusted
    TrustedHostPort,
    /// Credentials must not be sent
    Insecure,
}

impl OriginMatch {
    /// Whether credentials may be attached.
    pub fn is_secure(&self) -> bool {
        !matches!(self, OriginMatch::Insecure)
    }
}

/// Per-request policy deciding whether credentials may be attached.
#[derive(Debug, Clone, Default)]
pub struct SecureOriginPolicy {
    trusted: TrustedHosts,
}

impl SecureOriginPolicy {
    /// Policy with no trusted hosts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy reading from a shared trusted-host set.
    pub fn with_trusted_hosts(trusted: TrustedHosts) -> Self {
        Self { trusted }
    }

    /// Trust a host (any port) or a `host:port` (that port only).
    pub fn add_trusted_host(&self, host: &str) {
        self.trusted.add(host);
    }

    /// The shared trusted-host set.
    pub fn trusted_hosts(&self) -> &TrustedHosts {
        &self.trusted
    }

    /// Classify a URL's origin.
    pub fn check(&self, url: &Url) -> OriginMatch {
        let origin = Origin::from_url(url);

        if SECURE_SCHEMES.contains(&origin.scheme.as_str()) {
            return OriginMatch::SecureScheme;
        }

        if origin.is_loopback() {
            return OriginMatch::Loopback;
        }

        if !origin.host.is_empty() && self.trusted.contains(&origin.host) {
            return OriginMatch::TrustedHost;
        }

        if let Some(host_port) = origin.host_port() {
            if self.trusted.contains(&host_port) {
                return OriginMatch::TrustedHostPort;
            }
        }

        OriginMatch::Insecure
    }

    /// Whether credentials may be sent to `url`.
    pub fn is_secure_origin(&self, url: &Url) -> bool {
        self.check(url).is_secure()
    }

    /// Like [`is_secure_origin`](Self::is_secure_origin); unparseable URLs are insecure.
    pub fn is_secure_origin_str(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| self.is_secure_origin(&u))
            .unwrap_or(false)
    }
}
