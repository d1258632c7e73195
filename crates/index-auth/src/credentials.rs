//! Credential resolution and the per-host credential cache.
//!
//! # Resolution order
//!
//! First hit wins, nothing is merged:
//!
//! 1. Userinfo embedded in the requested URL
//! 2. Configured credentials: userinfo of a matching index URL, then the
//!    explicit per-host mapping
//! 3. The credential cache (last credential used for the host)
//! 4. The prompter, when the caller allows it
//!
//! Every hit is written back to the cache for the host.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::logging::redact_url;
use crate::origin::Origin;
use crate::prompt::CredentialPrompter;

/// Username plus optional password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    username: String,
    #[serde(default)]
    password: Option<String>,
}

impl Credential {
    /// Create a credential. A `None` password is a username-only attempt.
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Username and password pair.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(username, Some(password.into()))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Value for the `Authorization` header.
    pub fn basic_auth_header(&self) -> String {
        let password = self.password.as_deref().unwrap_or("");
        let raw = format!("{}:{}", self.username, password);
        format!("Basic {}", STANDARD.encode(raw))
    }

    /// Userinfo of a URL, percent-decoded. `None` without a username.
    fn from_url(url: &Url) -> Option<Self> {
        if url.username().is_empty() {
            return None;
        }
        let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
        Some(Self::new(decode(url.username()), url.password().map(decode)))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Userinfo of the requested URL
    Url,
    /// Index URL userinfo or explicit per-host mapping
    Configured,
    /// Credential cache
    Cached,
    /// Interactive prompt
    Prompted,
}

/// A credential together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub credential: Credential,
    pub source: CredentialSource,
}

/// Credential parsed from a configured index URL.
#[derive(Debug, Clone)]
struct IndexCredential {
    scheme: String,
    host: String,
    port: Option<u16>,
    credential: Credential,
}

impl IndexCredential {
    fn matches(&self, origin: &Origin) -> bool {
        self.scheme == origin.scheme && self.host == origin.host && self.port == origin.port
    }
}

/// In-memory credential store.
///
/// Configured credentials are read-only; the cache and the challenged-host
/// marks are mutable and guarded by their own mutexes. Locks are never held
/// across an await or a prompt.
pub struct CredentialStore {
    index: Vec<IndexCredential>,
    configured: HashMap<String, Credential>,
    cache: Mutex<HashMap<String, Credential>>,
    challenged: Mutex<HashSet<String>>,
    prompter: Arc<dyn CredentialPrompter>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("index_urls", &self.index.len())
            .field("configured_hosts", &self.configured.len())
            .field("cached_hosts", &self.len())
            .field("interactive", &self.prompter.is_interactive())
            .finish()
    }
}

impl CredentialStore {
    /// Empty store prompting through `prompter`.
    pub fn new(prompter: Arc<dyn CredentialPrompter>) -> Self {
        Self {
            index: Vec::new(),
            configured: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
            challenged: Mutex::new(HashSet::new()),
            prompter,
        }
    }

    /// Register an index URL. Its userinfo, if any, becomes the configured
    /// credential for the URL's scheme, host and port. Paths are ignored.
    pub fn add_index_url(&mut self, url: &Url) {
        let Some(credential) = Credential::from_url(url) else {
            tracing::debug!(index = %redact_url(url), "index URL carries no credentials");
            return;
        };
        let origin = Origin::from_url(url);
        self.index.push(IndexCredential {
            scheme: origin.scheme,
            host: origin.host,
            port: origin.port,
            credential,
        });
    }

    /// Register an explicit credential for a host (any port) or `host:port`.
    pub fn add_host_credential(&mut self, host: &str, credential: Credential) {
        self.configured.insert(host.trim().to_ascii_lowercase(), credential);
    }

    /// Resolve credentials for `url`.
    ///
    /// With `allow_prompt` the prompter is consulted when nothing else
    /// matches; see [`prompt_for`](Self::prompt_for).
    pub async fn get_credentials(
        &self,
        url: &Url,
        allow_prompt: bool,
    ) -> Result<Option<Resolved>> {
        let origin = Origin::from_url(url);
        let host = origin.host.clone();

        let found = if let Some(credential) = self.from_request_url(url, &host) {
            Some((credential, CredentialSource::Url))
        } else if let Some(credential) = self.configured_for(&origin) {
            Some((credential, CredentialSource::Configured))
        } else {
            self.cached(&host).map(|c| (c, CredentialSource::Cached))
        };

        if let Some((credential, source)) = found {
            self.remember(&host, &credential);
            return Ok(Some(Resolved { credential, source }));
        }

        if !allow_prompt {
            return Ok(None);
        }
        self.prompt_for(url).await
    }

    /// Ask the prompter for the host of `url`, skipping every other source.
    ///
    /// The prompt runs on the blocking pool. An answer is cached for the
    /// host before returning. An empty username, a prompter I/O failure or
    /// a non-interactive prompter resolves to `None`.
    pub async fn prompt_for(&self, url: &Url) -> Result<Option<Resolved>> {
        if !self.prompter.is_interactive() {
            return Ok(None);
        }

        let host = Origin::from_url(url).host;
        let prompter = Arc::clone(&self.prompter);
        let prompt_host = host.clone();
        let answer = tokio::task::spawn_blocking(move || prompter.prompt(&prompt_host))
            .await
            .map_err(|e| Error::Internal(format!("credential prompt task failed: {}", e)))?;

        match answer {
            Ok(Some(credential)) => {
                self.remember(&host, &credential);
                Ok(Some(Resolved {
                    credential,
                    source: CredentialSource::Prompted,
                }))
            }
            Ok(None) => {
                tracing::debug!(%host, "authentication declined at prompt");
                Ok(None)
            }
            Err(err) => {
                tracing::debug!(%host, error = %err, "credential prompt failed");
                Ok(None)
            }
        }
    }

    /// Userinfo of the request URL. A username without password borrows the
    /// password of a configured or cached credential for the same user.
    fn from_request_url(&self, url: &Url, host: &str) -> Option<Credential> {
        let credential = Credential::from_url(url)?;
        if credential.password.is_some() {
            return Some(credential);
        }
        let origin = Origin::from_url(url);
        let known = self
            .configured_for(&origin)
            .or_else(|| self.cached(host))
            .filter(|known| known.username == credential.username && known.password.is_some());
        Some(known.unwrap_or(credential))
    }

    fn configured_for(&self, origin: &Origin) -> Option<Credential> {
        if let Some(entry) = self.index.iter().find(|entry| entry.matches(origin)) {
            return Some(entry.credential.clone());
        }
        origin
            .host_port()
            .and_then(|hp| self.configured.get(&hp))
            .or_else(|| self.configured.get(&origin.host))
            .cloned()
    }

    fn remember(&self, host: &str, credential: &Credential) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), credential.clone());
    }

    /// Cached credential for a host.
    pub fn cached(&self, host: &str) -> Option<Credential> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    /// Drop the cached credential for one host.
    pub fn invalidate(&self, host: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host);
    }

    /// Drop every cached credential. Configured credentials and challenged
    /// marks are untouched.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of hosts with a cached credential.
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that `host` answered with a 401 challenge.
    ///
    /// Marks last as long as the store; a marked host is prompted before
    /// the first send once its cached credential is gone. Use
    /// [`reset_challenges`](Self::reset_challenges) to forget them.
    pub fn mark_challenged(&self, host: &str) {
        self.challenged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string());
    }

    /// Whether `host` has challenged before. Survives [`clear`](Self::clear).
    pub fn was_challenged(&self, host: &str) -> bool {
        self.challenged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(host)
    }

    /// Forget every challenged mark.
    pub fn reset_challenges(&self) {
        self.challenged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether the prompter can reach a user.
    pub fn can_prompt(&self) -> bool {
        self.prompter.is_interactive()
    }
}
