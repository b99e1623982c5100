//! Response cache interface.
//!
//! The `put_if_modified_since` step reads and writes prior responses through a
//! [`CacheStore`], addressed by a [`CacheKey`] fingerprint of the request.
//! Freshness follows the stored `cache-control` directives.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{Headers, Method, ResponseContext};

/// Request headers that select a different representation.
const KEY_HEADERS: [&str; 4] = ["accept", "accept-encoding", "accept-language", "range"];

/// Persists prior responses.
///
/// Implementations must be safe under concurrent use; concurrent writes of
/// the same key may race, the last one wins.
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Stored entry for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn get(&self, key: &CacheKey) -> io::Result<Option<CachedResponse>>;

    /// Store an entry, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn put(&self, key: &CacheKey, entry: &CachedResponse) -> io::Result<()>;
}

// ============================================================================
// Cache Key
// ============================================================================

/// Fingerprint of a request: SHA-256 of the method, the normalized URL and
/// the headers that select a representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint a request.
    #[must_use]
    pub fn new(method: Method, url: &Url, headers: &Headers) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize_url(url).as_bytes());
        for name in KEY_HEADERS {
            hasher.update(b"\n");
            hasher.update(name.as_bytes());
            hasher.update(b":");
            let values: Vec<_> = headers.get_all(name).collect();
            hasher.update(values.join(",").as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Drop the fragment and sort the query pairs.
fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

// ============================================================================
// Cached Response
// ============================================================================

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Base64 of the body as received.
    pub body: String,
    /// When the entry was stored or last revalidated.
    pub stored_at: SystemTime,
}

impl CachedResponse {
    /// Capture a response.
    #[must_use]
    pub fn new(response: &ResponseContext, stored_at: SystemTime) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: STANDARD.encode(response.bytes()),
            stored_at,
        }
    }

    /// Rebuild the response, marked as served from cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored body is not valid base64.
    pub fn to_response(&self) -> io::Result<ResponseContext> {
        let body = STANDARD
            .decode(&self.body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(ResponseContext::new(self.status, self.headers.clone(), bytes::Bytes::from(body)).cached())
    }

    /// Cache directives of the stored response.
    #[must_use]
    pub fn cache_control(&self) -> CacheControl {
        self.headers
            .get("cache-control")
            .map(CacheControl::parse)
            .unwrap_or_default()
    }

    /// Whether the entry can be served without revalidation.
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        self.cache_control().is_fresh(self.stored_at, now)
    }
}

// ============================================================================
// Cache Control
// ============================================================================

/// The `cache-control` directives that matter to a private cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheControl {
    /// `max-age=<seconds>`.
    pub max_age: Option<u64>,
    /// `no-cache`: always revalidate.
    pub no_cache: bool,
    /// `no-store`: never store.
    pub no_store: bool,
    /// `must-revalidate`: always revalidate.
    pub must_revalidate: bool,
}

impl CacheControl {
    /// Parse a `cache-control` header value. Unknown directives are ignored.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut control = Self::default();

        for directive in header.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            match directive.as_str() {
                "no-cache" => control.no_cache = true,
                "no-store" => control.no_store = true,
                "must-revalidate" => control.must_revalidate = true,
                _ => {
                    if let Some(seconds) = directive
                        .strip_prefix("max-age=")
                        .and_then(|value| value.trim_matches('"').parse().ok())
                    {
                        control.max_age = Some(seconds);
                    }
                }
            }
        }

        control
    }

    /// Whether a response with these directives may be stored.
    #[must_use]
    pub const fn is_storable(&self) -> bool {
        !self.no_store
    }

    /// Whether an entry stored at `stored_at` is still fresh at `now`.
    ///
    /// Without `max-age` an entry stays fresh until something forces
    /// revalidation.
    #[must_use]
    pub fn is_fresh(&self, stored_at: SystemTime, now: SystemTime) -> bool {
        if self.no_cache || self.must_revalidate {
            return false;
        }
        match self.max_age {
            Some(max_age) => {
                let elapsed = now.duration_since(stored_at).unwrap_or_default();
                elapsed < Duration::from_secs(max_age)
            }
            None => true,
        }
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CachedResponse>>,
}

impl MemoryCacheStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> io::Result<Option<CachedResponse>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, entry: &CachedResponse) -> io::Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), entry.clone());
        Ok(())
    }
}
