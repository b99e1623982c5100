//! Request options.
//!
//! [`Options`] is the bag every step reads. Callers fill it with the
//! builder-style setters; [`Options::merge`] layers it over defaults, and the
//! result is frozen inside the [`RequestContext`](crate::RequestContext) for
//! the whole call.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sluice_core::{Method, Options};
//!
//! let defaults = Options::new().receive_timeout(Duration::from_secs(1));
//! let options = Options::new()
//!     .method(Method::Post)
//!     .url("/users")
//!     .param("page", "2")
//!     .merge(&defaults);
//!
//! assert_eq!(options.receive_timeout, Some(Duration::from_secs(1)));
//! assert_eq!(options.method, Some(Method::Post));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{RangeFrom, RangeInclusive, RangeToInclusive};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{Error, HeaderValue, Method, PoolOptions, RequestBody, RequestContext, Result};

/// Default value of `max_redirects`.
pub const DEFAULT_MAX_REDIRECTS: usize = 50;

/// Default value of `max_retries` (three attempts in total).
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Statuses retried by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Base of the default exponential retry delay.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default value of `pool_timeout`.
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default value of `receive_timeout`.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(15_000);

// ============================================================================
// Option Values
// ============================================================================

/// Produces an `authorization` header value for a request.
pub type AuthFn =
    Arc<dyn Fn(&RequestContext) -> std::result::Result<String, String> + Send + Sync>;

/// Credentials used by the `auth` step.
#[derive(Clone)]
pub enum Auth {
    /// `Basic base64(username:password)`.
    Basic {
        /// User name, must not contain `:`.
        username: String,
        /// Password.
        password: String,
    },
    /// `Basic base64(credentials)` from a `user:password` string.
    BasicEncoded(String),
    /// `Bearer <token>`.
    Bearer(String),
    /// Header value computed from the request.
    ///
    /// Runs synchronously inside the pipeline: token refreshes that need
    /// network I/O must happen before the call.
    Custom(AuthFn),
}

impl Auth {
    /// Basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    /// Custom header value producer.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::BasicEncoded(_) => f.write_str("BasicEncoded(..)"),
            Self::Bearer(_) => f.write_str("Bearer(..)"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Where the `load_netrc` step looks for credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Netrc {
    /// `$NETRC`, or `.netrc` in the home directory. A missing file is ignored.
    Default,
    /// An explicit file, which must be readable.
    Path(PathBuf),
}

impl From<bool> for Netrc {
    fn from(_: bool) -> Self {
        Self::Default
    }
}

impl From<PathBuf> for Netrc {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for Netrc {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

/// Byte range requested by the `put_range` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteRange {
    /// `first..=last`.
    Bounded {
        /// First byte offset.
        first: u64,
        /// Last byte offset, inclusive.
        last: u64,
    },
    /// `first..`, up to the end.
    From(u64),
    /// `..=last`, from the start.
    UpTo(u64),
    /// The last `n` bytes.
    Suffix(u64),
    /// A range set in `bytes=` syntax, with or without the unit prefix.
    Raw(String),
}

impl ByteRange {
    /// The last `n` bytes.
    #[must_use]
    pub const fn suffix(n: u64) -> Self {
        Self::Suffix(n)
    }

    /// Value of the `Range` header.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `first > last` or the raw text is
    /// not a valid byte range set.
    pub fn header_value(&self) -> Result<String> {
        match self {
            Self::Bounded { first, last } if first > last => Err(Error::config(format!(
                "invalid range: first byte {first} is after last byte {last}"
            ))),
            Self::Bounded { first, last } => Ok(format!("bytes={first}-{last}")),
            Self::From(first) => Ok(format!("bytes={first}-")),
            Self::UpTo(last) => Ok(format!("bytes=0-{last}")),
            Self::Suffix(n) => Ok(format!("bytes=-{n}")),
            Self::Raw(raw) => {
                let set = raw.trim();
                let set = set.strip_prefix("bytes=").unwrap_or(set);
                if !set.split(',').all(|spec| is_valid_range_spec(spec.trim())) {
                    return Err(Error::config(format!("invalid range: {raw:?}")));
                }
                Ok(format!("bytes={set}"))
            }
        }
    }
}

fn is_valid_range_spec(spec: &str) -> bool {
    let Some((first, last)) = spec.split_once('-') else {
        return false;
    };
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    match (first.is_empty(), last.is_empty()) {
        (true, true) => false,
        (true, false) => is_number(last),
        (false, true) => is_number(first),
        (false, false) => {
            is_number(first)
                && is_number(last)
                && matches!(
                    (first.parse::<u64>(), last.parse::<u64>()),
                    (Ok(first), Ok(last)) if first <= last
                )
        }
    }
}

impl From<RangeInclusive<u64>> for ByteRange {
    fn from(range: RangeInclusive<u64>) -> Self {
        Self::Bounded {
            first: *range.start(),
            last: *range.end(),
        }
    }
}

impl From<RangeFrom<u64>> for ByteRange {
    fn from(range: RangeFrom<u64>) -> Self {
        Self::From(range.start)
    }
}

impl From<RangeToInclusive<u64>> for ByteRange {
    fn from(range: RangeToInclusive<u64>) -> Self {
        Self::UpTo(range.end)
    }
}

impl From<(u64, u64)> for ByteRange {
    fn from((first, last): (u64, u64)) -> Self {
        Self::Bounded { first, last }
    }
}

/// Negative values are suffix lengths (`-500` means the last 500 bytes).
impl From<i64> for ByteRange {
    fn from(value: i64) -> Self {
        if value < 0 {
            Self::Suffix(value.unsigned_abs())
        } else {
            Self::From(value.unsigned_abs())
        }
    }
}

impl From<&str> for ByteRange {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<String> for ByteRange {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

/// Which failures the `retry` step retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retry {
    /// Transient failures of safe requests (GET, HEAD, OPTIONS) only.
    #[default]
    SafeTransient,
    /// Transient failures of any request.
    Transient,
    /// Never retry.
    Never,
}

/// How long the `retry` step waits before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDelay {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * 2^retry_count`.
    Exponential(Duration),
}

impl RetryDelay {
    /// Delay before retry number `retry_count` (0-indexed).
    #[must_use]
    pub fn delay(&self, retry_count: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential(base) => base.saturating_mul(2_u32.saturating_pow(retry_count)),
        }
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self::Exponential(DEFAULT_RETRY_BASE_DELAY)
    }
}

/// Whether error statuses stay responses or become errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpErrors {
    /// 4xx/5xx are returned as responses.
    #[default]
    Return,
    /// 4xx/5xx become [`ErrorKind::HttpStatus`](crate::ErrorKind::HttpStatus).
    Raise,
}

// ============================================================================
// Options
// ============================================================================

/// Options of a single call.
///
/// Every field is optional so that [`Options::merge`] can tell what the
/// caller left out. Steps read the merged value and never write it.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// HTTP method, `GET` when unset.
    pub method: Option<Method>,
    /// Absolute URL, or a path resolved against `base_url`.
    pub url: Option<String>,
    /// Prefix for relative URLs.
    pub base_url: Option<String>,
    /// Query parameters appended to the URL, in order.
    pub params: Vec<(String, String)>,
    /// Structured headers, encoded by the `encode_headers` step.
    pub headers: Vec<(String, HeaderValue)>,
    /// Credentials for the `auth` step.
    pub auth: Option<Auth>,
    /// Netrc lookup for the `load_netrc` step.
    pub netrc: Option<Netrc>,
    /// Byte range for the `put_range` step.
    pub range: Option<ByteRange>,
    /// Request body.
    pub body: Option<RequestBody>,
    /// Skip decompression and decoding of the response body.
    pub raw: Option<bool>,
    /// Decode known content types, `true` when unset.
    pub decode_body: Option<bool>,
    /// Advertise supported content codings, `true` when unset.
    pub compressed: Option<bool>,
    /// `user-agent` header value.
    pub user_agent: Option<String>,
    /// Follow redirects, `true` when unset.
    pub redirect: Option<bool>,
    /// Keep credentials when redirected to another host.
    pub location_trusted: Option<bool>,
    /// Redirect limit, [`DEFAULT_MAX_REDIRECTS`] when unset; `0` disables.
    pub max_redirects: Option<usize>,
    /// Retry mode.
    pub retry: Option<Retry>,
    /// Statuses considered transient, [`DEFAULT_RETRY_STATUSES`] when unset.
    pub retry_statuses: Option<Vec<u16>>,
    /// Delay between attempts, exponential from one second when unset.
    pub retry_delay: Option<RetryDelay>,
    /// Retry limit, [`DEFAULT_MAX_RETRIES`] when unset.
    pub max_retries: Option<u32>,
    /// Error status handling.
    pub http_errors: Option<HttpErrors>,
    /// Enable the response cache.
    pub cache: Option<bool>,
    /// Directory of the filesystem cache store.
    pub cache_dir: Option<PathBuf>,
    /// Connection pool name, passed to the adapter.
    pub pool: Option<String>,
    /// Time allowed to obtain a connection.
    pub pool_timeout: Option<Duration>,
    /// Time allowed to receive the response.
    pub receive_timeout: Option<Duration>,
    /// Free-form values for custom steps.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Options {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer `self` over `defaults`.
    ///
    /// Unset fields take the default. Params and headers are combined,
    /// defaults first, and a name set by `self` drops every default entry of
    /// that name. `extra` is merged key by key.
    #[must_use]
    pub fn merge(mut self, defaults: &Self) -> Self {
        let defaults = defaults.clone();

        self.params = merge_named(defaults.params, self.params, |a, b| a == b);
        self.headers = merge_named(defaults.headers, self.headers, str::eq_ignore_ascii_case);
        for (key, value) in defaults.extra {
            self.extra.entry(key).or_insert(value);
        }

        Self {
            method: self.method.or(defaults.method),
            url: self.url.or(defaults.url),
            base_url: self.base_url.or(defaults.base_url),
            params: self.params,
            headers: self.headers,
            auth: self.auth.or(defaults.auth),
            netrc: self.netrc.or(defaults.netrc),
            range: self.range.or(defaults.range),
            body: self.body.or(defaults.body),
            raw: self.raw.or(defaults.raw),
            decode_body: self.decode_body.or(defaults.decode_body),
            compressed: self.compressed.or(defaults.compressed),
            user_agent: self.user_agent.or(defaults.user_agent),
            redirect: self.redirect.or(defaults.redirect),
            location_trusted: self.location_trusted.or(defaults.location_trusted),
            max_redirects: self.max_redirects.or(defaults.max_redirects),
            retry: self.retry.or(defaults.retry),
            retry_statuses: self.retry_statuses.or(defaults.retry_statuses),
            retry_delay: self.retry_delay.or(defaults.retry_delay),
            max_retries: self.max_retries.or(defaults.max_retries),
            http_errors: self.http_errors.or(defaults.http_errors),
            cache: self.cache.or(defaults.cache),
            cache_dir: self.cache_dir.or(defaults.cache_dir),
            pool: self.pool.or(defaults.pool),
            pool_timeout: self.pool_timeout.or(defaults.pool_timeout),
            receive_timeout: self.receive_timeout.or(defaults.receive_timeout),
            extra: self.extra,
        }
    }

    // ========================================================================
    // Resolved Values
    // ========================================================================

    /// Whether response bodies are left untouched.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.raw.unwrap_or(false)
    }

    /// Whether the response cache is enabled.
    #[must_use]
    pub fn is_cache_enabled(&self) -> bool {
        self.cache.unwrap_or(false)
    }

    /// Redirect limit, `0` when redirects are disabled.
    #[must_use]
    pub fn effective_max_redirects(&self) -> usize {
        if self.redirect == Some(false) {
            return 0;
        }
        self.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS)
    }

    /// Options handed to the adapter.
    #[must_use]
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            pool: self.pool.clone(),
            pool_timeout: self.pool_timeout.unwrap_or(DEFAULT_POOL_TIMEOUT),
            receive_timeout: self.receive_timeout.unwrap_or(DEFAULT_RECEIVE_TIMEOUT),
        }
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Set the HTTP method.
    #[must_use]
    pub const fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the URL (absolute, or relative to `base_url`).
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Append query parameters.
    #[must_use]
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set basic credentials.
    #[must_use]
    pub fn basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth(Auth::basic(username, password))
    }

    /// Set a bearer token.
    #[must_use]
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.auth(Auth::bearer(token))
    }

    /// Look up credentials in a netrc file.
    #[must_use]
    pub fn netrc(mut self, netrc: impl Into<Netrc>) -> Self {
        self.netrc = Some(netrc.into());
        self
    }

    /// Request a byte range.
    #[must_use]
    pub fn range(mut self, range: impl Into<ByteRange>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        Ok(self.body(RequestBody::json(value)?))
    }

    /// Set a form body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn form<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        Ok(self.body(RequestBody::form(value)?))
    }

    /// Leave response bodies untouched.
    #[must_use]
    pub const fn raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Enable or disable body decoding.
    #[must_use]
    pub const fn decode_body(mut self, decode: bool) -> Self {
        self.decode_body = Some(decode);
        self
    }

    /// Enable or disable `accept-encoding` negotiation.
    #[must_use]
    pub const fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = Some(compressed);
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Enable or disable redirect following.
    #[must_use]
    pub const fn redirect(mut self, redirect: bool) -> Self {
        self.redirect = Some(redirect);
        self
    }

    /// Keep credentials across hosts when redirected.
    #[must_use]
    pub const fn location_trusted(mut self, trusted: bool) -> Self {
        self.location_trusted = Some(trusted);
        self
    }

    /// Set the redirect limit.
    #[must_use]
    pub const fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Set the retry mode.
    #[must_use]
    pub const fn retry(mut self, retry: Retry) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the statuses considered transient.
    #[must_use]
    pub fn retry_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retry_statuses = Some(statuses.into());
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: RetryDelay) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the retry limit.
    #[must_use]
    pub const fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Set the error status handling.
    #[must_use]
    pub const fn http_errors(mut self, http_errors: HttpErrors) -> Self {
        self.http_errors = Some(http_errors);
        self
    }

    /// Enable or disable the response cache.
    #[must_use]
    pub const fn cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the cache directory.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Select a connection pool.
    #[must_use]
    pub fn pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Set the pool timeout.
    #[must_use]
    pub const fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    /// Set the receive timeout.
    #[must_use]
    pub const fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Set a free-form value for custom steps.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for Options {
    fn from(url: &str) -> Self {
        Self::new().url(url)
    }
}

impl From<String> for Options {
    fn from(url: String) -> Self {
        Self::new().url(url)
    }
}

impl From<url::Url> for Options {
    fn from(url: url::Url) -> Self {
        Self::new().url(url.to_string())
    }
}

/// Defaults first; a name present in `overrides` drops the defaults of that name.
fn merge_named<V>(
    defaults: Vec<(String, V)>,
    overrides: Vec<(String, V)>,
    same: impl Fn(&str, &str) -> bool,
) -> Vec<(String, V)> {
    let mut merged: Vec<(String, V)> = defaults
        .into_iter()
        .filter(|(name, _)| !overrides.iter().any(|(other, _)| same(name, other)))
        .collect();
    merged.extend(overrides);
    merged
}
