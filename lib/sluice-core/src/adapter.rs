//! Transport interface.
//!
//! The [`Adapter`] performs the wire I/O for a fully encoded
//! [`AdapterRequest`]. The `sluice` crate provides the hyper implementation;
//! [`ReplayAdapter`] replays canned results without any I/O.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::options::{DEFAULT_POOL_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT};
use crate::{Headers, Method, ResponseContext, TransportError};

/// Performs HTTP exchanges.
///
/// Implementations should be async-first and support connection pooling.
pub trait Adapter: Send + Sync {
    /// Send the request and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response could be obtained:
    /// connection and DNS failures, TLS failures, timeouts, invalid HTTP.
    fn perform(
        &self,
        request: AdapterRequest,
        pool: &PoolOptions,
    ) -> impl Future<Output = Result<ResponseContext, TransportError>> + Send;
}

impl<A: Adapter> Adapter for Arc<A> {
    fn perform(
        &self,
        request: AdapterRequest,
        pool: &PoolOptions,
    ) -> impl Future<Output = Result<ResponseContext, TransportError>> + Send {
        A::perform(self, request, pool)
    }
}

impl<A: Adapter> Adapter for &A {
    fn perform(
        &self,
        request: AdapterRequest,
        pool: &PoolOptions,
    ) -> impl Future<Output = Result<ResponseContext, TransportError>> + Send {
        A::perform(self, request, pool)
    }
}

/// Connection options passed through to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Named pool, `None` for the shared one.
    pub pool: Option<String>,
    /// Time allowed to obtain a connection.
    pub pool_timeout: Duration,
    /// Time allowed to receive the response.
    pub receive_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pool: None,
            pool_timeout: DEFAULT_POOL_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

/// A fully encoded request, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterRequest {
    method: Method,
    url: Url,
    headers: Headers,
    body: Bytes,
}

impl AdapterRequest {
    /// Creates a new request.
    #[must_use]
    pub const fn new(method: Method, url: Url, headers: Headers, body: Bytes) -> Self {
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Request body, empty when there is none.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, Url, Headers, Bytes) {
        (self.method, self.url, self.headers, self.body)
    }
}

// ============================================================================
// Replay Adapter
// ============================================================================

type Replay = Result<ResponseContext, TransportError>;

#[derive(Debug, Default)]
struct ReplayState {
    queue: VecDeque<Replay>,
    fallback: Option<Replay>,
    recorded: Vec<(AdapterRequest, PoolOptions)>,
}

/// Adapter answering from a queue of canned results.
///
/// Clones share the same queue and recording, so a test can keep a handle
/// while the client owns another.
///
/// # Example
///
/// ```
/// use sluice_core::{Headers, ReplayAdapter, ResponseContext, TransportError};
///
/// let adapter = ReplayAdapter::new()
///     .with_response(ResponseContext::new(200, Headers::new(), "ok"))
///     .with_fallback_error(TransportError::Timeout);
///
/// assert_eq!(adapter.calls(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReplayAdapter {
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayAdapter {
    /// An adapter with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: ResponseContext) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a transport error.
    #[must_use]
    pub fn with_error(self, error: TransportError) -> Self {
        self.push(Err(error));
        self
    }

    /// Answer with this response once the queue is empty.
    #[must_use]
    pub fn with_fallback_response(self, response: ResponseContext) -> Self {
        self.lock().fallback = Some(Ok(response));
        self
    }

    /// Fail with this error once the queue is empty.
    #[must_use]
    pub fn with_fallback_error(self, error: TransportError) -> Self {
        self.lock().fallback = Some(Err(error));
        self
    }

    /// Queue a result.
    pub fn push(&self, result: Result<ResponseContext, TransportError>) {
        self.lock().queue.push_back(result);
    }

    /// Number of requests performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.lock().recorded.len()
    }

    /// Requests performed, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<AdapterRequest> {
        self.lock()
            .recorded
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Pool options received, in order.
    #[must_use]
    pub fn pool_options(&self) -> Vec<PoolOptions> {
        self.lock()
            .recorded
            .iter()
            .map(|(_, pool)| pool.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Adapter for ReplayAdapter {
    async fn perform(
        &self,
        request: AdapterRequest,
        pool: &PoolOptions,
    ) -> Result<ResponseContext, TransportError> {
        let mut state = self.lock();
        state.recorded.push((request, pool.clone()));
        let fallback = state.fallback.clone();
        state.queue.pop_front().or(fallback).unwrap_or_else(|| {
            Err(TransportError::connection(
                "replay adapter has no queued response",
            ))
        })
    }
}
