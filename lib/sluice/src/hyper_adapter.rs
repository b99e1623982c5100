//! The hyper-util transport.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use sluice_core::{Adapter, AdapterRequest, Headers, PoolOptions, ResponseContext, TransportError};
use tower_service::Service;
use tracing::debug;

use crate::config::AdapterConfig;
use crate::connector::https_connector;

type HyperClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Connections are shared per pool name and connect timeout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    name: Option<String>,
    connect_timeout: Duration,
}

/// [`Adapter`] over the hyper-util legacy client, with rustls for TLS.
///
/// Each named pool (see [`Options::pool`](crate::Options::pool)) gets its own
/// connection pool. Clones share the pools.
///
/// # Example
///
/// ```
/// use sluice::{AdapterConfig, HyperAdapter};
///
/// let adapter = HyperAdapter::with_config(AdapterConfig::builder().http2(false).build());
/// assert!(!adapter.config().http2);
/// ```
#[derive(Clone)]
pub struct HyperAdapter {
    config: AdapterConfig,
    pools: Arc<Mutex<HashMap<PoolKey, HyperClient>>>,
}

impl std::fmt::Debug for HyperAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HyperAdapter {
    /// Create a new adapter with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(AdapterConfig::default())
    }

    /// Create a new adapter with custom configuration.
    #[must_use]
    pub fn with_config(config: AdapterConfig) -> Self {
        Self {
            config,
            pools: Arc::default(),
        }
    }

    /// Get the adapter configuration.
    #[must_use]
    pub const fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn client(&self, pool: &PoolOptions) -> HyperClient {
        let key = PoolKey {
            name: pool.pool.clone(),
            connect_timeout: pool.pool_timeout,
        };
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        pools
            .entry(key)
            .or_insert_with_key(|key| {
                debug!(pool = ?key.name, "creating connection pool");
                Client::builder(TokioExecutor::new())
                    .pool_idle_timeout(self.config.pool_idle_timeout)
                    .pool_max_idle_per_host(self.config.pool_idle_per_host)
                    .build(https_connector(key.connect_timeout, self.config.http2))
            })
            .clone()
    }

    async fn execute(
        client: HyperClient,
        request: AdapterRequest,
        receive_timeout: Duration,
    ) -> Result<ResponseContext, TransportError> {
        let hyper_request = build_hyper_request(request)?;

        let exchange = async {
            let response = client
                .request(hyper_request)
                .await
                .map_err(map_hyper_error)?;

            let status = response.status().as_u16();
            let headers = extract_headers(response.headers());

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::connection(e.to_string()))?
                .to_bytes();

            Ok(ResponseContext::new(status, headers, body))
        };

        tokio::time::timeout(receive_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

impl Default for HyperAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for HyperAdapter {
    fn perform(
        &self,
        request: AdapterRequest,
        pool: &PoolOptions,
    ) -> impl Future<Output = Result<ResponseContext, TransportError>> + Send {
        let client = self.client(pool);
        Self::execute(client, request, pool.receive_timeout)
    }
}

// ============================================================================
// Tower Service Implementation
// ============================================================================

/// Serves requests with the default [`PoolOptions`], so the adapter can be
/// wrapped in tower layers and plugged back in with
/// [`ServiceAdapter`](crate::ServiceAdapter).
impl Service<AdapterRequest> for HyperAdapter {
    type Response = ResponseContext;
    type Error = TransportError;
    type Future =
        Pin<Box<dyn Future<Output = Result<ResponseContext, TransportError>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), TransportError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: AdapterRequest) -> Self::Future {
        let pool = PoolOptions::default();
        let client = self.client(&pool);
        Box::pin(Self::execute(client, request, pool.receive_timeout))
    }
}

fn build_hyper_request(
    request: AdapterRequest,
) -> Result<http::Request<Full<Bytes>>, TransportError> {
    let (method, url, headers, body) = request.into_parts();

    let mut builder = http::Request::builder()
        .method(http::Method::from(method))
        .uri(url.as_str());

    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }

    builder
        .body(Full::new(body))
        .map_err(|e| TransportError::protocol(e.to_string()))
}

fn extract_headers(headers: &http::HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect()
}

#[allow(clippy::needless_pass_by_value)]
fn map_hyper_error(err: hyper_util::client::legacy::Error) -> TransportError {
    let msg = error_chain(&err);
    let lower = msg.to_ascii_lowercase();

    if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
        return TransportError::tls(msg);
    }

    if err.is_connect() {
        if lower.contains("timed out") || lower.contains("timeout") {
            return TransportError::Timeout;
        }
        return TransportError::connection(msg);
    }

    TransportError::protocol(msg)
}

/// The error and its sources, joined with `: `.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use sluice_core::Method;

    use super::*;

    #[test]
    fn adapter_default() {
        let adapter = HyperAdapter::new();
        assert_eq!(adapter.config().pool_idle_per_host, 32);
    }

    #[test]
    fn adapter_is_debug() {
        let debug = format!("{:?}", HyperAdapter::new());
        assert!(debug.contains("HyperAdapter"));
    }

    #[tokio::test]
    async fn pools_are_shared_by_name() {
        let adapter = HyperAdapter::new();
        let shared = PoolOptions::default();
        let named = PoolOptions {
            pool: Some("uploads".to_string()),
            ..PoolOptions::default()
        };

        let _ = adapter.client(&shared);
        let _ = adapter.client(&shared);
        let _ = adapter.clone().client(&named);

        let pools = adapter.pools.lock().expect("lock");
        assert_eq!(pools.len(), 2);
    }

    #[test]
    fn hyper_request_carries_headers_and_body() {
        let url = url::Url::parse("https://example.com/upload?x=1").expect("url");
        let headers: Headers = [("content-type", "text/plain"), ("x-tag", "a"), ("x-tag", "b")]
            .into_iter()
            .collect();
        let request = AdapterRequest::new(Method::Put, url, headers, Bytes::from("data"));

        let hyper_request = build_hyper_request(request).expect("request");

        assert_eq!(hyper_request.method(), http::Method::PUT);
        assert_eq!(hyper_request.uri(), "https://example.com/upload?x=1");
        assert_eq!(hyper_request.headers().get_all("x-tag").iter().count(), 2);
    }

    #[test]
    fn invalid_header_is_a_protocol_error() {
        let url = url::Url::parse("https://example.com/").expect("url");
        let headers: Headers = [("x-bad", "a\nb")].into_iter().collect();
        let request = AdapterRequest::new(Method::Get, url, headers, Bytes::new());

        let err = build_hyper_request(request).expect_err("invalid header");

        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
