//! The client: default options and step lists over an adapter.

use std::sync::Arc;

use sluice_core::{
    Adapter, CacheStore, Method, Options, RequestContext, ResponseContext, Result, Step, StepList,
    StepRunner,
};
use tracing::debug;

use crate::config::AdapterConfig;
use crate::defaults::default_options;
use crate::fs_cache::FsCacheStore;
use crate::hyper_adapter::HyperAdapter;

/// HTTP client running each call through the step pipeline.
///
/// Call options are merged over the client options, which are merged over
/// the process-wide [`default_options`](crate::default_options). Clones share
/// the adapter and its connection pools.
///
/// # Example
///
/// ```no_run
/// use sluice::{Client, Options};
///
/// # async fn run() -> sluice::Result<()> {
/// let client = Client::builder()
///     .options(Options::new().base_url("https://api.example.com").bearer_auth("token"))
///     .build();
///
/// let response = client.get("/users/42").await?;
/// let user: serde_json::Value = response.json()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client<A = HyperAdapter> {
    adapter: A,
    options: Options,
    request_steps: StepList,
    response_steps: StepList,
    error_steps: StepList,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl<A> std::fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("request_steps", &self.request_steps)
            .field("response_steps", &self.response_steps)
            .field("error_steps", &self.error_steps)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Adapter> Client<A> {
    /// Client options.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// The adapter.
    #[must_use]
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run a call.
    ///
    /// Anything convertible into [`Options`] works, a URL string included.
    ///
    /// # Errors
    ///
    /// Returns the error the pipeline ended with: configuration, transport,
    /// decoding, redirect or retry limits, or an error status when
    /// `http_errors` is `Raise`.
    pub async fn request(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        let options = options
            .into()
            .merge(&self.options)
            .merge(&default_options());
        let cache_store = self.cache_store_for(&options);

        let mut request = RequestContext::new(options)?.with_steps(
            self.request_steps.clone(),
            self.response_steps.clone(),
            self.error_steps.clone(),
        );
        if let Some(store) = cache_store {
            request = request.with_cache_store(store);
        }

        StepRunner::new(&self.adapter).run(request).await
    }

    /// Run a GET call.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn get(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        self.request(options.into().method(Method::Get)).await
    }

    /// Run a POST call.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn post(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        self.request(options.into().method(Method::Post)).await
    }

    /// Run a PUT call.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn put(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        self.request(options.into().method(Method::Put)).await
    }

    /// Run a PATCH call.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn patch(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        self.request(options.into().method(Method::Patch)).await
    }

    /// Run a DELETE call.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn delete(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        self.request(options.into().method(Method::Delete)).await
    }

    /// Run a HEAD call.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn head(&self, options: impl Into<Options>) -> Result<ResponseContext> {
        self.request(options.into().method(Method::Head)).await
    }

    /// Store for a call with caching enabled: the configured one, else a
    /// filesystem store under `cache_dir` or the user cache directory.
    fn cache_store_for(&self, options: &Options) -> Option<Arc<dyn CacheStore>> {
        if !options.is_cache_enabled() {
            return None;
        }
        if let Some(store) = &self.cache_store {
            return Some(Arc::clone(store));
        }
        let dir = options.cache_dir.clone().or_else(FsCacheStore::default_dir)?;
        debug!(dir = %dir.display(), "using filesystem cache");
        Some(Arc::new(FsCacheStore::new(dir)))
    }
}

/// Builder for [`Client`].
///
/// # Example
///
/// ```
/// use sluice::{Client, Exchange, Options, Step, StepResult};
///
/// let client = Client::builder()
///     .options(Options::new().max_retries(5))
///     .append_request_steps([Step::custom("trace_id", |exchange| {
///         StepResult::Continue(match exchange {
///             Exchange::Request(mut request) => {
///                 request.headers_mut().insert("x-trace-id", "abc");
///                 Exchange::Request(request)
///             }
///             other => other,
///         })
///     })])
///     .build();
///
/// assert_eq!(client.options().max_retries, Some(5));
/// ```
#[derive(Clone)]
pub struct ClientBuilder {
    options: Options,
    adapter_config: AdapterConfig,
    request_steps: StepList,
    response_steps: StepList,
    error_steps: StepList,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            options: Options::new(),
            adapter_config: AdapterConfig::default(),
            request_steps: StepList::default_request(),
            response_steps: StepList::default_response(),
            error_steps: StepList::default_error(),
            cache_store: None,
        }
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .field("adapter_config", &self.adapter_config)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    /// Set the client options.
    #[must_use]
    pub fn options(mut self, options: impl Into<Options>) -> Self {
        self.options = options.into();
        self
    }

    /// Set the configuration of the default [`HyperAdapter`].
    #[must_use]
    pub fn adapter_config(mut self, config: AdapterConfig) -> Self {
        self.adapter_config = config;
        self
    }

    /// Set the store used when caching is enabled.
    #[must_use]
    pub fn cache_store(mut self, store: impl CacheStore + 'static) -> Self {
        self.cache_store = Some(Arc::new(store));
        self
    }

    /// Replace the request steps.
    #[must_use]
    pub fn request_steps(mut self, steps: impl Into<StepList>) -> Self {
        self.request_steps = steps.into();
        self
    }

    /// Replace the response steps.
    #[must_use]
    pub fn response_steps(mut self, steps: impl Into<StepList>) -> Self {
        self.response_steps = steps.into();
        self
    }

    /// Replace the error steps.
    #[must_use]
    pub fn error_steps(mut self, steps: impl Into<StepList>) -> Self {
        self.error_steps = steps.into();
        self
    }

    /// Add request steps at the end.
    #[must_use]
    pub fn append_request_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.request_steps = append(&self.request_steps, steps);
        self
    }

    /// Add request steps at the start.
    #[must_use]
    pub fn prepend_request_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.request_steps = prepend(&self.request_steps, steps);
        self
    }

    /// Add response steps at the end.
    #[must_use]
    pub fn append_response_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.response_steps = append(&self.response_steps, steps);
        self
    }

    /// Add response steps at the start.
    #[must_use]
    pub fn prepend_response_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.response_steps = prepend(&self.response_steps, steps);
        self
    }

    /// Add error steps at the end.
    #[must_use]
    pub fn append_error_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.error_steps = append(&self.error_steps, steps);
        self
    }

    /// Add error steps at the start.
    #[must_use]
    pub fn prepend_error_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.error_steps = prepend(&self.error_steps, steps);
        self
    }

    /// Build a client over a [`HyperAdapter`].
    #[must_use]
    pub fn build(self) -> Client {
        let adapter = HyperAdapter::with_config(self.adapter_config.clone());
        self.build_with(adapter)
    }

    /// Build a client over `adapter`; the adapter config is not used.
    #[must_use]
    pub fn build_with<A: Adapter>(self, adapter: A) -> Client<A> {
        Client {
            adapter,
            options: self.options,
            request_steps: self.request_steps,
            response_steps: self.response_steps,
            error_steps: self.error_steps,
            cache_store: self.cache_store,
        }
    }
}

fn append(list: &StepList, steps: impl IntoIterator<Item = Step>) -> StepList {
    list.iter().cloned().chain(steps).collect()
}

fn prepend(list: &StepList, steps: impl IntoIterator<Item = Step>) -> StepList {
    steps.into_iter().chain(list.iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::{check, let_assert};
    use sluice_core::{
        ErrorKind, Exchange, Headers, HttpErrors, MemoryCacheStore, ReplayAdapter, StepResult,
        TransportError,
    };

    use super::*;

    fn ok(body: &'static str) -> ResponseContext {
        ResponseContext::new(200, Headers::new(), body)
    }

    fn client(adapter: &ReplayAdapter, builder: ClientBuilder) -> Client<ReplayAdapter> {
        builder.build_with(adapter.clone())
    }

    #[test]
    fn builder_keeps_default_steps() {
        let client = Client::builder().build_with(ReplayAdapter::new());

        check!(client.request_steps.names().last() == Some("run_adapter"));
        check!(client.response_steps.names().next() == Some("retry"));
        check!(client.error_steps.names().collect::<Vec<_>>() == ["retry"]);
    }

    #[test]
    fn builder_prepends_and_appends_steps() {
        let noop = |name: &str| Step::custom(name, StepResult::Continue);
        let client = Client::builder()
            .prepend_request_steps([noop("first")])
            .append_response_steps([noop("last")])
            .error_steps(StepList::new())
            .build_with(ReplayAdapter::new());

        check!(client.request_steps.names().next() == Some("first"));
        check!(client.response_steps.names().last() == Some("last"));
        check!(client.error_steps.is_empty());
    }

    #[tokio::test]
    async fn call_options_override_client_options() {
        let adapter = ReplayAdapter::new().with_response(ok("hi"));
        let client = client(
            &adapter,
            Client::builder().options(
                Options::new()
                    .base_url("https://api.example.com/v1/")
                    .header("x-env", "prod")
                    .header("accept", "text/plain"),
            ),
        );

        let response = client
            .get(Options::new().url("users").header("accept", "application/json"))
            .await
            .expect("response");

        check!(response.text().expect("text") == "hi");
        let requests = adapter.requests();
        let_assert!([sent] = requests.as_slice());
        check!(sent.url().as_str() == "https://api.example.com/v1/users");
        check!(sent.header("x-env") == Some("prod"));
        check!(sent.header("accept") == Some("application/json"));
    }

    #[tokio::test]
    async fn adapter_sees_the_call_timeout_over_the_client_one() {
        let adapter = ReplayAdapter::new().with_fallback_response(ok(""));
        let client = client(
            &adapter,
            Client::builder().options(Options::new().receive_timeout(Duration::from_millis(1000))),
        );

        client
            .get(Options::new().url("https://example.com/").receive_timeout(Duration::from_millis(2000)))
            .await
            .expect("override");
        client.get("https://example.com/").await.expect("inherited");

        let timeouts: Vec<Duration> = adapter
            .pool_options()
            .iter()
            .map(|pool| pool.receive_timeout)
            .collect();
        check!(timeouts == [Duration::from_millis(2000), Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn verb_helpers_set_the_method() {
        let adapter = ReplayAdapter::new().with_fallback_response(ok(""));
        let client = client(&adapter, Client::builder());

        client.post("https://example.com/a").await.expect("post");
        client.put("https://example.com/a").await.expect("put");
        client.delete("https://example.com/a").await.expect("delete");

        let methods: Vec<Method> = adapter.requests().iter().map(|r| r.method()).collect();
        check!(methods == [Method::Post, Method::Put, Method::Delete]);
    }

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let adapter = ReplayAdapter::new();
        let client = client(&adapter, Client::builder());

        let err = client.get(Options::new()).await.expect_err("missing url");

        check!(err.is_config());
        check!(adapter.calls() == 0);
    }

    #[tokio::test]
    async fn custom_steps_run_in_order() {
        let adapter = ReplayAdapter::new().with_response(ok(""));
        let tag = Step::custom("tag", |exchange| match exchange {
            Exchange::Request(mut request) => {
                request.headers_mut().insert("x-tag", "1");
                StepResult::Continue(Exchange::Request(request))
            }
            other => StepResult::Continue(other),
        });
        let client = client(&adapter, Client::builder().prepend_request_steps([tag]));

        client.get("https://example.com/").await.expect("response");

        let requests = adapter.requests();
        let_assert!([sent] = requests.as_slice());
        check!(sent.header("x-tag") == Some("1"));
    }

    #[tokio::test]
    async fn cache_store_answers_while_the_transport_fails() {
        let mut fresh = ok("cached body");
        fresh.headers_mut().insert("cache-control", "max-age=60");
        fresh.headers_mut().insert("x-version", "7");
        let adapter = ReplayAdapter::new()
            .with_response(fresh)
            .with_fallback_error(TransportError::connection("refused"));
        let client = client(
            &adapter,
            Client::builder()
                .options(Options::new().cache(true).max_retries(0))
                .cache_store(MemoryCacheStore::new()),
        );

        let first = client.get("https://example.com/data").await.expect("first");
        let second = client.get("https://example.com/data").await.expect("second");

        check!(adapter.calls() == 1);
        check!(!first.from_cache());
        check!(second.from_cache());
        check!(second.status() == first.status());
        check!(second.headers() == first.headers());
        check!(second.bytes() == first.bytes());
    }

    #[tokio::test]
    async fn cache_dir_uses_the_filesystem_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut fresh = ok("on disk");
        fresh.headers_mut().insert("cache-control", "max-age=60");
        let adapter = ReplayAdapter::new().with_response(fresh);
        let client = client(
            &adapter,
            Client::builder().options(Options::new().cache(true).cache_dir(dir.path())),
        );

        client.get("https://example.com/data").await.expect("first");
        let second = client.get("https://example.com/data").await.expect("second");

        check!(adapter.calls() == 1);
        check!(second.text().expect("text") == "on disk");
        check!(std::fs::read_dir(dir.path()).expect("read dir").count() == 1);
    }

    #[tokio::test]
    async fn raised_status_keeps_the_response() {
        let adapter =
            ReplayAdapter::new().with_response(ResponseContext::new(404, Headers::new(), "gone"));
        let client = client(
            &adapter,
            Client::builder().options(Options::new().http_errors(HttpErrors::Raise)),
        );

        let err = client.get("https://example.com/x").await.expect_err("404");

        check!(err.kind() == &ErrorKind::HttpStatus { status: 404 });
        let_assert!(Some(response) = err.response());
        check!(response.text().expect("text") == "gone");
    }
}
