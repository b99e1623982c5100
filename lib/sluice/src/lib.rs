//! HTTP client built on a step pipeline.
//!
//! A call is a [`RequestContext`] folded through three ordered step lists:
//! request steps prepare it and hand it to the [`Adapter`], response steps
//! post-process the answer, error steps handle failures. Retries and
//! redirects are restarts of the same pipeline. The default steps cover base
//! URLs, query params, auth (including netrc), compression, JSON and form
//! bodies, redirects, retries with backoff, and an HTTP cache.
//!
//! # Example
//!
//! ```no_run
//! use sluice::prelude::*;
//!
//! # async fn run() -> sluice::Result<()> {
//! // One-off call through the shared client
//! let response = sluice::get("https://api.example.com/users/42").await?;
//! let user: serde_json::Value = response.json()?;
//!
//! // Configured client
//! let client = Client::builder()
//!     .options(
//!         Options::new()
//!             .base_url("https://api.example.com")
//!             .bearer_auth("token")
//!             .http_errors(HttpErrors::Raise),
//!     )
//!     .build();
//! let created = client
//!     .post(Options::new().url("/users").json(&serde_json::json!({"name": "Alice"}))?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::LazyLock;

mod client;
mod config;
mod connector;
mod defaults;
mod fs_cache;
mod hyper_adapter;
mod service;

pub mod prelude;

pub use client::{Client, ClientBuilder};
pub use config::{AdapterConfig, AdapterConfigBuilder};
pub use defaults::{default_options, set_default_options};
pub use fs_cache::FsCacheStore;
pub use hyper_adapter::HyperAdapter;
pub use service::ServiceAdapter;

// Re-export tower for adapter composition
pub use tower;

// Re-export core types
pub use sluice_core::{
    Adapter, AdapterRequest, Auth, AuthFn, ByteRange, CacheControl, CacheKey, CacheStore,
    CachedResponse, ContentType, DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_RETRIES,
    DEFAULT_POOL_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_RETRY_STATUSES, Error, ErrorKind, Exchange, Form, HeaderValue, Headers, HttpErrors,
    MemoryCacheStore, Method, Netrc, Options, Part, Phase, PoolOptions, ReplayAdapter,
    RequestBody, RequestContext, ResponseBody, ResponseContext, Result, Retry, RetryDelay, Step,
    StepFn, StepList, StepResult, StepRunner, Target, TransportError, USER_AGENT,
    format_http_date, from_json, parse_http_date, to_form, to_json,
};

/// Client behind the free functions, created on first use.
static SHARED: LazyLock<Client> = LazyLock::new(Client::new);

/// Run a call through the shared client.
///
/// # Errors
///
/// See [`Client::request`].
pub async fn request(options: impl Into<Options>) -> Result<ResponseContext> {
    SHARED.request(options).await
}

/// Run a GET call through the shared client.
///
/// # Errors
///
/// See [`Client::request`].
pub async fn get(options: impl Into<Options>) -> Result<ResponseContext> {
    SHARED.get(options).await
}

/// Run a POST call through the shared client.
///
/// # Errors
///
/// See [`Client::request`].
pub async fn post(options: impl Into<Options>) -> Result<ResponseContext> {
    SHARED.post(options).await
}

/// Run a PUT call through the shared client.
///
/// # Errors
///
/// See [`Client::request`].
pub async fn put(options: impl Into<Options>) -> Result<ResponseContext> {
    SHARED.put(options).await
}

/// Run a PATCH call through the shared client.
///
/// # Errors
///
/// See [`Client::request`].
pub async fn patch(options: impl Into<Options>) -> Result<ResponseContext> {
    SHARED.patch(options).await
}

/// Run a DELETE call through the shared client.
///
/// # Errors
///
/// See [`Client::request`].
pub async fn delete(options: impl Into<Options>) -> Result<ResponseContext> {
    SHARED.delete(options).await
}
