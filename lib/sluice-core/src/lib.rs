//! Core pipeline engine for the sluice HTTP client.
//!
//! A call is a [`RequestContext`] walked through three lists of [`Step`]s by a
//! [`StepRunner`]: request steps prepare it, an [`Adapter`] performs the
//! exchange, response steps post-process the answer and error steps get a
//! chance to recover from failures.
//!
//! This crate provides:
//! - [`Options`] - per-call options and their merge with defaults
//! - [`RequestContext`] and [`ResponseContext`] - the state a call carries
//! - [`Step`], [`StepList`], [`Exchange`] and [`StepResult`] - the pipeline vocabulary
//! - [`StepRunner`] - the executor
//! - [`Adapter`] - the transport seam, with [`ReplayAdapter`] as test double
//! - [`CacheStore`] - the response cache seam, with [`MemoryCacheStore`]
//! - [`Error`] and [`Result`] - error handling

mod adapter;
mod body;
mod cache;
mod error;
mod headers;
mod method;
mod multipart;
mod options;
pub mod prelude;
mod request;
mod response;
mod runner;
mod step;
mod steps;

pub use adapter::{Adapter, AdapterRequest, PoolOptions, ReplayAdapter};
pub use body::{ContentType, RequestBody, ResponseBody, from_json, to_form, to_json};
pub use cache::{CacheControl, CacheKey, CacheStore, CachedResponse, MemoryCacheStore};
pub use error::{Error, ErrorKind, Result, TransportError};
pub use headers::{HeaderValue, Headers, format_http_date, parse_http_date};
pub use method::Method;
pub use multipart::{Form, Part};
pub use options::{
    Auth, AuthFn, ByteRange, DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_RETRIES,
    DEFAULT_POOL_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_RETRY_STATUSES, HttpErrors, Netrc, Options, Retry, RetryDelay,
};
pub use request::{RequestContext, Target};
pub use response::ResponseContext;
pub use runner::StepRunner;
pub use step::{Exchange, Phase, Step, StepFn, StepList, StepResult};
pub use steps::USER_AGENT;
