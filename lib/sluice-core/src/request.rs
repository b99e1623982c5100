//! The request side of a call.
//!
//! A [`RequestContext`] is created once per call from merged [`Options`]. It
//! carries the request being built, the step lists of every phase, and the
//! bookkeeping that retry and redirect steps rely on. Restarts derive new
//! contexts from the previous one, so every attempt can be inspected.
//!
//! # Example
//!
//! ```
//! use sluice_core::{Method, Options, RequestContext, Step, StepResult};
//!
//! let mut request = RequestContext::new(
//!     Options::new().method(Method::Post).url("https://api.example.com/users"),
//! )
//! .expect("valid options");
//!
//! request.append_request_steps([Step::custom("trace", StepResult::Continue)]);
//! request.remove_step("compressed");
//!
//! assert_eq!(request.method(), Method::Post);
//! assert!(request.request_steps().contains("trace"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::step::{Phase, Step, StepList};
use crate::{CacheStore, Error, Headers, Method, Options, RequestBody, Result};

// ============================================================================
// Target
// ============================================================================

/// URL of a request, absolute once `put_base_url` ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Fully resolved URL.
    Absolute(Url),
    /// Path waiting for a base URL.
    Relative(String),
}

impl Target {
    /// Parse absolute URLs; anything without a scheme is relative.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed absolute URLs.
    pub fn parse(input: &str) -> Result<Self> {
        match Url::parse(input) {
            Ok(url) => Ok(Self::Absolute(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self::Relative(input.to_string())),
            Err(error) => Err(Error::config(format!("invalid URL {input:?}: {error}"))),
        }
    }

    /// The resolved URL, if any.
    #[must_use]
    pub const fn as_absolute(&self) -> Option<&Url> {
        match self {
            Self::Absolute(url) => Some(url),
            Self::Relative(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(url) => fmt::Display::fmt(url, f),
            Self::Relative(path) => f.write_str(path),
        }
    }
}

// ============================================================================
// Request Context
// ============================================================================

/// The request being built, plus everything the pipeline needs to run it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: Target,
    headers: Headers,
    body: Option<RequestBody>,
    options: Arc<Options>,
    cache_store: Option<Arc<dyn CacheStore>>,
    request_steps: StepList,
    response_steps: StepList,
    error_steps: StepList,
    phase: Phase,
    cursor: usize,
    attempt: u32,
    retry_count: u32,
    redirect_count: usize,
    params_applied: bool,
    credentials_dropped: bool,
    private: BTreeMap<String, serde_json::Value>,
}

impl RequestContext {
    /// Create a context with the default step lists.
    ///
    /// The options must already be merged with their defaults; they are
    /// frozen from here on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the URL is missing or malformed.
    pub fn new(options: Options) -> Result<Self> {
        let url = options
            .url
            .as_deref()
            .ok_or_else(|| Error::config("missing URL"))
            .and_then(Target::parse)?;

        Ok(Self {
            method: options.method.unwrap_or_default(),
            url,
            headers: Headers::new(),
            body: options.body.clone(),
            options: Arc::new(options),
            cache_store: None,
            request_steps: StepList::default_request(),
            response_steps: StepList::default_response(),
            error_steps: StepList::default_error(),
            phase: Phase::Request,
            cursor: 0,
            attempt: 0,
            retry_count: 0,
            redirect_count: 0,
            params_applied: false,
            credentials_dropped: false,
            private: BTreeMap::new(),
        })
    }

    /// Set the store used by `put_if_modified_since`.
    #[must_use]
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Replace every step list.
    #[must_use]
    pub fn with_steps(mut self, request: StepList, response: StepList, error: StepList) -> Self {
        self.request_steps = request;
        self.response_steps = response;
        self.error_steps = error;
        self.cursor = 0;
        self
    }

    // ========================================================================
    // Request
    // ========================================================================

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Change the HTTP method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Request URL.
    #[must_use]
    pub const fn url(&self) -> &Target {
        &self.url
    }

    /// Point the request at an absolute URL.
    pub fn set_url(&mut self, url: Url) {
        self.url = Target::Absolute(url);
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: Option<RequestBody>) {
        self.body = body;
    }

    /// Take the body out.
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }

    /// Merged options of the call.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Cache store, if one is attached.
    #[must_use]
    pub fn cache_store(&self) -> Option<&Arc<dyn CacheStore>> {
        self.cache_store.as_ref()
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Number of times the request phase started, the current one included.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retries performed so far.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Redirects followed so far.
    #[must_use]
    pub const fn redirect_count(&self) -> usize {
        self.redirect_count
    }

    pub(crate) fn set_retry_count(&mut self, count: u32) {
        self.retry_count = count;
    }

    pub(crate) fn set_redirect_count(&mut self, count: usize) {
        self.redirect_count = count;
    }

    pub(crate) const fn params_applied(&self) -> bool {
        self.params_applied
    }

    pub(crate) fn mark_params_applied(&mut self) {
        self.params_applied = true;
    }

    /// Whether credentials were dropped after a redirect to another origin.
    ///
    /// Once set, `encode_headers` no longer writes an `authorization` entry
    /// from the options.
    #[must_use]
    pub const fn credentials_dropped(&self) -> bool {
        self.credentials_dropped
    }

    pub(crate) fn drop_credentials(&mut self) {
        self.credentials_dropped = true;
        self.headers.remove("authorization");
    }

    /// Free-form value stored by a custom step.
    #[must_use]
    pub fn private(&self, key: &str) -> Option<&serde_json::Value> {
        self.private.get(key)
    }

    /// Store a free-form value for later steps and attempts.
    pub fn put_private(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.private.insert(key.into(), value.into());
    }

    // ========================================================================
    // Step Lists
    // ========================================================================

    /// Request phase steps.
    #[must_use]
    pub const fn request_steps(&self) -> &StepList {
        &self.request_steps
    }

    /// Response phase steps.
    #[must_use]
    pub const fn response_steps(&self) -> &StepList {
        &self.response_steps
    }

    /// Error phase steps.
    #[must_use]
    pub const fn error_steps(&self) -> &StepList {
        &self.error_steps
    }

    /// Add request steps at the end.
    pub fn append_request_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        let index = self.request_steps.len();
        self.insert_steps(Phase::Request, index, steps.into_iter().collect());
    }

    /// Add request steps at the start.
    pub fn prepend_request_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.insert_steps(Phase::Request, 0, steps.into_iter().collect());
    }

    /// Add response steps at the end.
    pub fn append_response_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        let index = self.response_steps.len();
        self.insert_steps(Phase::Response, index, steps.into_iter().collect());
    }

    /// Add response steps at the start.
    pub fn prepend_response_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.insert_steps(Phase::Response, 0, steps.into_iter().collect());
    }

    /// Add error steps at the end.
    pub fn append_error_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        let index = self.error_steps.len();
        self.insert_steps(Phase::Error, index, steps.into_iter().collect());
    }

    /// Add error steps at the start.
    pub fn prepend_error_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.insert_steps(Phase::Error, 0, steps.into_iter().collect());
    }

    /// Insert a request step right after `after`. Returns `false` when
    /// `after` is not in the list.
    pub fn insert_request_step_after(&mut self, after: &str, step: Step) -> bool {
        self.insert_step_after(Phase::Request, after, step)
    }

    /// Insert a response step right after `after`. Returns `false` when
    /// `after` is not in the list.
    pub fn insert_response_step_after(&mut self, after: &str, step: Step) -> bool {
        self.insert_step_after(Phase::Response, after, step)
    }

    /// Insert an error step right after `after`. Returns `false` when
    /// `after` is not in the list.
    pub fn insert_error_step_after(&mut self, after: &str, step: Step) -> bool {
        self.insert_step_after(Phase::Error, after, step)
    }

    /// Remove every step named `name` from all three lists.
    ///
    /// A step removed before its turn does not run.
    pub fn remove_step(&mut self, name: &str) -> bool {
        let mut removed = false;
        for phase in [Phase::Request, Phase::Response, Phase::Error] {
            let indices = self.steps_mut(phase).remove(name);
            if phase == self.phase {
                let before_cursor = indices.iter().filter(|&&i| i < self.cursor).count();
                self.cursor -= before_cursor;
            }
            removed |= !indices.is_empty();
        }
        removed
    }

    fn insert_step_after(&mut self, phase: Phase, after: &str, step: Step) -> bool {
        let Some(index) = self.steps(phase).position(after) else {
            return false;
        };
        self.insert_steps(phase, index + 1, vec![step]);
        true
    }

    fn insert_steps(&mut self, phase: Phase, index: usize, steps: Vec<Step>) {
        let count = self.steps_mut(phase).insert(index, steps);
        if phase == self.phase && index < self.cursor {
            self.cursor += count;
        }
    }

    const fn steps(&self, phase: Phase) -> &StepList {
        match phase {
            Phase::Request => &self.request_steps,
            Phase::Response => &self.response_steps,
            Phase::Error => &self.error_steps,
        }
    }

    fn steps_mut(&mut self, phase: Phase) -> &mut StepList {
        match phase {
            Phase::Request => &mut self.request_steps,
            Phase::Response => &mut self.response_steps,
            Phase::Error => &mut self.error_steps,
        }
    }

    // ========================================================================
    // Runner Cursor
    // ========================================================================

    /// Phase currently running.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn begin_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.cursor = 0;
        if phase == Phase::Request {
            self.attempt += 1;
        }
    }

    /// Next step of the current phase; advances the cursor.
    pub(crate) fn next_step(&mut self) -> Option<Step> {
        let step = self.steps(self.phase).get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(step)
    }
}
