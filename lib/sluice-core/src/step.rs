//! Steps and the values they exchange.
//!
//! A [`Step`] is a named transformation of an [`Exchange`]. Built-in steps are
//! enum variants; user code plugs in with [`Step::custom`]. Each phase of a
//! call runs one [`StepList`], owned by the [`RequestContext`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{Error, RequestContext, ResponseContext};

// ============================================================================
// Exchange
// ============================================================================

/// The payload threaded through the steps of a call.
#[derive(Debug, Clone)]
pub enum Exchange {
    /// A request still being prepared.
    Request(RequestContext),
    /// A response, produced by the adapter or by a step.
    Response(RequestContext, ResponseContext),
    /// A failure.
    Failure(RequestContext, Error),
}

impl Exchange {
    /// The request context, whatever the payload.
    #[must_use]
    pub const fn request(&self) -> &RequestContext {
        match self {
            Self::Request(request) | Self::Response(request, _) | Self::Failure(request, _) => {
                request
            }
        }
    }

    /// Mutable access to the request context.
    pub fn request_mut(&mut self) -> &mut RequestContext {
        match self {
            Self::Request(request) | Self::Response(request, _) | Self::Failure(request, _) => {
                request
            }
        }
    }

    /// Consume into the request context.
    #[must_use]
    pub fn into_request(self) -> RequestContext {
        match self {
            Self::Request(request) | Self::Response(request, _) | Self::Failure(request, _) => {
                request
            }
        }
    }

    /// The response, if any.
    #[must_use]
    pub const fn response(&self) -> Option<&ResponseContext> {
        match self {
            Self::Response(_, response) => Some(response),
            _ => None,
        }
    }

    /// The error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Failure(_, error) => Some(error),
            _ => None,
        }
    }

    /// Fail with `error`, attaching the current response if there is one.
    #[must_use]
    pub fn fail(self, error: Error) -> Self {
        match self {
            Self::Request(request) | Self::Failure(request, _) => Self::Failure(request, error),
            Self::Response(request, response) => {
                Self::Failure(request, error.with_response(response))
            }
        }
    }
}

/// What a step asks the runner to do next.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// Run the next step with this payload.
    Continue(Exchange),
    /// Stop the current phase with this payload.
    Halt(Exchange),
    /// Start over from the first request step with a new context.
    Restart {
        /// Context of the next attempt.
        request: RequestContext,
        /// Time to wait before the next attempt.
        delay: Duration,
    },
}

impl StepResult {
    /// Halt with `error`, attaching the current response if there is one.
    #[must_use]
    pub fn halt_with(exchange: Exchange, error: Error) -> Self {
        Self::Halt(exchange.fail(error))
    }
}

/// Signature of a custom step.
pub type StepFn = Arc<dyn Fn(Exchange) -> StepResult + Send + Sync>;

// ============================================================================
// Step
// ============================================================================

/// A pipeline step.
#[derive(Clone)]
pub enum Step {
    /// Set `user-agent` unless present.
    PutUserAgent,
    /// Advertise supported content codings.
    Compressed,
    /// Resolve a relative URL against `base_url`.
    PutBaseUrl,
    /// Load Basic credentials from a netrc file.
    LoadNetrc,
    /// Set the `authorization` header.
    Auth,
    /// Append query parameters.
    PutParams,
    /// Set the `range` header.
    PutRange,
    /// Encode structured headers.
    EncodeHeaders,
    /// Encode a structured body.
    EncodeBody,
    /// Conditional cache lookup (request phase) and store (response phase).
    PutIfModifiedSince,
    /// Hand the request to the adapter.
    RunAdapter,
    /// Restart on transient failures.
    Retry,
    /// Restart on redirects.
    FollowRedirects,
    /// Undo `content-encoding`.
    DecompressBody,
    /// Decode JSON and form bodies.
    DecodeBody,
    /// Turn error statuses into errors.
    HandleHttpErrors,
    /// User-supplied step.
    Custom {
        /// Step name, used to edit step lists.
        name: String,
        /// Step function.
        run: StepFn,
    },
}

impl Step {
    /// A custom step.
    pub fn custom<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Exchange) -> StepResult + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            run: Arc::new(run),
        }
    }

    /// Step name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::PutUserAgent => "put_user_agent",
            Self::Compressed => "compressed",
            Self::PutBaseUrl => "put_base_url",
            Self::LoadNetrc => "load_netrc",
            Self::Auth => "auth",
            Self::PutParams => "put_params",
            Self::PutRange => "put_range",
            Self::EncodeHeaders => "encode_headers",
            Self::EncodeBody => "encode_body",
            Self::PutIfModifiedSince => "put_if_modified_since",
            Self::RunAdapter => "run_adapter",
            Self::Retry => "retry",
            Self::FollowRedirects => "follow_redirects",
            Self::DecompressBody => "decompress_body",
            Self::DecodeBody => "decode_body",
            Self::HandleHttpErrors => "handle_http_errors",
            Self::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({})", self.name())
    }
}

// ============================================================================
// Step List
// ============================================================================

/// Ordered steps of one phase.
#[derive(Debug, Clone, Default)]
pub struct StepList {
    steps: Vec<Step>,
}

impl StepList {
    /// An empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Default request steps.
    #[must_use]
    pub fn default_request() -> Self {
        Self::from(vec![
            Step::PutUserAgent,
            Step::Compressed,
            Step::PutBaseUrl,
            Step::LoadNetrc,
            Step::Auth,
            Step::PutParams,
            Step::PutRange,
            Step::EncodeHeaders,
            Step::EncodeBody,
            Step::PutIfModifiedSince,
            Step::RunAdapter,
        ])
    }

    /// Default response steps.
    #[must_use]
    pub fn default_response() -> Self {
        Self::from(vec![
            Step::Retry,
            Step::FollowRedirects,
            Step::PutIfModifiedSince,
            Step::DecompressBody,
            Step::DecodeBody,
            Step::HandleHttpErrors,
        ])
    }

    /// Default error steps.
    #[must_use]
    pub fn default_error() -> Self {
        Self::from(vec![Step::Retry])
    }

    /// Steps, in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Step names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(Step::name)
    }

    /// Index of the first step with this name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name() == name)
    }

    /// Whether a step with this name is in the list.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Step at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn insert(&mut self, index: usize, steps: Vec<Step>) -> usize {
        let index = index.min(self.steps.len());
        let count = steps.len();
        self.steps.splice(index..index, steps);
        count
    }

    /// Removes every step named `name`; returns the removed indices, ascending.
    pub(crate) fn remove(&mut self, name: &str) -> Vec<usize> {
        let mut removed = Vec::new();
        let mut index = 0;
        self.steps.retain(|step| {
            let keep = step.name() != name;
            if !keep {
                removed.push(index);
            }
            index += 1;
            keep
        });
        removed
    }
}

impl From<Vec<Step>> for StepList {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl FromIterator<Step> for StepList {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Phase of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum Phase {
    /// Preparing the request.
    #[default]
    #[display("request")]
    Request,
    /// Processing a response.
    #[display("response")]
    Response,
    /// Processing a failure.
    #[display("error")]
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lists() {
        let names: Vec<_> = StepList::default_request().names().map(String::from).collect();
        assert_eq!(names.first().map(String::as_str), Some("put_user_agent"));
        assert_eq!(names.last().map(String::as_str), Some("run_adapter"));
        assert_eq!(
            StepList::default_response().names().collect::<Vec<_>>(),
            vec![
                "retry",
                "follow_redirects",
                "put_if_modified_since",
                "decompress_body",
                "decode_body",
                "handle_http_errors"
            ]
        );
        assert_eq!(StepList::default_error().names().collect::<Vec<_>>(), vec!["retry"]);
    }

    #[test]
    fn insert_and_remove() {
        let mut list = StepList::from(vec![Step::Auth, Step::PutParams, Step::Auth]);

        assert_eq!(list.remove("auth"), vec![0, 2]);
        assert_eq!(list.names().collect::<Vec<_>>(), vec!["put_params"]);

        let inserted = list.insert(1, vec![Step::custom("tag", StepResult::Continue)]);
        assert_eq!(inserted, 1);
        assert_eq!(list.names().collect::<Vec<_>>(), vec!["put_params", "tag"]);
        assert_eq!(list.position("tag"), Some(1));
        assert!(!list.contains("auth"));
    }

    #[test]
    fn step_debug_shows_name() {
        let step = Step::custom("trace", StepResult::Continue);
        assert_eq!(format!("{step:?}"), "Step(trace)");
        assert_eq!(Step::RunAdapter.name(), "run_adapter");
    }
}
