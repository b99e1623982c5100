//! Pipeline execution.
//!
//! The [`StepRunner`] folds the step lists of a [`RequestContext`] over an
//! [`Exchange`]: request steps first, then either the response or the error
//! steps. Steps steer it with [`StepResult`]; retries and redirects are
//! restarts requested by steps, bounded by the counters they keep in the
//! context.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::step::Phase;
use crate::{
    Adapter, AdapterRequest, Error, Exchange, RequestBody, RequestContext, ResponseContext,
    Result, Step, StepResult, steps,
};

/// Runs a call through its steps and the adapter.
///
/// # Example
///
/// ```
/// use sluice_core::{Headers, Options, ReplayAdapter, RequestContext, ResponseContext, StepRunner};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let adapter = ReplayAdapter::new()
///     .with_response(ResponseContext::new(200, Headers::new(), "hello"));
/// let request = RequestContext::new(Options::new().url("https://example.com"))
///     .expect("valid options");
///
/// let response = StepRunner::new(&adapter).run(request).await.expect("response");
///
/// assert_eq!(response.text().expect("text"), "hello");
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StepRunner<'a, A> {
    adapter: &'a A,
}

impl<'a, A: Adapter> StepRunner<'a, A> {
    /// A runner sending requests through `adapter`.
    #[must_use]
    pub const fn new(adapter: &'a A) -> Self {
        Self { adapter }
    }

    /// Run the call to completion.
    ///
    /// # Errors
    ///
    /// Returns the final error of the pipeline, with the last request
    /// attached.
    pub async fn run(&self, request: RequestContext) -> Result<ResponseContext> {
        let method = request.method();
        let url = request.url().to_string();
        let span = span!(Level::INFO, "http_request", %method, %url);

        async move {
            let start = Instant::now();
            let result = self.run_phases(request).await;

            // Saturating conversion to u64 (truncates after ~584 million years)
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match &result {
                Ok(response) => {
                    let status = response.status();
                    let from_cache = response.from_cache();
                    if response.is_success() || response.is_redirection() {
                        info!(status, from_cache, elapsed_ms, "request completed");
                    } else {
                        warn!(status, from_cache, elapsed_ms, "request completed with HTTP error");
                    }
                }
                Err(err) => warn!(error = %err, elapsed_ms, "request failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    async fn run_phases(&self, mut request: RequestContext) -> Result<ResponseContext> {
        request.begin_phase(Phase::Request);
        let mut phase = Phase::Request;
        let mut exchange = Exchange::Request(request);

        loop {
            let Some(step) = exchange.request_mut().next_step() else {
                debug!(%phase, "phase completed");
                return finish(exchange);
            };
            debug!(step = step.name(), %phase, "running step");

            let result = match step {
                Step::RunAdapter if phase == Phase::Request => {
                    StepResult::Continue(self.perform(exchange).await)
                }
                step => steps::run(&step, exchange),
            };

            let next = match result {
                StepResult::Continue(next) => next,
                StepResult::Halt(Exchange::Request(request)) if phase == Phase::Request => {
                    debug!("request steps halted, sending request");
                    self.perform(Exchange::Request(request)).await
                }
                StepResult::Halt(exchange) => {
                    debug!(%phase, "pipeline halted");
                    return finish(exchange);
                }
                StepResult::Restart { mut request, delay } => {
                    restart(&mut request, delay).await;
                    phase = Phase::Request;
                    exchange = Exchange::Request(request);
                    continue;
                }
            };

            exchange = next;
            let next_phase = match (&exchange, phase) {
                (Exchange::Request(_), Phase::Request) => Phase::Request,
                (Exchange::Request(_), _) => return finish(exchange),
                (Exchange::Response(..), _) => Phase::Response,
                (Exchange::Failure(..), _) => Phase::Error,
            };
            if next_phase != phase {
                debug!(from = %phase, to = %next_phase, "switching phase");
                exchange.request_mut().begin_phase(next_phase);
                phase = next_phase;
            }
        }
    }

    /// The `run_adapter` step.
    async fn perform(&self, exchange: Exchange) -> Exchange {
        let Exchange::Request(request) = exchange else {
            return exchange;
        };

        let adapter_request = match adapter_request(&request) {
            Ok(adapter_request) => adapter_request,
            Err(err) => return Exchange::Failure(request, err),
        };
        let pool = request.options().pool_options();

        debug!(
            method = %adapter_request.method(),
            url = %adapter_request.url(),
            headers = ?adapter_request.headers(),
            "sending request"
        );

        match self.adapter.perform(adapter_request, &pool).await {
            Ok(response) => {
                debug!(status = response.status(), "response received");
                Exchange::Response(request, response)
            }
            Err(err) => {
                debug!(error = %err, "transport failed");
                Exchange::Failure(request, Error::from(err))
            }
        }
    }
}

async fn restart(request: &mut RequestContext, delay: Duration) {
    // Saturating conversion to u64 (truncates after ~584 million years)
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    debug!(attempt = request.attempt() + 1, delay_ms, "restarting request");

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    request.begin_phase(Phase::Request);
}

fn adapter_request(request: &RequestContext) -> Result<AdapterRequest> {
    let url = request.url().as_absolute().cloned().ok_or_else(|| {
        Error::config(format!(
            "cannot send a request to relative URL {:?} (no base_url)",
            request.url().to_string()
        ))
    })?;

    let body = match request.body() {
        None => Bytes::new(),
        Some(RequestBody::Bytes(bytes)) => bytes.clone(),
        Some(_) => {
            return Err(Error::config(
                "request body must be encoded before it is sent",
            ));
        }
    };

    Ok(AdapterRequest::new(
        request.method(),
        url,
        request.headers().clone(),
        body,
    ))
}

fn finish(exchange: Exchange) -> Result<ResponseContext> {
    match exchange {
        Exchange::Response(_, response) => Ok(response),
        Exchange::Failure(request, err) => Err(if err.has_request() {
            err
        } else {
            err.with_request(request)
        }),
        Exchange::Request(request) => Err(Error::config(format!(
            "pipeline ended in the {} phase without a response",
            request.phase()
        ))
        .with_request(request)),
    }
}
