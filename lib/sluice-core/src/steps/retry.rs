//! The `retry` step.

use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::options::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_STATUSES};
use crate::{Error, ErrorKind, Exchange, Method, Options, Retry, StepResult, parse_http_date};

pub(super) fn retry(exchange: Exchange) -> StepResult {
    let source = match &exchange {
        Exchange::Request(_) => return StepResult::Continue(exchange),
        Exchange::Response(request, response) => {
            if !retryable_status(request.options(), request.method(), response.status()) {
                return StepResult::Continue(exchange);
            }
            ErrorKind::HttpStatus {
                status: response.status(),
            }
        }
        Exchange::Failure(request, error) => {
            if !error.is_transport() || !allowed(request.options(), request.method()) {
                return StepResult::Continue(exchange);
            }
            error.kind().clone()
        }
    };

    let request = exchange.request();
    let retry_count = request.retry_count();
    let max_retries = request.options().max_retries.unwrap_or(DEFAULT_MAX_RETRIES);

    if retry_count >= max_retries {
        if retry_count == 0 {
            return StepResult::Continue(exchange);
        }
        warn!(attempts = retry_count + 1, reason = %source, "retries exhausted");
        let error = Error::new(ErrorKind::RetriesExhausted {
            attempts: retry_count + 1,
            source: Box::new(source),
        });
        return StepResult::halt_with(exchange, error);
    }

    let delay = exchange
        .response()
        .and_then(|response| response.header("retry-after"))
        .and_then(retry_after)
        .unwrap_or_else(|| {
            request
                .options()
                .retry_delay
                .unwrap_or_default()
                .delay(retry_count)
        });
    // Saturating conversion to u64 (truncates after ~584 million years)
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    debug!(retry = retry_count + 1, max_retries, delay_ms, reason = %source, "retrying request");

    let mut next = exchange.into_request();
    next.set_retry_count(retry_count + 1);
    StepResult::Restart {
        request: next,
        delay,
    }
}

/// Whether the retry mode allows another attempt for `method`.
fn allowed(options: &Options, method: Method) -> bool {
    match options.retry.unwrap_or_default() {
        Retry::SafeTransient => method.is_safe(),
        Retry::Transient => true,
        Retry::Never => false,
    }
}

fn retryable_status(options: &Options, method: Method, status: u16) -> bool {
    let transient = options
        .retry_statuses
        .as_deref()
        .unwrap_or(&DEFAULT_RETRY_STATUSES)
        .contains(&status);
    transient && allowed(options, method)
}

/// `retry-after` as delta seconds or an HTTP date.
fn retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = parse_http_date(value)?;
    Some(at.duration_since(SystemTime::now()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::steps::test_support::{context, outcome};
    use crate::{Headers, RequestContext, ResponseContext, RetryDelay, TransportError};

    fn response(status: u16) -> ResponseContext {
        ResponseContext::new(status, Headers::new(), "")
    }

    fn attempt(options: Options, retry_count: u32) -> RequestContext {
        let mut request = context(options);
        request.set_retry_count(retry_count);
        request
    }

    #[test]
    fn transient_status_restarts_with_backoff() {
        let options = Options::new().retry_delay(RetryDelay::Exponential(Duration::from_millis(100)));

        let result = retry(Exchange::Response(attempt(options.clone(), 0), response(503)));
        let_assert!(StepResult::Restart { request, delay } = result);
        check!(request.retry_count() == 1);
        check!(delay == Duration::from_millis(100));

        let result = retry(Exchange::Response(attempt(options, 1), response(503)));
        let_assert!(StepResult::Restart { delay, .. } = result);
        check!(delay == Duration::from_millis(200));
    }

    #[test]
    fn retry_after_seconds_wins() {
        let mut answer = response(429);
        answer.headers_mut().insert("Retry-After", "3");

        let result = retry(Exchange::Response(context(Options::new()), answer));

        let_assert!(StepResult::Restart { delay, .. } = result);
        check!(delay == Duration::from_secs(3));
    }

    #[test]
    fn retry_after_date_in_the_past_means_no_wait() {
        let mut answer = response(503);
        answer
            .headers_mut()
            .insert("retry-after", "Sun, 06 Nov 1994 08:49:37 GMT");

        let result = retry(Exchange::Response(context(Options::new()), answer));

        let_assert!(StepResult::Restart { delay, .. } = result);
        check!(delay == Duration::ZERO);
    }

    #[test]
    fn other_statuses_pass_through() {
        let result = retry(Exchange::Response(context(Options::new()), response(404)));
        check!(outcome(&result) == "continue:response");

        let options = Options::new().retry_statuses(vec![404]);
        let result = retry(Exchange::Response(context(options), response(404)));
        check!(outcome(&result) == "restart");
    }

    #[test]
    fn safe_transient_only_retries_safe_methods() {
        let post = Options::new().method(Method::Post);
        let result = retry(Exchange::Response(context(post.clone()), response(503)));
        check!(outcome(&result) == "continue:response");

        let options = Options::new().method(Method::Options);
        let result = retry(Exchange::Response(context(options), response(503)));
        check!(outcome(&result) == "restart");

        let result = retry(Exchange::Response(
            context(post.retry(Retry::Transient)),
            response(503),
        ));
        check!(outcome(&result) == "restart");

        let never = Options::new().retry(Retry::Never);
        let result = retry(Exchange::Response(context(never), response(503)));
        check!(outcome(&result) == "continue:response");
    }

    #[test]
    fn transport_errors_are_retried() {
        let error = Error::new(TransportError::connection("refused"));
        let result = retry(Exchange::Failure(context(Options::new()), error));
        check!(outcome(&result) == "restart");

        let error = Error::config("bad");
        let result = retry(Exchange::Failure(context(Options::new()), error));
        check!(outcome(&result) == "continue:failure");
    }

    #[test]
    fn exhausted_retries_halt() {
        let result = retry(Exchange::Response(attempt(Options::new(), 2), response(502)));

        let_assert!(StepResult::Halt(Exchange::Failure(_, err)) = result);
        let_assert!(ErrorKind::RetriesExhausted { attempts, source } = err.kind());
        check!(*attempts == 3);
        check!(**source == ErrorKind::HttpStatus { status: 502 });
        check!(err.status() == Some(502));
    }

    #[test]
    fn exhausted_transport_retries_keep_the_cause() {
        let options = Options::new().max_retries(1);
        let error = Error::new(TransportError::Timeout);

        let result = retry(Exchange::Failure(attempt(options, 1), error));

        let_assert!(StepResult::Halt(Exchange::Failure(_, err)) = result);
        let_assert!(ErrorKind::RetriesExhausted { attempts: 2, source } = err.kind());
        check!(**source == ErrorKind::Transport(TransportError::Timeout));
    }

    #[test]
    fn zero_max_retries_passes_through_untouched() {
        let options = Options::new().max_retries(0);

        let result = retry(Exchange::Response(context(options.clone()), response(503)));
        check!(outcome(&result) == "continue:response");

        let error = Error::new(TransportError::Timeout);
        let result = retry(Exchange::Failure(context(options), error));
        let_assert!(StepResult::Continue(Exchange::Failure(_, err)) = result);
        check!(err.is_timeout());
    }
}
