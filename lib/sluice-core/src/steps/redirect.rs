//! The `follow_redirects` step.
//!
//! A redirect restarts the call with a derived context: new URL, possibly a
//! new method, and the redirect counter bumped. Credentials only follow the
//! redirect to the same origin unless `location_trusted` is set.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::{Error, ErrorKind, Exchange, Method, RequestContext, ResponseContext, StepResult};

/// Headers describing a body that is dropped on redirect.
const BODY_HEADERS: [&str; 2] = ["content-type", "content-length"];

/// Cache validators that belong to the previous URL.
const VALIDATOR_HEADERS: [&str; 2] = ["if-none-match", "if-modified-since"];

pub(super) fn follow_redirects(request: RequestContext, response: ResponseContext) -> StepResult {
    let max = request.options().effective_max_redirects();
    if max == 0 || !is_redirect(response.status()) {
        return StepResult::Continue(Exchange::Response(request, response));
    }
    let (Some(location), Some(current)) = (response.header("location"), request.url().as_absolute())
    else {
        return StepResult::Continue(Exchange::Response(request, response));
    };

    if request.redirect_count() >= max {
        let error = Error::new(ErrorKind::TooManyRedirects { max });
        return StepResult::halt_with(Exchange::Response(request, response), error);
    }

    let target = match current.join(location) {
        Ok(target) => target,
        Err(err) => {
            let error = Error::config(format!("invalid redirect location {location:?}: {err}"));
            return StepResult::halt_with(Exchange::Response(request, response), error);
        }
    };
    let same_origin = same_origin(current, &target);
    let status = response.status();

    let mut next = request;
    let method = redirect_method(status, next.method());
    if method != next.method() {
        next.set_method(method);
        next.set_body(None);
        for name in BODY_HEADERS {
            next.headers_mut().remove(name);
        }
    }

    for name in VALIDATOR_HEADERS {
        next.headers_mut().remove(name);
    }

    if !same_origin && !next.options().location_trusted.unwrap_or(false) {
        next.drop_credentials();
        next.remove_step("auth");
        next.remove_step("load_netrc");
    }

    debug!(
        %status,
        location = %target,
        redirect = next.redirect_count() + 1,
        "following redirect"
    );
    next.set_url(target);
    next.set_redirect_count(next.redirect_count() + 1);

    StepResult::Restart {
        request: next,
        delay: Duration::ZERO,
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Method of the redirected request.
///
/// - 303: always GET
/// - 301, 302: POST becomes GET, other methods are kept
/// - 307, 308: method preserved
fn redirect_method(status: u16, original: Method) -> Method {
    match (status, original) {
        (303, _) | (301 | 302, Method::Post) => Method::Get,
        _ => original,
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::steps::test_support::{context, outcome};
    use crate::{Headers, Options, RequestBody};

    fn redirect(status: u16, location: &str) -> ResponseContext {
        let headers: Headers = [("location", location)].into_iter().collect();
        ResponseContext::new(status, headers, "")
    }

    #[test]
    fn is_redirect_true() {
        for status in [301, 302, 303, 307, 308] {
            check!(is_redirect(status));
        }
    }

    #[test]
    fn is_redirect_false() {
        check!(!is_redirect(200));
        check!(!is_redirect(300)); // 300 Multiple Choices is not auto-followed
        check!(!is_redirect(304)); // 304 Not Modified is not a redirect
    }

    #[test]
    fn redirect_methods() {
        check!(redirect_method(303, Method::Put) == Method::Get);
        check!(redirect_method(301, Method::Post) == Method::Get);
        check!(redirect_method(302, Method::Post) == Method::Get);
        check!(redirect_method(302, Method::Put) == Method::Put);
        check!(redirect_method(307, Method::Post) == Method::Post);
        check!(redirect_method(308, Method::Delete) == Method::Delete);
    }

    #[test]
    fn relative_location_resolves_against_current_url() {
        let request = context(Options::new().url("https://example.com/old/path"));

        let result = follow_redirects(request, redirect(301, "sibling"));

        let_assert!(StepResult::Restart { request, delay } = result);
        check!(request.url().to_string() == "https://example.com/old/sibling");
        check!(request.redirect_count() == 1);
        check!(delay == Duration::ZERO);
    }

    #[test]
    fn see_other_drops_the_body() {
        let mut request = context(
            Options::new()
                .url("https://example.com/submit")
                .method(Method::Post),
        );
        request.set_body(Some(RequestBody::from("payload")));
        request.headers_mut().insert("content-type", "text/plain");

        let result = follow_redirects(request, redirect(303, "/done"));

        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.method() == Method::Get);
        check!(request.body().is_none());
        check!(request.header("content-type").is_none());
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        let mut request = context(
            Options::new()
                .url("https://example.com/submit")
                .method(Method::Put),
        );
        request.set_body(Some(RequestBody::from("payload")));

        let result = follow_redirects(request, redirect(307, "/elsewhere"));

        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.method() == Method::Put);
        check!(request.body().is_some());
    }

    #[test]
    fn cross_origin_strips_credentials() {
        let mut request = context(
            Options::new()
                .url("https://api.example.com/me")
                .bearer_auth("secret"),
        );
        request.headers_mut().insert("authorization", "Bearer secret");

        let result = follow_redirects(request, redirect(302, "https://cdn.example.net/me"));

        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.header("authorization").is_none());
        check!(!request.request_steps().contains("auth"));
        check!(!request.request_steps().contains("load_netrc"));
    }

    #[test]
    fn cross_origin_stops_writing_the_authorization_option() {
        let request = context(
            Options::new()
                .url("https://api.example.com/me")
                .header("Authorization", "Bearer secret"),
        );

        let result = follow_redirects(request, redirect(302, "https://cdn.example.net/me"));

        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.credentials_dropped());
        let encoded = crate::steps::run(&crate::Step::EncodeHeaders, Exchange::Request(request));
        let_assert!(StepResult::Continue(Exchange::Request(encoded)) = encoded);
        check!(encoded.header("authorization").is_none());
    }

    #[test]
    fn validators_do_not_follow_the_redirect() {
        let mut request = context(Options::new().url("https://example.com/a"));
        request.headers_mut().insert("if-none-match", "\"v1\"");
        request.headers_mut().insert("if-modified-since", "Mon, 01 Jan 2024 00:00:00 GMT");

        let result = follow_redirects(request, redirect(302, "/b"));

        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.header("if-none-match").is_none());
        check!(request.header("if-modified-since").is_none());
    }

    #[test]
    fn same_origin_or_trusted_keeps_credentials() {
        let mut request = context(Options::new().url("https://api.example.com/me"));
        request.headers_mut().insert("authorization", "Bearer secret");
        let result = follow_redirects(request, redirect(302, "/v2/me"));
        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.header("authorization") == Some("Bearer secret"));
        check!(request.request_steps().contains("auth"));

        let mut request = context(
            Options::new()
                .url("https://api.example.com/me")
                .location_trusted(true),
        );
        request.headers_mut().insert("authorization", "Bearer secret");
        let result = follow_redirects(request, redirect(302, "http://api.example.com/me"));
        let_assert!(StepResult::Restart { request, .. } = result);
        check!(request.header("authorization") == Some("Bearer secret"));
    }

    #[test]
    fn limit_reached_halts_with_the_response() {
        let mut request = context(Options::new().max_redirects(2));
        request.set_redirect_count(2);

        let result = follow_redirects(request, redirect(302, "/again"));

        let_assert!(StepResult::Halt(Exchange::Failure(_, err)) = result);
        check!(err.kind() == &ErrorKind::TooManyRedirects { max: 2 });
        check!(err.status() == Some(302));
    }

    #[test]
    fn disabled_or_missing_location_passes_through() {
        let request = context(Options::new().redirect(false));
        let result = follow_redirects(request, redirect(302, "/next"));
        check!(outcome(&result) == "continue:response");

        let request = context(Options::new().max_redirects(0));
        let result = follow_redirects(request, redirect(302, "/next"));
        check!(outcome(&result) == "continue:response");

        let request = context(Options::new());
        let result = follow_redirects(request, ResponseContext::new(302, Headers::new(), ""));
        check!(outcome(&result) == "continue:response");
    }
}
