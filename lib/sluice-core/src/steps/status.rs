//! The `handle_http_errors` step.

use crate::{Error, Exchange, HttpErrors, RequestContext, ResponseContext, StepResult};

/// With [`HttpErrors::Raise`], turn statuses of 400 and above into errors.
pub(super) fn handle_http_errors(request: RequestContext, response: ResponseContext) -> StepResult {
    let raise = request.options().http_errors.unwrap_or_default() == HttpErrors::Raise;
    if raise && response.status() >= 400 {
        let error = Error::http_status(response.status());
        return StepResult::halt_with(Exchange::Response(request, response), error);
    }
    StepResult::Continue(Exchange::Response(request, response))
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::steps::test_support::{context, outcome};
    use crate::{Headers, Options};

    fn response(status: u16) -> ResponseContext {
        ResponseContext::new(status, Headers::new(), "")
    }

    #[test]
    fn error_statuses_are_returned_by_default() {
        let result = handle_http_errors(context(Options::new()), response(500));
        check!(outcome(&result) == "continue:response");
    }

    #[test]
    fn raise_turns_error_statuses_into_errors() {
        let options = Options::new().http_errors(HttpErrors::Raise);

        let result = handle_http_errors(context(options.clone()), response(404));
        let_assert!(StepResult::Halt(Exchange::Failure(_, err)) = result);
        check!(err.status() == Some(404));
        check!(err.response().is_some());

        let result = handle_http_errors(context(options), response(302));
        check!(outcome(&result) == "continue:response");
    }
}
