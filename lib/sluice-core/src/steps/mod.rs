//! Built-in steps.
//!
//! Request steps edit the [`RequestContext`] and fail by halting the call.
//! Response steps see the response together with the request that produced
//! it. A step handed a payload it does not handle passes it through.

mod auth;
mod body;
mod cache;
#[cfg(feature = "decompression")]
mod decompress;
mod headers;
mod netrc;
mod redirect;
mod retry;
mod status;
mod target;

use crate::{Exchange, RequestContext, ResponseContext, Result, Step, StepResult};

pub use headers::USER_AGENT;

/// Run a built-in or custom step.
///
/// `run_adapter` needs the adapter and is handled by the runner; here it
/// passes the payload through.
pub(crate) fn run(step: &Step, exchange: Exchange) -> StepResult {
    match step {
        Step::PutUserAgent => on_request(exchange, headers::put_user_agent),
        Step::Compressed => on_request(exchange, headers::compressed),
        Step::PutBaseUrl => on_request(exchange, target::put_base_url),
        Step::LoadNetrc => on_request(exchange, netrc::load_netrc),
        Step::Auth => on_request(exchange, auth::auth),
        Step::PutParams => on_request(exchange, target::put_params),
        Step::PutRange => on_request(exchange, headers::put_range),
        Step::EncodeHeaders => on_request(exchange, headers::encode_headers),
        Step::EncodeBody => on_request(exchange, body::encode_body),
        Step::PutIfModifiedSince => cache::put_if_modified_since(exchange),
        Step::RunAdapter => StepResult::Continue(exchange),
        Step::Retry => retry::retry(exchange),
        Step::FollowRedirects => on_response(exchange, redirect::follow_redirects),
        Step::DecompressBody => on_response(exchange, decompress_body),
        Step::DecodeBody => on_response(exchange, body::decode_body),
        Step::HandleHttpErrors => on_response(exchange, status::handle_http_errors),
        Step::Custom { run: custom, .. } => custom(exchange),
    }
}

#[cfg(feature = "decompression")]
fn decompress_body(request: RequestContext, response: ResponseContext) -> StepResult {
    decompress::decompress_body(request, response)
}

#[cfg(not(feature = "decompression"))]
fn decompress_body(request: RequestContext, response: ResponseContext) -> StepResult {
    StepResult::Continue(Exchange::Response(request, response))
}

fn on_request(exchange: Exchange, step: fn(&mut RequestContext) -> Result<()>) -> StepResult {
    match exchange {
        Exchange::Request(mut request) => match step(&mut request) {
            Ok(()) => StepResult::Continue(Exchange::Request(request)),
            Err(err) => StepResult::Halt(Exchange::Failure(request, err)),
        },
        other => StepResult::Continue(other),
    }
}

fn on_response(
    exchange: Exchange,
    step: fn(RequestContext, ResponseContext) -> StepResult,
) -> StepResult {
    match exchange {
        Exchange::Response(request, response) => step(request, response),
        other => StepResult::Continue(other),
    }
}
