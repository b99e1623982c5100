//! Body steps: `encode_body`, `decode_body`.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{
    ContentType, Error, Exchange, Method, RequestBody, RequestContext, ResponseBody,
    ResponseContext, Result, StepResult,
};

/// Encode a structured body to bytes and set its `content-type`.
pub(super) fn encode_body(request: &mut RequestContext) -> Result<()> {
    if request.body().is_none_or(|body| !body.is_structured()) {
        return Ok(());
    }
    let Some(body) = request.take_body() else {
        return Ok(());
    };

    let (content_type, bytes) = body.encode()?;
    if let Some(content_type) = content_type {
        request
            .headers_mut()
            .insert_if_absent("content-type", content_type);
    }
    request.set_body(Some(RequestBody::Bytes(bytes)));
    Ok(())
}

/// Decode JSON and form bodies into a structured value.
pub(super) fn decode_body(request: RequestContext, mut response: ResponseContext) -> StepResult {
    let options = request.options();
    let skip = options.is_raw()
        || options.decode_body == Some(false)
        || request.method() == Method::Head;

    let decoded = match response.body() {
        ResponseBody::Bytes(bytes) if !skip && !bytes.is_empty() => {
            let content_type = response.header("content-type").and_then(ContentType::from_header);
            decode(content_type, bytes)
        }
        _ => None,
    };

    match decoded {
        None => StepResult::Continue(Exchange::Response(request, response)),
        Some(Ok(value)) => {
            response.set_body(value);
            StepResult::Continue(Exchange::Response(request, response))
        }
        Some(Err(err)) => StepResult::halt_with(Exchange::Response(request, response), err),
    }
}

fn decode(content_type: Option<ContentType>, bytes: &Bytes) -> Option<Result<Value>> {
    match content_type? {
        ContentType::Json => Some(crate::from_json(bytes)),
        ContentType::FormUrlEncoded => Some(decode_form(bytes)),
        ContentType::PlainText | ContentType::OctetStream => None,
    }
}

/// Form fields as a JSON object of strings; a repeated name keeps its last value.
fn decode_form(bytes: &[u8]) -> Result<Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| Error::decode(format!("invalid form body: {e}")))?;
    let fields: Map<String, Value> = pairs
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::steps::test_support::{context, outcome};
    use crate::{Headers, Options};

    fn response(content_type: &str, body: &'static str) -> ResponseContext {
        let headers: Headers = [("content-type", content_type)].into_iter().collect();
        ResponseContext::new(200, headers, body)
    }

    fn decoded(result: StepResult) -> ResponseContext {
        match result {
            StepResult::Continue(Exchange::Response(_, response)) => response,
            other => panic!("unexpected {}", outcome(&other)),
        }
    }

    #[test]
    fn encode_json_body() {
        let mut request = context(Options::new().json(&json!({"name": "Alice"})).expect("json"));

        encode_body(&mut request).expect("step");

        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body().and_then(RequestBody::as_bytes).map(|bytes| &bytes[..]),
            Some(&br#"{"name":"Alice"}"#[..])
        );
    }

    #[test]
    fn encode_keeps_explicit_content_type() {
        let mut request = context(Options::new().body("hello"));
        request
            .headers_mut()
            .insert("content-type", "text/markdown");

        encode_body(&mut request).expect("step");

        assert_eq!(request.header("content-type"), Some("text/markdown"));
        assert_eq!(
            request.body().and_then(RequestBody::as_bytes).map(|bytes| &bytes[..]),
            Some(&b"hello"[..])
        );
    }

    #[test]
    fn encode_form_body() {
        let mut request = context(
            Options::new()
                .form(&[("user", "alice"), ("tag", "a b")])
                .expect("form"),
        );

        encode_body(&mut request).expect("step");

        assert_eq!(
            request.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            request.body().and_then(RequestBody::as_bytes).map(|bytes| &bytes[..]),
            Some(&b"user=alice&tag=a+b"[..])
        );
    }

    #[test]
    fn raw_bytes_are_left_alone() {
        let mut request = context(Options::new().body(Bytes::from_static(b"\x00\x01")));

        encode_body(&mut request).expect("step");

        assert!(request.header("content-type").is_none());
    }

    #[test]
    fn decode_json() {
        let result = decode_body(
            context(Options::new()),
            response("application/vnd.api+json; charset=utf-8", r#"{"id": 7}"#),
        );

        let response = decoded(result);
        assert_eq!(response.body().as_decoded(), Some(&json!({"id": 7})));
    }

    #[test]
    fn decode_form_last_value_wins() {
        let result = decode_body(
            context(Options::new()),
            response("application/x-www-form-urlencoded", "a=1&b=two&a=3"),
        );

        let response = decoded(result);
        assert_eq!(response.body().as_decoded(), Some(&json!({"a": "3", "b": "two"})));
    }

    #[test]
    fn decode_skips_text_raw_and_head() {
        let text = decoded(decode_body(
            context(Options::new()),
            response("text/plain", "{}"),
        ));
        assert!(text.body().as_bytes().is_some());

        let raw = decoded(decode_body(
            context(Options::new().raw(true)),
            response("application/json", "{}"),
        ));
        assert!(raw.body().as_bytes().is_some());

        let disabled = decoded(decode_body(
            context(Options::new().decode_body(false)),
            response("application/json", "{}"),
        ));
        assert!(disabled.body().as_bytes().is_some());

        let head = decoded(decode_body(
            context(Options::new().method(Method::Head)),
            response("application/json", "{}"),
        ));
        assert!(head.body().as_bytes().is_some());

        let empty = decoded(decode_body(
            context(Options::new()),
            response("application/json", ""),
        ));
        assert!(empty.body().as_bytes().is_some());
    }

    #[test]
    fn malformed_json_halts_with_the_response() {
        let result = decode_body(
            context(Options::new()),
            response("application/json", "{not json"),
        );

        match result {
            StepResult::Halt(Exchange::Failure(_, err)) => {
                assert!(matches!(err.kind(), crate::ErrorKind::Decode { .. }));
                assert_eq!(err.status(), Some(200));
            }
            other => panic!("unexpected {}", outcome(&other)),
        }
    }
}
