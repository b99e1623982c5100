//! Header steps: `put_user_agent`, `compressed`, `put_range`, `encode_headers`.

use crate::{Error, RequestContext, Result};

/// Default `user-agent` value.
pub const USER_AGENT: &str = concat!("sluice/", env!("CARGO_PKG_VERSION"));

/// Codings the `decompress_body` step understands.
#[cfg(feature = "decompression")]
const ACCEPT_ENCODING: Option<&str> = Some("gzip, deflate, br, zstd");
#[cfg(not(feature = "decompression"))]
const ACCEPT_ENCODING: Option<&str> = None;

pub(super) fn put_user_agent(request: &mut RequestContext) -> Result<()> {
    let agent = request
        .options()
        .user_agent
        .clone()
        .unwrap_or_else(|| USER_AGENT.to_string());
    request.headers_mut().insert_if_absent("user-agent", agent);
    Ok(())
}

pub(super) fn compressed(request: &mut RequestContext) -> Result<()> {
    let options = request.options();
    if options.is_raw() || options.compressed == Some(false) {
        return Ok(());
    }
    if let Some(codings) = ACCEPT_ENCODING {
        request
            .headers_mut()
            .insert_if_absent("accept-encoding", codings);
    }
    Ok(())
}

pub(super) fn put_range(request: &mut RequestContext) -> Result<()> {
    let Some(range) = request.options().range.as_ref() else {
        return Ok(());
    };
    let value = range.header_value()?;
    request.headers_mut().insert("range", value);
    Ok(())
}

/// Lower-case every header name and write the structured `headers` option.
///
/// Safe to run twice: names are replaced, never duplicated. An
/// `authorization` entry is skipped once credentials were dropped.
pub(super) fn encode_headers(request: &mut RequestContext) -> Result<()> {
    let skip_authorization = request.credentials_dropped();
    let mut encoded: Vec<(String, String)> = Vec::with_capacity(request.options().headers.len());
    for (name, value) in &request.options().headers {
        let name = name.to_ascii_lowercase();
        if skip_authorization && name == "authorization" {
            continue;
        }
        let value = value.encode();
        validate(&name, &value)?;
        encoded.push((name, value));
    }

    let headers = request.headers_mut();
    headers.normalize_names();

    let mut written: Vec<&str> = Vec::new();
    for (name, value) in &encoded {
        if written.contains(&name.as_str()) {
            headers.append(name.as_str(), value.as_str());
        } else {
            headers.insert(name.as_str(), value.as_str());
            written.push(name.as_str());
        }
    }
    Ok(())
}

fn validate(name: &str, value: &str) -> Result<()> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::config(format!("invalid header name {name:?}: {e}")))?;
    http::HeaderValue::from_str(value)
        .map_err(|e| Error::config(format!("invalid value for header {name:?}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::steps::test_support::context;
    use crate::{ByteRange, HeaderValue, Options};

    #[test]
    fn user_agent_default_and_override() {
        let mut request = context(Options::new());
        put_user_agent(&mut request).expect("step");
        assert_eq!(request.header("user-agent"), Some(USER_AGENT));

        let mut request = context(Options::new().user_agent("bot/1.0"));
        put_user_agent(&mut request).expect("step");
        assert_eq!(request.header("user-agent"), Some("bot/1.0"));

        let mut request = context(Options::new());
        request.headers_mut().insert("User-Agent", "preset");
        put_user_agent(&mut request).expect("step");
        assert_eq!(request.header("user-agent"), Some("preset"));
    }

    #[test]
    fn compressed_sets_accept_encoding_unless_disabled() {
        let mut request = context(Options::new());
        compressed(&mut request).expect("step");
        assert_eq!(request.header("accept-encoding"), ACCEPT_ENCODING);

        let mut request = context(Options::new().raw(true));
        compressed(&mut request).expect("step");
        assert!(request.header("accept-encoding").is_none());

        let mut request = context(Options::new().compressed(false));
        compressed(&mut request).expect("step");
        assert!(request.header("accept-encoding").is_none());
    }

    #[test]
    fn range_header() {
        let mut request = context(Options::new().range((0_u64, 499_u64)));
        put_range(&mut request).expect("step");
        assert_eq!(request.header("range"), Some("bytes=0-499"));

        let mut request = context(Options::new().range(-500_i64));
        put_range(&mut request).expect("step");
        assert_eq!(request.header("range"), Some("bytes=-500"));

        let mut request = context(Options::new().range(ByteRange::from(10..=2_u64)));
        let err = put_range(&mut request).expect_err("invalid");
        assert!(err.is_config());
    }

    #[test]
    fn encode_headers_is_idempotent() {
        let date = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let mut request = context(
            Options::new()
                .header("X-Tags", HeaderValue::from(&["a", "b"][..]))
                .header("If-Modified-Since", date)
                .header("Content-Length", 42_i64)
                .header("Accept", "text/html")
                .header("accept", "application/json"),
        );
        request.headers_mut().append("X-Preset", "kept");

        encode_headers(&mut request).expect("first");
        let first = request.headers().clone();
        encode_headers(&mut request).expect("second");

        assert_eq!(request.headers(), &first);
        let lines: Vec<_> = first.iter().collect();
        assert_eq!(
            lines,
            vec![
                ("x-preset", "kept"),
                ("x-tags", "a, b"),
                ("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT"),
                ("content-length", "42"),
                ("accept", "text/html"),
                ("accept", "application/json"),
            ]
        );
    }

    #[test]
    fn encode_headers_replaces_existing() {
        let mut request = context(Options::new().header("Accept", "application/json"));
        request.headers_mut().append("ACCEPT", "*/*");

        encode_headers(&mut request).expect("step");

        assert_eq!(request.headers().get_all("accept").collect::<Vec<_>>(), vec!["application/json"]);
    }

    #[test]
    fn encode_headers_rejects_invalid_values() {
        let mut request = context(Options::new().header("x-bad", "a\r\nb"));
        assert!(encode_headers(&mut request).expect_err("invalid").is_config());

        let mut request = context(Options::new().header("bad name", "v"));
        assert!(encode_headers(&mut request).expect_err("invalid").is_config());
    }
}
