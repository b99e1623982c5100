//! The `put_if_modified_since` step.
//!
//! On the request side a fresh stored response answers the call directly and a
//! stale one turns the request into a conditional one. On the response side a
//! `304 Not Modified` is replaced by the stored response and a `200 OK` is
//! stored. Store failures never fail the call.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::{
    CacheKey, CacheStore, CachedResponse, Error, Exchange, RequestContext, ResponseContext,
    StepResult, format_http_date,
};

pub(super) fn put_if_modified_since(exchange: Exchange) -> StepResult {
    match exchange {
        Exchange::Request(request) => before_request(request),
        Exchange::Response(request, response) => after_response(request, response),
        failure @ Exchange::Failure(..) => StepResult::Continue(failure),
    }
}

fn before_request(mut request: RequestContext) -> StepResult {
    let Some((store, key)) = (match lookup(&request) {
        Ok(found) => found,
        Err(err) => return StepResult::Halt(Exchange::Failure(request, err)),
    }) else {
        return StepResult::Continue(Exchange::Request(request));
    };

    let entry = match store.get(&key) {
        Ok(entry) => entry,
        Err(err) => {
            warn!(key = %key, error = %err, "cache read failed");
            None
        }
    };
    let Some(entry) = entry else {
        return StepResult::Continue(Exchange::Request(request));
    };

    if entry.is_fresh(SystemTime::now()) {
        match entry.to_response() {
            Ok(response) => {
                debug!(key = %key, "serving fresh cached response");
                return StepResult::Continue(Exchange::Response(request, response));
            }
            Err(err) => warn!(key = %key, error = %err, "corrupt cache entry"),
        }
        return StepResult::Continue(Exchange::Request(request));
    }

    let headers = request.headers_mut();
    if let Some(etag) = entry.headers.get("etag") {
        headers.insert("if-none-match", etag);
    }
    let modified = entry
        .headers
        .get("last-modified")
        .map_or_else(|| format_http_date(entry.stored_at), str::to_string);
    headers.insert("if-modified-since", modified);
    debug!(key = %key, "revalidating cached response");

    StepResult::Continue(Exchange::Request(request))
}

fn after_response(request: RequestContext, response: ResponseContext) -> StepResult {
    if response.from_cache() {
        return StepResult::Continue(Exchange::Response(request, response));
    }
    let Ok(Some((store, key))) = lookup(&request) else {
        return StepResult::Continue(Exchange::Response(request, response));
    };
    let now = SystemTime::now();

    match response.status() {
        304 => {
            let stored = store.get(&key).unwrap_or_else(|err| {
                warn!(key = %key, error = %err, "cache read failed");
                None
            });
            let Some(mut entry) = stored else {
                return StepResult::Continue(Exchange::Response(request, response));
            };
            match entry.to_response() {
                Ok(cached) => {
                    entry.stored_at = now;
                    put(store.as_ref(), &key, &entry);
                    debug!(key = %key, "not modified, serving cached response");
                    StepResult::Continue(Exchange::Response(request, cached))
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "corrupt cache entry");
                    StepResult::Continue(Exchange::Response(request, response))
                }
            }
        }
        200 => {
            let storable = response
                .header("cache-control")
                .map(crate::CacheControl::parse)
                .unwrap_or_default()
                .is_storable();
            if storable {
                put(store.as_ref(), &key, &CachedResponse::new(&response, now));
            }
            StepResult::Continue(Exchange::Response(request, response))
        }
        _ => StepResult::Continue(Exchange::Response(request, response)),
    }
}

/// The store and key for a cacheable request, `None` when caching does not apply.
fn lookup(request: &RequestContext) -> crate::Result<Option<(Arc<dyn CacheStore>, CacheKey)>> {
    if !request.options().is_cache_enabled() || !request.method().is_cacheable() {
        return Ok(None);
    }
    let store = request
        .cache_store()
        .cloned()
        .ok_or_else(|| Error::config("cache is enabled but no cache store is configured"))?;
    let Some(url) = request.url().as_absolute() else {
        return Ok(None);
    };
    let key = CacheKey::new(request.method(), url, request.headers());
    Ok(Some((store, key)))
}

fn put(store: &dyn CacheStore, key: &CacheKey, entry: &CachedResponse) {
    if let Err(err) = store.put(key, entry) {
        warn!(key = %key, error = %err, "cache write failed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::let_assert;

    use super::*;
    use crate::steps::test_support::context;
    use crate::{Headers, MemoryCacheStore, Method, Options};

    fn cached_context(store: &Arc<MemoryCacheStore>) -> RequestContext {
        context(Options::new().url("https://example.com/doc").cache(true))
            .with_cache_store(Arc::clone(store) as Arc<dyn CacheStore>)
    }

    fn key_of(request: &RequestContext) -> CacheKey {
        let url = request.url().as_absolute().expect("absolute");
        CacheKey::new(request.method(), url, request.headers())
    }

    fn stored(headers: &[(&str, &str)], age: Duration) -> CachedResponse {
        let headers: Headers = headers.iter().copied().collect();
        let response = ResponseContext::new(200, headers, "cached body");
        CachedResponse::new(&response, SystemTime::now() - age)
    }

    #[test]
    fn fresh_entry_answers_the_request() {
        let store = Arc::new(MemoryCacheStore::new());
        let request = cached_context(&store);
        let entry = stored(&[("cache-control", "max-age=600")], Duration::from_secs(10));
        store.put(&key_of(&request), &entry).expect("put");

        let result = put_if_modified_since(Exchange::Request(request));

        let_assert!(StepResult::Continue(Exchange::Response(_, response)) = result);
        assert!(response.from_cache());
        assert_eq!(response.text().expect("text"), "cached body");
    }

    #[test]
    fn stale_entry_adds_validators() {
        let store = Arc::new(MemoryCacheStore::new());
        let request = cached_context(&store);
        let entry = stored(
            &[
                ("cache-control", "max-age=60"),
                ("etag", "\"v1\""),
                ("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ],
            Duration::from_secs(120),
        );
        store.put(&key_of(&request), &entry).expect("put");

        let result = put_if_modified_since(Exchange::Request(request));

        let_assert!(StepResult::Continue(Exchange::Request(request)) = result);
        assert_eq!(request.header("if-none-match"), Some("\"v1\""));
        assert_eq!(
            request.header("if-modified-since"),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
    }

    #[test]
    fn stale_entry_without_last_modified_uses_storage_time() {
        let store = Arc::new(MemoryCacheStore::new());
        let request = cached_context(&store);
        let entry = stored(&[("cache-control", "no-cache")], Duration::ZERO);
        let expected = format_http_date(entry.stored_at);
        store.put(&key_of(&request), &entry).expect("put");

        let result = put_if_modified_since(Exchange::Request(request));

        let_assert!(StepResult::Continue(Exchange::Request(request)) = result);
        assert_eq!(request.header("if-modified-since"), Some(expected.as_str()));
        assert!(request.header("if-none-match").is_none());
    }

    #[test]
    fn not_modified_is_replaced_by_the_stored_response() {
        let store = Arc::new(MemoryCacheStore::new());
        let request = cached_context(&store);
        let key = key_of(&request);
        let entry = stored(&[("cache-control", "no-cache")], Duration::from_secs(3600));
        let old = entry.stored_at;
        store.put(&key, &entry).expect("put");

        let not_modified = ResponseContext::new(304, Headers::new(), "");
        let result = put_if_modified_since(Exchange::Response(request, not_modified));

        let_assert!(StepResult::Continue(Exchange::Response(_, response)) = result);
        assert_eq!(response.status(), 200);
        assert!(response.from_cache());
        let refreshed = store.get(&key).expect("get").expect("entry");
        assert!(refreshed.stored_at > old);
    }

    #[test]
    fn ok_responses_are_stored_unless_no_store() {
        let store = Arc::new(MemoryCacheStore::new());

        let response = ResponseContext::new(200, Headers::new(), "fresh");
        put_if_modified_since(Exchange::Response(cached_context(&store), response));
        assert_eq!(store.len(), 1);

        let store = Arc::new(MemoryCacheStore::new());
        let headers: Headers = [("Cache-Control", "private, no-store")].into_iter().collect();
        let response = ResponseContext::new(200, headers, "secret");
        put_if_modified_since(Exchange::Response(cached_context(&store), response));
        assert!(store.is_empty());

        let response = ResponseContext::new(404, Headers::new(), "missing");
        put_if_modified_since(Exchange::Response(cached_context(&store), response));
        assert!(store.is_empty());
    }

    #[test]
    fn unsafe_methods_and_disabled_cache_are_ignored() {
        let store = Arc::new(MemoryCacheStore::new());
        let post = context(
            Options::new()
                .url("https://example.com/doc")
                .method(Method::Post)
                .cache(true),
        )
        .with_cache_store(Arc::clone(&store) as Arc<dyn CacheStore>);
        let response = ResponseContext::new(200, Headers::new(), "created");
        put_if_modified_since(Exchange::Response(post, response));
        assert!(store.is_empty());

        let disabled = context(Options::new())
            .with_cache_store(Arc::clone(&store) as Arc<dyn CacheStore>);
        let response = ResponseContext::new(200, Headers::new(), "body");
        put_if_modified_since(Exchange::Response(disabled, response));
        assert!(store.is_empty());
    }

    #[test]
    fn enabled_cache_without_store_is_a_config_error() {
        let request = context(Options::new().cache(true));

        let result = put_if_modified_since(Exchange::Request(request));

        let_assert!(StepResult::Halt(Exchange::Failure(_, err)) = result);
        assert!(err.is_config());
    }
}
