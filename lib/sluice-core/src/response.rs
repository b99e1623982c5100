//! HTTP response handling.
//!
//! [`ResponseContext`] is produced by the adapter or by a short-circuiting
//! step (a cache hit), then transformed by the response steps.
//!
//! # Example
//!
//! ```
//! use sluice_core::{Headers, ResponseContext};
//!
//! let response = ResponseContext::new(200, Headers::new(), r#"{"id":1}"#);
//! let value: serde_json::Value = response.json().expect("json");
//! assert_eq!(value["id"], 1);
//! ```

use bytes::Bytes;

use crate::{Error, Headers, ResponseBody, Result};

/// HTTP response with status, headers, and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    status: u16,
    headers: Headers,
    body: ResponseBody,
    from_cache: bool,
}

impl ResponseContext {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: impl Into<ResponseBody>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            from_cache: false,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
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

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<ResponseBody>) {
        self.body = body.into();
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Whether the response was served by the cache store.
    #[must_use]
    pub const fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Mark the response as served by the cache store.
    #[must_use]
    pub const fn cached(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 3xx.
    #[must_use]
    pub const fn is_redirection(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Deserialize the body, decoded or raw JSON.
    ///
    /// # Errors
    ///
    /// Returns a decode error naming the offending path.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            ResponseBody::Bytes(bytes) => crate::from_json(bytes),
            ResponseBody::Decoded(value) => serde_path_to_error::deserialize(value.clone())
                .map_err(|e| {
                    Error::decode(format!(
                        "JSON deserialization error at '{}': {}",
                        e.path(),
                        e.inner()
                    ))
                }),
        }
    }

    /// Body as text. A decoded body is rendered back to JSON.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the body is not valid UTF-8.
    pub fn text(&self) -> Result<String> {
        match &self.body {
            ResponseBody::Bytes(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::decode(format!("invalid UTF-8 body: {e}"))),
            ResponseBody::Decoded(value) => Ok(value.to_string()),
        }
    }

    /// Body as bytes. A decoded body is rendered back to JSON.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        match &self.body {
            ResponseBody::Bytes(bytes) => bytes.clone(),
            ResponseBody::Decoded(value) => Bytes::from(value.to_string()),
        }
    }
}
