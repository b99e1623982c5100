//! Request and response bodies, and serialization helpers.

use bytes::Bytes;

use crate::{Form, Result};

/// Content type for encoded bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Form URL-encoded content type (`application/x-www-form-urlencoded`).
    FormUrlEncoded,
    /// Plain text content type (`text/plain; charset=utf-8`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// Classify a `content-type` header value, ignoring parameters.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" => Some(Self::Json),
            _ if essence.starts_with("application/") && essence.ends_with("+json") => {
                Some(Self::Json)
            }
            "application/x-www-form-urlencoded" => Some(Self::FormUrlEncoded),
            "text/plain" => Some(Self::PlainText),
            "application/octet-stream" => Some(Self::OctetStream),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Request Body
// ============================================================================

/// Body of a request, raw or waiting for the `encode_body` step.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Already encoded, sent as-is.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// JSON document.
    Json(serde_json::Value),
    /// Form fields, in order.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` parts.
    Multipart(Form),
}

impl RequestBody {
    /// Build a JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Build a form body from any serializable value.
    ///
    /// Uses `serde_html_form`, so `Vec<T>` fields become repeated pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if form serialization fails.
    pub fn form<T: serde::Serialize>(value: &T) -> Result<Self> {
        let encoded = serde_html_form::to_string(value)?;
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(&encoded)
            .map_err(|e| crate::Error::config(format!("form serialization error: {e}")))?;
        Ok(Self::Form(pairs))
    }

    /// The raw bytes, when the body is already encoded.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Whether the body still needs encoding.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        !matches!(self, Self::Bytes(_))
    }

    /// Encode into bytes plus the matching `content-type` value.
    ///
    /// Raw bytes come back unchanged, without a content type.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(self) -> Result<(Option<String>, Bytes)> {
        match self {
            Self::Bytes(bytes) => Ok((None, bytes)),
            Self::Text(text) => Ok((
                Some(ContentType::PlainText.as_str().to_string()),
                Bytes::from(text),
            )),
            Self::Json(value) => Ok((Some(ContentType::Json.as_str().to_string()), to_json(&value)?)),
            Self::Form(pairs) => Ok((
                Some(ContentType::FormUrlEncoded.as_str().to_string()),
                to_form(&pairs)?,
            )),
            Self::Multipart(form) => {
                let (content_type, body) = form.into_body();
                Ok((Some(content_type), body))
            }
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Form> for RequestBody {
    fn from(form: Form) -> Self {
        Self::Multipart(form)
    }
}

// ============================================================================
// Response Body
// ============================================================================

/// Body of a response, raw or decoded by the `decode_body` step.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Bytes as received (possibly decompressed).
    Bytes(Bytes),
    /// Structured value produced by a decoder.
    Decoded(serde_json::Value),
}

impl ResponseBody {
    /// The raw bytes, if the body was not decoded.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Decoded(_) => None,
        }
    }

    /// The decoded value, if a decoder ran.
    #[must_use]
    pub const fn as_decoded(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }

    /// Whether the body holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Decoded(value) => value.is_null(),
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::Bytes(Bytes::new())
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<serde_json::Value> for ResponseBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Decoded(value)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// # Example
///
/// ```
/// use sluice_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { name: String }
///
/// let user = User { name: "Alice".to_string() };
/// let bytes = to_json(&user).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"Alice"}"#);
/// ```
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Serialize a value to form URL-encoded bytes.
///
/// # Errors
///
/// Returns an error if form serialization fails.
///
/// # Example
///
/// ```
/// use sluice_core::to_form;
///
/// let pairs = vec![("username", "alice"), ("password", "s3cret")];
/// let bytes = to_form(&pairs).expect("serialize");
/// assert_eq!(bytes.as_ref(), b"username=alice&password=s3cret");
/// ```
pub fn to_form<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_html_form::to_string(value)
        .map(|s| Bytes::from(s.into_bytes()))
        .map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns a decode error naming the path of the offending field
/// (e.g. `user.address.city`).
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::decode(format!(
            "JSON deserialization error at '{}': {}",
            e.path(),
            e.inner()
        ))
    })
}
