//! Ordered, case-insensitive header multi-map and structured header values.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// IMF-fixdate format used for HTTP dates.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Ordered multi-map of header lines.
///
/// Names compare case-insensitively and keep the spelling they were inserted
/// with. Insertion order is preserved, and a name may appear several times.
///
/// # Example
///
/// ```
/// use sluice_core::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Accept", "text/html");
/// headers.append("accept", "application/json");
///
/// assert_eq!(headers.get("ACCEPT"), Some("text/html"));
/// assert_eq!(headers.get_all("accept").count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// First value for a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values for a name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether at least one value exists for a name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Replaces every value of `name` with a single `value`.
    ///
    /// The new line takes the position of the first existing occurrence, or
    /// goes last when the name is new.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let position = self
            .entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(&name));

        match position {
            Some(index) => {
                self.entries
                    .retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
                let index = index.min(self.entries.len());
                self.entries.insert(index, (name, value));
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Sets `name` only when it is absent.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    /// Adds a value, keeping existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes every value for a name. Returns `true` if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    /// Lower-cases every header name in place.
    pub fn normalize_names(&mut self) {
        for (key, _) in &mut self.entries {
            key.make_ascii_lowercase();
        }
    }

    /// Iterates `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is no header line.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<K, V> Extend<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.entries.extend(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
    }
}

/// A header value before wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// Sent as-is.
    Text(String),
    /// Joined with `", "`.
    List(Vec<String>),
    /// Decimal representation.
    Integer(i64),
    /// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    Date(SystemTime),
}

impl HeaderValue {
    /// Wire representation of the value.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::List(values) => values
                .iter()
                .map(|value| value.trim())
                .collect::<Vec<_>>()
                .join(", "),
            Self::Integer(value) => value.to_string(),
            Self::Date(time) => format_http_date(*time),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<&[&str]> for HeaderValue {
    fn from(values: &[&str]) -> Self {
        Self::List(values.iter().map(ToString::to_string).collect())
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for HeaderValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Text(value.to_string()), Self::Integer)
    }
}

impl From<SystemTime> for HeaderValue {
    fn from(value: SystemTime) -> Self {
        Self::Date(value)
    }
}

/// Formats a time as an HTTP date (IMF-fixdate).
#[must_use]
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format(HTTP_DATE_FORMAT)
        .to_string()
}

/// Parses an HTTP date (IMF-fixdate or RFC 2822).
#[must_use]
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| SystemTime::from(date.with_timezone(&Utc)))
}
