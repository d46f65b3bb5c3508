//! Request descriptors.
//!
//! A [`RequestDescriptor`] describes a pending request before it is turned
//! into a transport request. Descriptors are values: every modification
//! consumes the old descriptor and returns a new one, so interceptors can
//! never mutate a request another component still holds.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// HTTP request methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
    /// HTTP PATCH method.
    Patch,
}

impl HttpMethod {
    /// Uppercase method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Explicit null.
    Null,
}

impl ParamValue {
    /// JSON representation used for request bodies.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Null => serde_json::Value::Null,
        }
    }
}

/// Query-string rendering. `Null` renders as an empty value.
impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Which cache tiers a response may be read from and written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Bypass the cache entirely.
    None,
    /// Memory tier only.
    MemoryOnly,
    /// Disk tier only.
    DiskOnly,
    /// Both tiers.
    #[default]
    Automatic,
}

impl CachePolicy {
    /// Whether the memory tier participates.
    pub fn uses_memory(self) -> bool {
        matches!(self, Self::MemoryOnly | Self::Automatic)
    }

    /// Whether the disk tier participates.
    pub fn uses_disk(self) -> bool {
        matches!(self, Self::DiskOnly | Self::Automatic)
    }
}

/// An immutable description of a request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    endpoint: String,
    method: HttpMethod,
    headers: BTreeMap<String, String>,
    parameters: Vec<(String, ParamValue)>,
    body: Option<Bytes>,
    cache_policy: CachePolicy,
}

impl RequestDescriptor {
    /// Create a descriptor for an endpoint, either absolute or relative to the base URL.
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            headers: BTreeMap::new(),
            parameters: Vec::new(),
            body: None,
            cache_policy: CachePolicy::default(),
        }
    }

    /// GET descriptor.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    /// POST descriptor.
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    /// PUT descriptor.
    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    /// DELETE descriptor.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    /// PATCH descriptor.
    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, endpoint)
    }

    /// Return a copy with the header set. Names are stored lowercase, so a
    /// later header replaces an earlier one regardless of case.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Return a copy with the header removed.
    #[must_use]
    pub fn without_header(mut self, name: impl AsRef<str>) -> Self {
        self.headers.remove(&name.as_ref().to_ascii_lowercase());
        self
    }

    /// Return a copy with a parameter appended. Re-using a key replaces the
    /// earlier value in place.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((key, value)),
        }
        self
    }

    /// Return a copy with a raw body. A raw body takes precedence over
    /// parameters when serializing non-GET requests.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Return a copy with the given cache policy.
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Return a copy pointing at a different endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Endpoint as supplied.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Headers keyed by lowercase name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Look up a header by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parameters in insertion order.
    pub fn parameters(&self) -> &[(String, ParamValue)] {
        &self.parameters
    }

    /// Raw body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Cache policy.
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Whether the endpoint already carries a URL scheme.
    pub fn is_absolute(&self) -> bool {
        let Some((scheme, _)) = self.endpoint.split_once("://") else {
            return false;
        };
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_produce_new_values() {
        let original = RequestDescriptor::get("/home_sections");
        let decorated = original
            .clone()
            .with_header("Authorization", "Bearer abc")
            .with_param("page", 1);

        assert!(original.headers().is_empty());
        assert!(original.parameters().is_empty());
        assert_eq!(decorated.header("authorization"), Some("Bearer abc"));
        assert_eq!(decorated.parameters().len(), 1);
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let descriptor = RequestDescriptor::get("/x")
            .with_header("Accept", "text/plain")
            .with_header("ACCEPT", "application/json");
        assert_eq!(descriptor.headers().len(), 1);
        assert_eq!(descriptor.header("accept"), Some("application/json"));

        let descriptor = descriptor.without_header("Accept");
        assert!(descriptor.header("accept").is_none());
    }

    #[test]
    fn test_param_order_and_replacement() {
        let descriptor = RequestDescriptor::get("/search")
            .with_param("q", "tide")
            .with_param("page", 1)
            .with_param("q", "ocean");

        let keys: Vec<_> = descriptor.parameters().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["q", "page"]);
        assert_eq!(descriptor.parameters()[0].1, ParamValue::from("ocean"));
    }

    #[test]
    fn test_param_rendering() {
        assert_eq!(ParamValue::from(3).to_string(), "3");
        assert_eq!(ParamValue::from(true).to_string(), "true");
        assert_eq!(ParamValue::from(1.5).to_string(), "1.5");
        assert_eq!(ParamValue::from(None::<i64>).to_string(), "");
        assert_eq!(ParamValue::from(2).to_json(), serde_json::json!(2));
        assert_eq!(ParamValue::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_absolute_detection() {
        assert!(RequestDescriptor::get("https://cdn.example.com/a").is_absolute());
        assert!(RequestDescriptor::get("http://localhost:1234").is_absolute());
        assert!(!RequestDescriptor::get("/home_sections").is_absolute());
        assert!(!RequestDescriptor::get("search?next=http://x").is_absolute());
        assert!(!RequestDescriptor::get("://missing").is_absolute());
    }

    #[test]
    fn test_cache_policy_tiers() {
        assert!(CachePolicy::Automatic.uses_memory() && CachePolicy::Automatic.uses_disk());
        assert!(CachePolicy::MemoryOnly.uses_memory() && !CachePolicy::MemoryOnly.uses_disk());
        assert!(!CachePolicy::DiskOnly.uses_memory() && CachePolicy::DiskOnly.uses_disk());
        assert!(!CachePolicy::None.uses_memory() && !CachePolicy::None.uses_disk());
    }
}
