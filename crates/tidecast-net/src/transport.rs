//! Transport layer: building the wire request and sending it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{NetworkError, Result};
use crate::request::{HttpMethod, RequestDescriptor};
use crate::response::RawResponse;
use crate::signature::RequestSignature;

const JSON: &str = "application/json";

/// A request ready for the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Fully resolved URL including the query string.
    pub url: Url,
    /// Headers keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    /// Serialized body.
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Resolve a descriptor against a base URL.
    ///
    /// Absolute endpoints are used verbatim. GET parameters become the query
    /// string; for other methods they become a JSON object body unless the
    /// descriptor carries a raw body. `Content-Type` and `Accept` default to
    /// JSON and can be overridden by the descriptor's headers.
    pub fn build(descriptor: &RequestDescriptor, base_url: &str) -> Result<Self> {
        let mut url = resolve_url(descriptor, base_url)?;

        let mut headers = BTreeMap::from([
            ("accept".to_string(), JSON.to_string()),
            ("content-type".to_string(), JSON.to_string()),
        ]);
        for (name, value) in descriptor.headers() {
            http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NetworkError::Encoding(format!("header name {name:?}: {e}")))?;
            http::HeaderValue::from_str(value)
                .map_err(|e| NetworkError::Encoding(format!("header {name}: {e}")))?;
            headers.insert(name.clone(), value.clone());
        }

        let params = descriptor.parameters();
        let body = match descriptor.method() {
            HttpMethod::Get => {
                if !params.is_empty() {
                    let mut pairs = url.query_pairs_mut();
                    for (key, value) in params {
                        pairs.append_pair(key, &value.to_string());
                    }
                }
                descriptor.body().cloned()
            }
            _ => match descriptor.body() {
                Some(body) => Some(body.clone()),
                None if params.is_empty() => None,
                None => {
                    let object: serde_json::Map<String, serde_json::Value> = params
                        .iter()
                        .map(|(key, value)| (key.clone(), value.to_json()))
                        .collect();
                    let encoded = serde_json::to_vec(&object)
                        .map_err(|e| NetworkError::Encoding(e.to_string()))?;
                    Some(Bytes::from(encoded))
                }
            },
        };

        Ok(Self {
            method: descriptor.method(),
            url,
            headers,
            body,
        })
    }

    /// Cache signature of this request.
    pub fn signature(&self) -> RequestSignature {
        RequestSignature::compute(
            self.method,
            self.url.as_str(),
            &self.headers,
            self.body.as_deref(),
        )
    }
}

/// Resolve the descriptor's endpoint to an absolute URL, without parameters.
pub(crate) fn resolve_url(descriptor: &RequestDescriptor, base_url: &str) -> Result<Url> {
    let raw = if descriptor.is_absolute() {
        descriptor.endpoint().to_string()
    } else {
        let endpoint = descriptor.endpoint();
        let base = base_url.trim_end_matches('/');
        if endpoint.is_empty() {
            base.to_string()
        } else if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    };
    Url::parse(&raw).map_err(|e| NetworkError::InvalidUrl(format!("{raw}: {e}")))
}

/// Something that can send a [`TransportRequest`].
///
/// Implementations report non-2xx statuses as ordinary responses; only
/// failures to obtain a response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and read the full body.
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse>;
}

/// Transport backed by a `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client honoring the configured timeout and user agent.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse> {
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url.clone());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes().await?;

        Ok(RawResponse::new(status, headers, url, body))
    }
}
