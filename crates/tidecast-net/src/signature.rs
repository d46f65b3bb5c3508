//! Request signatures used as cache keys.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::request::HttpMethod;

/// Digest of a request's shape: method, full URL, headers and body.
///
/// Headers are folded in sorted by lowercase name, so logically equal header
/// sets always produce the same signature. Two requests differing in any of
/// the four components never share a signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestSignature(String);

impl RequestSignature {
    /// Compute the signature of a request.
    pub fn compute(
        method: HttpMethod,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&[u8]>,
    ) -> Self {
        let body_digest = Sha256::digest(body.unwrap_or_default());

        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        // BTreeMap iterates in key order; keys are lowercase already
        for (name, value) in headers {
            hasher.update(name.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(value.trim().as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(b"\n");
        hasher.update(body_digest);

        Self(hex::encode(hasher.finalize()))
    }

    /// Build a signature from an already computed key, e.g. a file stem.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex representation, safe for use as a file name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
