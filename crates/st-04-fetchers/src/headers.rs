//! Header translation at the upstream boundary.
//!
//! Responses relay a fixed allow-list, never the upstream's full header
//! set; requests forward only the client hints an upstream gateway
//! understands.

use reqwest::header::HeaderMap;

/// Response headers relayed from an upstream gateway, in relay order.
pub const RESPONSE_ALLOW_LIST: [&str; 12] = [
    "content-disposition",
    "content-type",
    "content-length",
    "cache-control",
    "etag",
    "last-modified",
    "location",
    "x-ipfs-path",
    "x-ipfs-roots",
    "x-ipfs-datasize",
    "x-content-type-options",
    "accept-ranges",
];

/// Filter an upstream response's headers down to the allow-list.
pub fn passthrough_response_headers(upstream: &HeaderMap) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    for name in RESPONSE_ALLOW_LIST {
        if let Some(value) = upstream.get(name).and_then(|v| v.to_str().ok()) {
            out.push((name, value.to_string()));
        }
    }
    out
}

/// Cache directive set on verified success. Content-addressed responses
/// never change for a given identifier.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=29030400, immutable";
