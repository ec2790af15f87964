//! Request parsing and admission policy.
//!
//! Everything later stages need is extracted here into one immutable
//! [`RetrievalRequest`]; a request that fails to parse is rejected before
//! any network call.

use std::collections::HashMap;

use axum::http::HeaderMap;
use shared_types::{
    ByteRange, ContentId, DagDepth, EdgeError, ResponseFormat, RetrievalRequest,
};
use st_01_car_codec::domain::{codec_supported, multihash_supported};
use uuid::Uuid;

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse one inbound retrieval request.
///
/// Policy: a request for exactly the namespace root carrying a
/// `Service-Worker: script` header is refused. A service worker registered
/// at `/ipfs/` would scope itself over every object on the host.
pub fn parse_request(
    cid: &str,
    sub_path: Option<String>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<RetrievalRequest, EdgeError> {
    let sub_path = sub_path.filter(|p| !p.is_empty());
    if sub_path.is_none() && header(headers, "service-worker") == Some("script") {
        return Err(EdgeError::PolicyRejected(
            "service worker registration at the namespace root".to_string(),
        ));
    }

    let id = ContentId::parse(cid)?;
    // content outside the verifier's codec/hash tables can never be served
    if !codec_supported(id.codec()) {
        return Err(EdgeError::NotImplemented(format!(
            "codec 0x{:x}",
            id.codec()
        )));
    }
    if !multihash_supported(id.hash_code()) {
        return Err(EdgeError::NotImplemented(format!(
            "multihash 0x{:x}",
            id.hash_code()
        )));
    }

    let format = ResponseFormat::resolve(
        query.get("format").map(String::as_str),
        header(headers, "accept"),
    );

    Ok(RetrievalRequest {
        id,
        sub_path,
        format,
        range: header(headers, "range").and_then(ByteRange::parse),
        filename: query.get("filename").cloned(),
        depth: query.get("depth").and_then(|d| DagDepth::parse(d)),
        cache_control: header(headers, "cache-control").map(str::to_string),
        if_none_match: header(headers, "x-if-none-match").map(str::to_string),
        transfer_id: Uuid::new_v4().to_string(),
    })
}
