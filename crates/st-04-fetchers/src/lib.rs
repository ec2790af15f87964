//! # ST-04 Fetchers - Upstream retrieval strategies.
//!
//! Three interchangeable sources behind one [`Fetcher`] seam:
//!
//! - nearby-peer tier (solicitation through the peer router),
//! - the content-retrieval service, with query translation into its
//!   scope vocabulary,
//! - the public gateway fallback, plain reverse-proxy semantics.
//!
//! Every fetcher yields an [`UpstreamResponse`] whose body is an unverified
//! byte stream; cryptographic verification happens downstream in the
//! codec, never here. Misses and upstream failures come back as fall-through
//! errors so the caller can try the next source in its order.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod gateway;
pub mod headers;
pub mod peer;
pub mod report;
pub mod retrieval_service;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use shared_types::{EdgeError, RetrievalRequest, RetrievalUpstream};

pub use gateway::PublicGatewayFetcher;
pub use peer::PeerTierFetcher;
pub use report::UsageReporter;
pub use retrieval_service::RetrievalServiceFetcher;

/// Unverified body bytes from an upstream.
pub type BodyStream = BoxStream<'static, Result<Bytes, EdgeError>>;

/// What a fetcher hands back on success.
pub struct UpstreamResponse {
    /// Which source produced this response.
    pub upstream: RetrievalUpstream,
    /// Upstream status to relay (200, or 304 for conditional hits).
    pub status: u16,
    /// Allow-listed response headers to relay, in order.
    pub headers: Vec<(&'static str, String)>,
    /// The (unverified) body.
    pub body: BodyStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("upstream", &self.upstream)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// One upstream retrieval strategy.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn upstream(&self) -> RetrievalUpstream;

    /// Retrieve the requested content. Errors where
    /// [`EdgeError::is_fall_through`] holds mean "try the next source".
    async fn fetch(&self, request: &RetrievalRequest) -> Result<UpstreamResponse, EdgeError>;
}

/// Wrap a fully-buffered body as a single-chunk stream.
pub(crate) fn buffered_body(bytes: Bytes) -> BodyStream {
    Box::pin(futures::stream::iter([Ok(bytes)]))
}

/// Adapt a reqwest body stream, folding client-side timeouts into the
/// timeout error so the overall deadline covers the full body transfer.
pub(crate) fn http_body(
    response: reqwest::Response,
    upstream_name: &'static str,
) -> BodyStream {
    use futures::StreamExt;
    Box::pin(response.bytes_stream().map(move |item| {
        item.map_err(|e| {
            if e.is_timeout() {
                EdgeError::UpstreamTimeout {
                    upstream: upstream_name,
                }
            } else {
                EdgeError::UpstreamUnavailable {
                    upstream: upstream_name,
                    reason: e.to_string(),
                }
            }
        })
    }))
}

/// Map a reqwest transport error at request time.
pub(crate) fn transport_error(e: reqwest::Error, upstream_name: &'static str) -> EdgeError {
    if e.is_timeout() {
        EdgeError::UpstreamTimeout {
            upstream: upstream_name,
        }
    } else {
        EdgeError::UpstreamUnavailable {
            upstream: upstream_name,
            reason: e.to_string(),
        }
    }
}
