//! The nearby-peer source.
//!
//! Thin adapter over the peer router: solicit the closest peers, and if
//! one answers within the window, present its archive body through the
//! common fetcher seam. Anything else is a fall-through miss.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{EdgeError, RetrievalRequest, RetrievalUpstream};
use st_03_peer_router::PeerRouter;

use crate::{buffered_body, Fetcher, UpstreamResponse};

const UPSTREAM_NAME: &str = "peer tier";

pub struct PeerTierFetcher {
    router: Arc<PeerRouter>,
}

impl PeerTierFetcher {
    pub fn new(router: Arc<PeerRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Fetcher for PeerTierFetcher {
    fn upstream(&self) -> RetrievalUpstream {
        RetrievalUpstream::PeerTier
    }

    async fn fetch(&self, request: &RetrievalRequest) -> Result<UpstreamResponse, EdgeError> {
        match self.router.solicit(&request.id, &request.transfer_id).await {
            Some(body) => Ok(UpstreamResponse {
                upstream: RetrievalUpstream::PeerTier,
                status: 200,
                headers: vec![("content-type", "application/vnd.ipld.car".to_string())],
                body: buffered_body(body),
            }),
            None => Err(EdgeError::UpstreamUnavailable {
                upstream: UPSTREAM_NAME,
                reason: "no peer answered within the window".to_string(),
            }),
        }
    }
}
