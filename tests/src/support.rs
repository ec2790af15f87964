//! Builders and doubles shared by the end-to-end flows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use shared_types::{EdgeError, NodeConfig, RetrievalRequest, RetrievalUpstream};
use st_01_car_codec::domain::CODEC_RAW;
use st_01_car_codec::encode::{encode_block, encode_header};
use st_02_block_cache::BlockCache;
use st_03_peer_router::PeerRouter;
use st_04_fetchers::{Fetcher, UpstreamResponse, UsageReporter};
use st_05_gateway::AppState;

/// An in-process source that records how often it was consulted and
/// serves a fixed archive body.
pub struct StubSource {
    upstream: RetrievalUpstream,
    calls: AtomicUsize,
    body: Bytes,
}

impl StubSource {
    pub fn new(upstream: RetrievalUpstream, body: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            calls: AtomicUsize::new(0),
            body: Bytes::from(body),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubSource {
    fn upstream(&self) -> RetrievalUpstream {
        self.upstream
    }

    async fn fetch(&self, _request: &RetrievalRequest) -> Result<UpstreamResponse, EdgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(UpstreamResponse {
            upstream: self.upstream,
            status: 200,
            headers: Vec::new(),
            body: Box::pin(futures::stream::iter([Ok(self.body.clone())])),
        })
    }
}

/// Components behind one router-level test.
pub struct TestNode {
    pub state: AppState,
    pub cache: Arc<BlockCache>,
    pub peers: Arc<PeerRouter>,
}

/// Assemble gateway state around the given sources.
pub fn test_node(config: NodeConfig, sources: Vec<Arc<dyn Fetcher>>) -> TestNode {
    let config = Arc::new(config);
    let cache = Arc::new(BlockCache::new(config.block_cache_bytes));
    let peers = Arc::new(PeerRouter::new(&config));
    let state = AppState::new(
        config,
        Arc::clone(&cache),
        Arc::clone(&peers),
        sources,
        UsageReporter::disabled(),
    )
    .expect("fixture construction");
    TestNode {
        state,
        cache,
        peers,
    }
}

/// A raw block and its identifier.
pub fn raw_block(payload: &[u8]) -> (Cid, Vec<u8>) {
    (
        Cid::new_v1(CODEC_RAW, Code::Sha2_256.digest(payload)),
        payload.to_vec(),
    )
}

/// Assemble an archive from already-identified entries.
pub fn car_bytes(roots: &[Cid], entries: &[(Cid, &[u8])]) -> Vec<u8> {
    let mut bytes = encode_header(roots).expect("header encoding").to_vec();
    for (cid, payload) in entries {
        bytes.extend_from_slice(&encode_block(cid, payload));
    }
    bytes
}
