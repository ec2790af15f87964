//! Shared per-process state handed to every handler.

use std::sync::Arc;

use shared_types::NodeConfig;
use st_02_block_cache::BlockCache;
use st_03_peer_router::PeerRouter;
use st_04_fetchers::{Fetcher, UsageReporter};

use crate::fixture::TestFixture;

/// Everything the handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub cache: Arc<BlockCache>,
    pub peers: Arc<PeerRouter>,
    /// Retrieval sources in fall-through order.
    pub sources: Arc<Vec<Arc<dyn Fetcher>>>,
    pub reporter: UsageReporter,
    pub fixture: Arc<TestFixture>,
}

impl AppState {
    /// Wire up state from already-built components.
    pub fn new(
        config: Arc<NodeConfig>,
        cache: Arc<BlockCache>,
        peers: Arc<PeerRouter>,
        sources: Vec<Arc<dyn Fetcher>>,
        reporter: UsageReporter,
    ) -> Result<Self, shared_types::EdgeError> {
        Ok(Self {
            config,
            cache,
            peers,
            sources: Arc::new(sources),
            reporter,
            fixture: Arc::new(TestFixture::build()?),
        })
    }
}
