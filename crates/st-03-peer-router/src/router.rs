//! Solicitation round-trip tying the registry and pending store together.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use shared_types::{ContentId, NodeConfig};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::pending::PendingRequests;
use crate::registry::PeerRegistry;
use crate::wire::{PeerWire, Solicitation};

/// Peers contacted per solicitation.
const DEFAULT_FANOUT: usize = 3;

/// Front door of the nearby-peer tier.
pub struct PeerRouter {
    registry: Arc<PeerRegistry>,
    pending: Arc<PendingRequests>,
    fanout: usize,
    wait: Duration,
    fire_and_forget: bool,
}

impl PeerRouter {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            registry: Arc::new(PeerRegistry::new()),
            pending: Arc::new(PendingRequests::new()),
            fanout: config.solicitation_fanout.max(1),
            wait: config.solicitation_timeout,
            fire_and_forget: config.peer_fire_and_forget,
        }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Push a solicitation line to the closest peers and wait for the first
    /// answer. Returns `None` on timeout, on fire-and-forget deployments,
    /// and on every other flavor of miss.
    ///
    /// The wait runs even when no peer is currently registered: a peer may
    /// connect and answer inside the window.
    pub async fn solicit(&self, id: &ContentId, transfer_id: &str) -> Option<Bytes> {
        // slot opens before any peer hears about the request, so even an
        // instant answer finds a waiter
        let receiver = if self.fire_and_forget {
            None
        } else {
            Some(self.pending.open(id.canonical()))
        };

        let targets = self.registry.closest(id.canonical(), self.fanout);
        let line = PeerWire::Solicit(Solicitation {
            request_id: transfer_id.to_string(),
            root: id.canonical().to_string(),
        });
        let mut contacted = 0usize;
        for sender in &targets {
            // a full channel means the peer is not keeping up; skip it
            if sender.try_send(line.clone()).is_ok() {
                contacted += 1;
            }
        }
        trace!(cid = %id, contacted, "solicited nearby peers");

        let receiver = match receiver {
            Some(receiver) => receiver,
            None => return None,
        };
        match timeout(self.wait, receiver).await {
            Ok(Ok(body)) => {
                debug!(cid = %id, bytes = body.len(), "peer answered solicitation");
                Some(body)
            }
            Ok(Err(_)) => {
                // slot replaced by a newer request for the same identifier
                debug!(cid = %id, "solicitation superseded");
                None
            }
            Err(_) => {
                if self.pending.cancel(id.canonical()) {
                    trace!(cid = %id, "solicitation timed out");
                }
                None
            }
        }
    }

    /// Hand a peer-delivered archive body to whoever is waiting for it.
    /// Returns whether a waiter consumed the delivery.
    pub fn deliver(&self, id: &ContentId, body: Bytes) -> bool {
        let consumed = self.pending.resolve(id.canonical(), body);
        if !consumed {
            warn!(cid = %id, "discarding unsolicited or duplicate delivery");
        }
        consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const SAMPLE_V1: &str = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";

    fn router() -> PeerRouter {
        PeerRouter::new(&NodeConfig::for_tests())
    }

    #[tokio::test]
    async fn delivery_resolves_an_open_solicitation() {
        let router = Arc::new(router());
        let id = ContentId::parse(SAMPLE_V1).unwrap();

        let waiter = {
            let router = Arc::clone(&router);
            let id = id.clone();
            tokio::spawn(async move { router.solicit(&id, "transfer-1").await })
        };
        // let the solicit side open its pending slot
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(router.deliver(&id, Bytes::from_static(b"car bytes")));
        assert_eq!(waiter.await.unwrap(), Some(Bytes::from_static(b"car bytes")));
    }

    #[tokio::test]
    async fn unanswered_solicitation_waits_out_the_window() {
        let router = router();
        let id = ContentId::parse(SAMPLE_V1).unwrap();
        let started = Instant::now();
        assert_eq!(router.solicit(&id, "transfer-1").await, None);
        // for_tests() configures a 200ms window
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_discarded() {
        let router = Arc::new(router());
        let id = ContentId::parse(SAMPLE_V1).unwrap();

        let waiter = {
            let router = Arc::clone(&router);
            let id = id.clone();
            tokio::spawn(async move { router.solicit(&id, "transfer-1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(router.deliver(&id, Bytes::from_static(b"first")));
        assert!(!router.deliver(&id, Bytes::from_static(b"second")));
        assert_eq!(waiter.await.unwrap(), Some(Bytes::from_static(b"first")));
    }

    #[tokio::test]
    async fn fire_and_forget_returns_without_waiting() {
        let mut config = NodeConfig::for_tests();
        config.peer_fire_and_forget = true;
        let router = PeerRouter::new(&config);
        let id = ContentId::parse(SAMPLE_V1).unwrap();

        let started = Instant::now();
        assert_eq!(router.solicit(&id, "transfer-1").await, None);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn solicitation_lines_reach_registered_peers() {
        let router = router();
        let id = ContentId::parse(SAMPLE_V1).unwrap();
        let mut registration = router.registry().register("peer-a");

        let _ = router.solicit(&id, "transfer-1").await;
        match registration.receiver.try_recv().unwrap() {
            PeerWire::Solicit(solicitation) => {
                assert_eq!(solicitation.request_id, "transfer-1");
                assert_eq!(solicitation.root, id.canonical());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
