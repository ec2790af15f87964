//! Registry of peers holding an open registration stream.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::distance::{seed, xor_distance, DistanceSeed};
use crate::wire::PeerWire;

/// Outbound messages buffered per peer before solicitations start dropping.
const PEER_CHANNEL_CAPACITY: usize = 32;

struct ConnectedPeer {
    sender: mpsc::Sender<PeerWire>,
    seed: DistanceSeed,
    generation: u64,
}

/// Handle identifying one registration of one peer.
pub struct Registration {
    pub receiver: mpsc::Receiver<PeerWire>,
    generation: u64,
}

/// Live peer connections, keyed by peer id.
///
/// A repeated registration for the same id replaces the previous one: the
/// old channel closes when its sender drops here, which ends the stale
/// stream handler exactly once.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<String, ConnectedPeer>,
    generations: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a peer, handing back the receiving end of its message stream.
    pub fn register(&self, peer_id: &str) -> Registration {
        let (sender, receiver) = mpsc::channel(PEER_CHANNEL_CAPACITY);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let peer = ConnectedPeer {
            sender,
            seed: seed(peer_id),
            generation,
        };
        if self.peers.insert(peer_id.to_string(), peer).is_some() {
            debug!(peer = peer_id, "replaced existing registration");
        } else {
            debug!(peer = peer_id, connected = self.peers.len(), "peer registered");
        }
        Registration {
            receiver,
            generation,
        }
    }

    /// Drop a peer whose stream ended. A registration that has already been
    /// replaced keeps the newer entry.
    pub fn deregister(&self, peer_id: &str, registration: &Registration) {
        self.peers
            .remove_if(peer_id, |_, peer| peer.generation == registration.generation);
    }

    /// Whether a peer currently holds a live registration.
    pub fn is_registered(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Senders for the `k` peers closest to `target` in XOR distance.
    pub fn closest(&self, target: &str, k: usize) -> Vec<mpsc::Sender<PeerWire>> {
        let target_seed = seed(target);
        let mut ranked: Vec<(DistanceSeed, mpsc::Sender<PeerWire>)> = self
            .peers
            .iter()
            .map(|entry| {
                (
                    xor_distance(&entry.seed, &target_seed),
                    entry.sender.clone(),
                )
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        ranked.into_iter().take(k).map(|(_, s)| s).collect()
    }
}
