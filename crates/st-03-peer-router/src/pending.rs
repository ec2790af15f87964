//! Single-resolution pending store for in-flight solicitations.
//!
//! Each open slot holds the sender half of a oneshot channel keyed by the
//! canonical identifier. Resolution removes the slot before sending, so a
//! second answer for the same identifier finds nothing to resolve and is
//! discarded.

use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

struct PendingSlot {
    sender: oneshot::Sender<Bytes>,
    opened_at: Instant,
}

/// Concurrent map of awaited peer answers.
#[derive(Default)]
pub struct PendingRequests {
    slots: DashMap<String, PendingSlot>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `canonical_id`, returning the receiver the solicit
    /// side awaits. An already-open slot for the same identifier is
    /// replaced; its old waiter observes a closed channel.
    pub fn open(&self, canonical_id: &str) -> oneshot::Receiver<Bytes> {
        let (sender, receiver) = oneshot::channel();
        let slot = PendingSlot {
            sender,
            opened_at: Instant::now(),
        };
        if self.slots.insert(canonical_id.to_string(), slot).is_some() {
            debug!(cid = canonical_id, "replaced pending slot");
        }
        receiver
    }

    /// Resolve a slot with a delivered archive body. Returns whether a
    /// waiter consumed it; late or duplicate answers return `false`.
    pub fn resolve(&self, canonical_id: &str, body: Bytes) -> bool {
        // remove first so concurrent resolvers race on the map, not the channel
        match self.slots.remove(canonical_id) {
            Some((_, slot)) => {
                trace!(
                    cid = canonical_id,
                    waited_ms = slot.opened_at.elapsed().as_millis() as u64,
                    "pending slot resolved"
                );
                slot.sender.send(body).is_ok()
            }
            None => false,
        }
    }

    /// Discard a slot whose waiter gave up. Returns whether one existed.
    pub fn cancel(&self, canonical_id: &str) -> bool {
        self.slots.remove(canonical_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_exactly_once() {
        let pending = PendingRequests::new();
        let receiver = pending.open("bafyone");
        assert!(pending.resolve("bafyone", Bytes::from_static(b"first")));
        assert!(!pending.resolve("bafyone", Bytes::from_static(b"second")));
        assert_eq!(receiver.await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn resolve_without_open_is_discarded() {
        let pending = PendingRequests::new();
        assert!(!pending.resolve("bafynone", Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn reopening_replaces_the_old_waiter() {
        let pending = PendingRequests::new();
        let stale = pending.open("bafyone");
        let fresh = pending.open("bafyone");
        assert_eq!(pending.len(), 1);
        assert!(pending.resolve("bafyone", Bytes::from_static(b"body")));
        assert!(stale.await.is_err());
        assert_eq!(fresh.await.unwrap(), Bytes::from_static(b"body"));
    }

    #[tokio::test]
    async fn cancel_clears_the_slot() {
        let pending = PendingRequests::new();
        let _receiver = pending.open("bafyone");
        assert!(pending.cancel("bafyone"));
        assert!(!pending.resolve("bafyone", Bytes::from_static(b"late")));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn concurrent_resolvers_deliver_a_single_body() {
        use std::sync::Arc;
        let pending = Arc::new(PendingRequests::new());
        let receiver = pending.open("bafyone");

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let pending = Arc::clone(&pending);
            handles.push(tokio::spawn(async move {
                pending.resolve("bafyone", Bytes::from(vec![i]))
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(receiver.await.unwrap().len(), 1);
    }
}
