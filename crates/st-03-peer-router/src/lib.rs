//! # ST-03 Peer Router - Nearby-peer retrieval tier.
//!
//! Tracks peers that hold an open registration stream, ranks them by XOR
//! distance between identifier and peer digests, and runs the bounded
//! solicitation round-trip: push a request line to the closest peers, then
//! wait on a single-resolution pending slot for whichever peer answers
//! first.
//!
//! ```text
//!   register ---> PeerRegistry --- rank ---> closest K senders
//!                                               |
//!   solicit ----> PendingRequests <--- deliver (first answer wins)
//! ```
//!
//! The tier is strictly best-effort: an empty registry, a full peer
//! channel, or a timed-out wait all surface as a miss, never an error.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod distance;
pub mod pending;
pub mod registry;
pub mod router;
pub mod wire;

pub use pending::PendingRequests;
pub use registry::PeerRegistry;
pub use router::PeerRouter;
pub use wire::PeerWire;
