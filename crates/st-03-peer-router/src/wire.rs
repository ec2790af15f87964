//! Newline-delimited JSON lines pushed down a peer's registration stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One solicitation line. The peer fetches `root` and posts the archive
/// back under the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solicitation {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub root: String,
}

/// Messages written to a registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerWire {
    /// Bare newline proving the stream is still alive.
    KeepAlive,
    Solicit(Solicitation),
}

impl PeerWire {
    /// Wire encoding: one line per message, always newline-terminated.
    ///
    /// A solicitation that fails to serialize degrades to a keep-alive
    /// line instead of tearing the stream down.
    pub fn encode(&self) -> Bytes {
        match self {
            PeerWire::KeepAlive => Bytes::from_static(b"\n"),
            PeerWire::Solicit(solicitation) => match serde_json::to_vec(solicitation) {
                Ok(mut line) => {
                    line.push(b'\n');
                    Bytes::from(line)
                }
                Err(_) => Bytes::from_static(b"\n"),
            },
        }
    }
}
