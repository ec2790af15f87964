//! External collaborator interfaces.
//!
//! The control-plane registration service and the usage-log ingestor live
//! outside this node. The node consumes them through these traits;
//! `node-runtime` provides the HTTP implementations and tests substitute
//! doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::EdgeError;

/// Which source served (or attempted) a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalUpstream {
    PeerTier,
    RetrievalService,
    PublicGateway,
    BlockCache,
    LocalFixture,
}

/// One usage record, reported fire-and-forget after a fetch completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRecord {
    /// Canonical identifier requested.
    pub cid: String,
    /// Source that handled the fetch.
    pub upstream: RetrievalUpstream,
    /// Final status the client saw.
    pub status: u16,
    /// Time to first byte, when a body was produced.
    pub ttfb_ms: Option<u64>,
    /// Bytes delivered to the client.
    pub bytes_sent: u64,
    /// Wall-clock duration of the whole fetch.
    pub duration_ms: u64,
}

/// Usage-record ingestion. Submissions must never block the response path;
/// callers queue records and a background task drains the queue through this
/// trait.
#[async_trait]
pub trait LogIngestor: Send + Sync {
    async fn submit(&self, batch: Vec<RetrievalRecord>) -> Result<(), EdgeError>;
}

/// Hardware/bandwidth requirements the control plane imposes before
/// admitting a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRequirements {
    pub min_cpu_cores: u32,
    pub min_memory_gb: u32,
    pub min_disk_gb: u32,
}

/// Capability snapshot sent during registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStats {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
}

/// Bearer token returned on successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub token: String,
}

/// Control-plane registration service.
#[async_trait]
pub trait RegistrationService: Send + Sync {
    async fn fetch_requirements(&self) -> Result<NodeRequirements, EdgeError>;
    async fn register(&self, stats: NodeStats) -> Result<RegistrationToken, EdgeError>;
    async fn deregister(&self) -> Result<(), EdgeError>;
}
