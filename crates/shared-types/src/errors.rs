//! # Error Types
//!
//! The edge-node error taxonomy. Every failure the retrieval pipeline can
//! surface maps onto one of these variants and, from there, onto an HTTP
//! status for the fronting cache layer.

use thiserror::Error;

/// Errors surfaced by the retrieval and verification pipeline.
#[derive(Debug, Clone, Error)]
pub enum EdgeError {
    /// Malformed request input; fails fast, before any network call.
    #[error("invalid content identifier: {0}")]
    InvalidIdentifier(String),

    /// Request matches a blocking policy rule.
    #[error("request rejected by policy: {0}")]
    PolicyRejected(String),

    /// Requested representation not supported by this deployment.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// An upstream class exceeded its deadline.
    #[error("upstream timeout: {upstream}")]
    UpstreamTimeout { upstream: &'static str },

    /// Connection or transport failure to an upstream.
    #[error("upstream unavailable: {upstream}: {reason}")]
    UpstreamUnavailable {
        upstream: &'static str,
        reason: String,
    },

    /// Verification failure: hash mismatch, unsupported codec or hash,
    /// root mismatch, multiple roots. Never served to a client, since a
    /// caching intermediary would persist unverifiable content.
    #[error("bad upstream data: {0}")]
    BadUpstreamData(String),

    /// Client disconnected mid-request. Terminates the in-flight fetch;
    /// not logged at error level.
    #[error("client aborted")]
    ClientAborted,
}

impl EdgeError {
    /// HTTP status the fronting cache layer should see for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            EdgeError::InvalidIdentifier(_) | EdgeError::PolicyRejected(_) => 400,
            EdgeError::NotImplemented(_) => 501,
            EdgeError::UpstreamTimeout { .. } => 504,
            EdgeError::UpstreamUnavailable { .. } | EdgeError::BadUpstreamData(_) => 502,
            // nginx convention for client-closed-request
            EdgeError::ClientAborted => 499,
        }
    }

    /// Whether the router should try the next configured source instead of
    /// failing the request.
    pub fn is_fall_through(&self) -> bool {
        matches!(
            self,
            EdgeError::UpstreamTimeout { .. }
                | EdgeError::UpstreamUnavailable { .. }
                | EdgeError::BadUpstreamData(_)
        )
    }
}
