//! Error types for the CAR codec.

use shared_types::EdgeError;
use thiserror::Error;

/// Errors that can occur while decoding or verifying an archive stream.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The upstream stream ended mid-frame.
    #[error("truncated archive: {0}")]
    Truncated(&'static str),

    /// The header frame did not decode as a CARv1 header.
    #[error("invalid archive header: {0}")]
    InvalidHeader(String),

    /// Only CARv1 is understood.
    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u64),

    /// An archive declaring more than one root is rejected.
    #[error("archive declares {0} roots, exactly one is supported")]
    MultipleRoots(usize),

    /// The entry identifier carries a codec outside the supported set.
    #[error("unsupported codec: 0x{0:x}")]
    UnsupportedCodec(u64),

    /// The entry identifier carries a hash function outside the supported set.
    #[error("unsupported multihash: 0x{0:x}")]
    UnsupportedMultihash(u64),

    /// Recomputed digest does not match the digest declared in the identifier.
    #[error("digest mismatch for {cid}")]
    DigestMismatch { cid: String },

    /// First entry of a whole-object extraction does not match the requested
    /// identifier.
    #[error("root mismatch: archive starts with {actual}, requested {expected}")]
    RootMismatch { expected: String, actual: String },

    /// A frame exceeds the decoder's size bound.
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(u64),

    /// The entry frame's identifier bytes did not parse.
    #[error("invalid entry identifier: {0}")]
    InvalidEntryCid(String),

    /// Transport failure while reading the upstream stream.
    #[error("upstream stream error: {0}")]
    Upstream(String),
}

impl From<CodecError> for EdgeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Upstream(reason) => EdgeError::UpstreamUnavailable {
                upstream: "archive stream",
                reason,
            },
            other => EdgeError::BadUpstreamData(other.to_string()),
        }
    }
}
