//! Supported codec/multihash tables and the per-block integrity check.
//!
//! The codec tag only matters for downstream interpretation, never for
//! verification itself, but an unknown codec still rejects the entry: the
//! node refuses to relay bytes it cannot even classify.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

use crate::error::CodecError;

/// Raw bytes.
pub const CODEC_RAW: u64 = 0x55;
/// dag-pb (UnixFS).
pub const CODEC_DAG_PB: u64 = 0x70;
/// dag-cbor.
pub const CODEC_DAG_CBOR: u64 = 0x71;
/// dag-json.
pub const CODEC_DAG_JSON: u64 = 0x0129;
/// Plain json.
pub const CODEC_JSON: u64 = 0x0200;

/// sha2-256: the general-purpose fast hash.
pub const MULTIHASH_SHA2_256: u64 = 0x12;
/// blake2b-256: the hash the archive security model specifies.
pub const MULTIHASH_BLAKE2B_256: u64 = 0xb220;

/// Whether a content-encoding tag is in the supported set.
pub fn codec_supported(code: u64) -> bool {
    matches!(
        code,
        CODEC_RAW | CODEC_DAG_PB | CODEC_DAG_CBOR | CODEC_DAG_JSON | CODEC_JSON
    )
}

/// Whether a multihash tag is in the supported set.
pub fn multihash_supported(code: u64) -> bool {
    matches!(code, MULTIHASH_SHA2_256 | MULTIHASH_BLAKE2B_256)
}

/// Verify one `(identifier, payload)` entry.
///
/// Confirms the codec and hash function are supported, recomputes the digest
/// over the payload, and compares it to the digest declared in the
/// identifier. An entry failing this check must never reach a client or the
/// block cache.
pub fn verify_block(cid: &Cid, payload: &[u8]) -> Result<(), CodecError> {
    if !codec_supported(cid.codec()) {
        return Err(CodecError::UnsupportedCodec(cid.codec()));
    }
    let hash_code = cid.hash().code();
    if !multihash_supported(hash_code) {
        return Err(CodecError::UnsupportedMultihash(hash_code));
    }
    let hasher =
        Code::try_from(hash_code).map_err(|_| CodecError::UnsupportedMultihash(hash_code))?;
    let recomputed = hasher.digest(payload);
    if recomputed.digest() != cid.hash().digest() {
        return Err(CodecError::DigestMismatch {
            cid: cid.to_string(),
        });
    }
    Ok(())
}
