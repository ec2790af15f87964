//! CARv1 framing for the verified output stream.

use bytes::{BufMut, Bytes, BytesMut};
use cid::Cid;

use crate::decode::CarHeader;
use crate::error::CodecError;

/// Encode a header frame declaring the given roots.
pub fn encode_header(roots: &[Cid]) -> Result<Bytes, CodecError> {
    let header = CarHeader {
        roots: roots.to_vec(),
        version: 1,
    };
    let body = serde_ipld_dagcbor::to_vec(&header)
        .map_err(|e| CodecError::InvalidHeader(e.to_string()))?;
    Ok(frame(&body, &[]))
}

/// Encode one `(identifier, payload)` entry frame.
pub fn encode_block(cid: &Cid, payload: &[u8]) -> Bytes {
    frame(&cid.to_bytes(), payload)
}

fn frame(head: &[u8], tail: &[u8]) -> Bytes {
    let mut varint = unsigned_varint::encode::u64_buffer();
    let prefix = unsigned_varint::encode::u64((head.len() + tail.len()) as u64, &mut varint);
    let mut out = BytesMut::with_capacity(prefix.len() + head.len() + tail.len());
    out.put_slice(prefix);
    out.put_slice(head);
    out.put_slice(tail);
    out.freeze()
}
