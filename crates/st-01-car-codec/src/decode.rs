//! Incremental CARv1 frame decoder.
//!
//! Wire format: one varint-length-prefixed dag-cbor header
//! `{version: 1, roots: [cid]}` followed by varint-length-prefixed
//! `(cid, payload)` entries. The decoder consumes chunks as they arrive and
//! yields an event as soon as a full frame is buffered, so output can start
//! before the body finishes transferring.

use bytes::{Buf, Bytes, BytesMut};
use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Upper bound on any single frame. Entries larger than this are hostile or
/// corrupt; well-formed blocks stay in the low megabytes.
pub const MAX_FRAME_BYTES: u64 = 8 * 1024 * 1024;

/// The decoded archive header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarHeader {
    pub roots: Vec<Cid>,
    pub version: u64,
}

/// One decoded unit of the archive.
#[derive(Debug, Clone)]
pub enum CarEvent {
    Header(CarHeader),
    Block { cid: Cid, payload: Bytes },
}

enum DecodeState {
    Header,
    Entries,
}

/// Streaming decoder. Feed bytes with [`CarDecoder::extend`], drain events
/// with [`CarDecoder::next_event`], and call [`CarDecoder::finish`] once the
/// input stream ends to catch mid-frame truncation.
pub struct CarDecoder {
    buf: BytesMut,
    state: DecodeState,
}

impl CarDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::Header,
        }
    }

    /// Append an upstream chunk to the decode buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decode the next complete frame, if one is buffered.
    ///
    /// `Ok(None)` means more input is needed, not end of archive.
    pub fn next_event(&mut self) -> Result<Option<CarEvent>, CodecError> {
        let Some(frame) = self.take_frame()? else {
            return Ok(None);
        };
        match self.state {
            DecodeState::Header => {
                let header: CarHeader = serde_ipld_dagcbor::from_slice(&frame)
                    .map_err(|e| CodecError::InvalidHeader(e.to_string()))?;
                if header.version != 1 {
                    return Err(CodecError::UnsupportedVersion(header.version));
                }
                self.state = DecodeState::Entries;
                Ok(Some(CarEvent::Header(header)))
            }
            DecodeState::Entries => {
                let mut cursor = std::io::Cursor::new(frame.as_ref());
                let cid = Cid::read_bytes(&mut cursor)
                    .map_err(|e| CodecError::InvalidEntryCid(e.to_string()))?;
                let offset = cursor.position() as usize;
                let payload = frame.slice(offset..);
                Ok(Some(CarEvent::Block { cid, payload }))
            }
        }
    }

    /// Validate end-of-input: the buffer must hold no partial frame and the
    /// header must have been seen.
    pub fn finish(&self) -> Result<(), CodecError> {
        if matches!(self.state, DecodeState::Header) {
            return Err(CodecError::Truncated("stream ended before header"));
        }
        if !self.buf.is_empty() {
            return Err(CodecError::Truncated("stream ended mid-frame"));
        }
        Ok(())
    }

    fn take_frame(&mut self) -> Result<Option<Bytes>, CodecError> {
        let (len, varint_len) = match unsigned_varint::decode::u64(self.buf.as_ref()) {
            Ok((len, rest)) => (len, self.buf.len() - rest.len()),
            Err(unsigned_varint::decode::Error::Insufficient) => return Ok(None),
            Err(e) => return Err(CodecError::InvalidHeader(e.to_string())),
        };
        if len > MAX_FRAME_BYTES {
            return Err(CodecError::FrameTooLarge(len));
        }
        if self.buf.len() - varint_len < len as usize {
            return Ok(None);
        }
        self.buf.advance(varint_len);
        Ok(Some(self.buf.split_to(len as usize).freeze()))
    }
}

impl Default for CarDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CODEC_RAW;
    use crate::encode::{encode_block, encode_header};
    use multihash_codetable::{Code, MultihashDigest};

    fn raw_cid(payload: &[u8]) -> Cid {
        Cid::new_v1(CODEC_RAW, Code::Sha2_256.digest(payload))
    }

    fn sample_car(payloads: &[&[u8]]) -> (Vec<u8>, Vec<Cid>) {
        let cids: Vec<Cid> = payloads.iter().map(|p| raw_cid(p)).collect();
        let mut bytes = encode_header(&cids[..1]).unwrap().to_vec();
        for (cid, payload) in cids.iter().zip(payloads) {
            bytes.extend_from_slice(&encode_block(cid, payload));
        }
        (bytes, cids)
    }

    #[test]
    fn decodes_header_then_entries() {
        let (bytes, cids) = sample_car(&[b"one", b"two"]);
        let mut decoder = CarDecoder::new();
        decoder.extend(&bytes);

        match decoder.next_event().unwrap() {
            Some(CarEvent::Header(header)) => {
                assert_eq!(header.version, 1);
                assert_eq!(header.roots, vec![cids[0]]);
            }
            other => panic!("expected header, got {other:?}"),
        }
        match decoder.next_event().unwrap() {
            Some(CarEvent::Block { cid, payload }) => {
                assert_eq!(cid, cids[0]);
                assert_eq!(payload.as_ref(), b"one");
            }
            other => panic!("expected block, got {other:?}"),
        }
        match decoder.next_event().unwrap() {
            Some(CarEvent::Block { cid, .. }) => assert_eq!(cid, cids[1]),
            other => panic!("expected block, got {other:?}"),
        }
        assert!(decoder.next_event().unwrap().is_none());
        decoder.finish().unwrap();
    }

    #[test]
    fn handles_single_byte_chunks() {
        let (bytes, _) = sample_car(&[b"chunked delivery"]);
        let mut decoder = CarDecoder::new();
        let mut events = 0;
        for byte in bytes {
            decoder.extend(&[byte]);
            while decoder.next_event().unwrap().is_some() {
                events += 1;
            }
        }
        assert_eq!(events, 2); // header + one block
        decoder.finish().unwrap();
    }

    #[test]
    fn truncated_frame_detected_at_finish() {
        let (bytes, _) = sample_car(&[b"cut short"]);
        let mut decoder = CarDecoder::new();
        decoder.extend(&bytes[..bytes.len() - 3]);
        while decoder.next_event().unwrap().is_some() {}
        assert!(matches!(
            decoder.finish(),
            Err(CodecError::Truncated("stream ended mid-frame"))
        ));
    }

    #[test]
    fn missing_header_detected_at_finish() {
        let decoder = CarDecoder::new();
        assert!(matches!(decoder.finish(), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut framed = unsigned_varint::encode::u64_buffer();
        let prefix = unsigned_varint::encode::u64(MAX_FRAME_BYTES + 1, &mut framed);
        let mut decoder = CarDecoder::new();
        decoder.extend(prefix);
        assert!(matches!(
            decoder.next_event(),
            Err(CodecError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn non_car_input_rejected() {
        let mut decoder = CarDecoder::new();
        // plausible varint prefix, garbage header body
        let mut body = vec![8u8];
        body.extend_from_slice(b"not cbor");
        decoder.extend(&body);
        assert!(matches!(
            decoder.next_event(),
            Err(CodecError::InvalidHeader(_))
        ));
    }
}
