//! The fixed local test fixture.
//!
//! Monitoring infrastructure fetches a well-known identifier to check that
//! a node is alive and serving bytes. The archive is deterministic, built
//! once at startup from an embedded payload, and is the only content this
//! layer serves by byte range.

use bytes::Bytes;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use shared_types::{ByteRange, ContentId};
use st_01_car_codec::domain::CODEC_RAW;
use st_01_car_codec::encode::{encode_block, encode_header};
use st_01_car_codec::error::CodecError;

/// Fixture payload size. Big enough for meaningful range probes, small
/// enough to embed.
const PAYLOAD_LEN: usize = 64 * 1024;

/// The fixture served for monitoring probes.
pub struct TestFixture {
    id: ContentId,
    car: Bytes,
}

/// Outcome of a range request against the fixture.
pub enum FixtureSlice {
    Whole(Bytes),
    Partial { body: Bytes, content_range: String },
    Unsatisfiable { content_range: String },
}

impl TestFixture {
    /// Build the deterministic fixture archive.
    pub fn build() -> Result<Self, CodecError> {
        let payload = deterministic_payload();
        let cid = Cid::new_v1(CODEC_RAW, Code::Sha2_256.digest(&payload));

        let mut car = encode_header(&[cid])?.to_vec();
        car.extend_from_slice(&encode_block(&cid, &payload));
        Ok(Self {
            id: ContentId::from_cid(cid),
            car: Bytes::from(car),
        })
    }

    /// The identifier monitoring probes request.
    pub fn id(&self) -> &ContentId {
        &self.id
    }

    /// The complete archive bytes.
    pub fn car(&self) -> &Bytes {
        &self.car
    }

    /// Serve the archive, honoring a single inclusive byte range.
    pub fn slice(&self, range: Option<ByteRange>) -> FixtureSlice {
        let total = self.car.len() as u64;
        match range {
            None => FixtureSlice::Whole(self.car.clone()),
            Some(range) if range.start >= total => FixtureSlice::Unsatisfiable {
                content_range: format!("bytes */{total}"),
            },
            Some(range) => {
                let end = range.end.min(total - 1);
                let body = self.car.slice(range.start as usize..=end as usize);
                FixtureSlice::Partial {
                    body,
                    content_range: format!("bytes {}-{}/{}", range.start, end, total),
                }
            }
        }
    }
}

/// A fixed pseudo-random payload; same bytes on every node and every boot.
fn deterministic_payload() -> Vec<u8> {
    let mut state: u64 = 0x5374_7261_7475_7301;
    let mut out = Vec::with_capacity(PAYLOAD_LEN);
    while out.len() < PAYLOAD_LEN {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(PAYLOAD_LEN);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_is_deterministic() {
        let a = TestFixture::build().unwrap();
        let b = TestFixture::build().unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.car(), b.car());
    }

    #[test]
    fn fixture_archive_verifies() {
        use futures::executor::block_on;
        use st_01_car_codec::stream::extract_first_block;

        let fixture = TestFixture::build().unwrap();
        let upstream = futures::stream::iter([Ok::<_, std::io::Error>(fixture.car().clone())]);
        let payload = block_on(extract_first_block(upstream, fixture.id(), false, |_, _| {}))
            .unwrap();
        assert_eq!(payload.len(), PAYLOAD_LEN);
    }

    #[test]
    fn range_slicing_is_inclusive_and_clamped() {
        let fixture = TestFixture::build().unwrap();
        let total = fixture.car().len() as u64;

        match fixture.slice(Some(ByteRange { start: 10, end: 20 })) {
            FixtureSlice::Partial {
                body,
                content_range,
            } => {
                assert_eq!(body.len(), 11);
                assert_eq!(body, fixture.car().slice(10..=20));
                assert_eq!(content_range, format!("bytes 10-20/{total}"));
            }
            _ => panic!("expected partial"),
        }

        // end past the archive clamps to the last byte
        match fixture.slice(Some(ByteRange {
            start: total - 5,
            end: total + 100,
        })) {
            FixtureSlice::Partial { body, .. } => assert_eq!(body.len(), 5),
            _ => panic!("expected partial"),
        }

        match fixture.slice(Some(ByteRange {
            start: total,
            end: total + 1,
        })) {
            FixtureSlice::Unsatisfiable { content_range } => {
                assert_eq!(content_range, format!("bytes */{total}"));
            }
            _ => panic!("expected unsatisfiable"),
        }
    }
}
