//! # ST-01 CAR Codec - Streaming archive decode and verification.
//!
//! This crate is the integrity boundary of the node: every byte an upstream
//! returns passes through here before a client or the block cache sees it.
//!
//! # Architecture
//!
//! ```text
//! upstream chunks ──→ CarDecoder ──→ verify_block ──→ re-framed output
//!                      (framing)      (digest)          (encode)
//! ```
//!
//! - `decode`: incremental frame decoder: header, then length-prefixed
//!   `(cid, payload)` entries. Never buffers the whole archive.
//! - `domain`: the supported codec/multihash tables and the per-block
//!   digest check.
//! - `encode`: header and entry framing for the verified output stream.
//! - `stream`: the two pipeline operations: re-emit a verified archive,
//!   or extract a single block while offering DAG siblings to a cache.
//!
//! Verification is strictly sequential: entry N+1 is not examined until
//! entry N's verdict is known. A failed entry aborts the output stream
//! without a clean termination frame, so a fronting cache cannot persist a
//! truncated archive as complete.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod decode;
pub mod domain;
pub mod encode;
pub mod error;
pub mod stream;

pub use decode::{CarDecoder, CarEvent, CarHeader};
pub use domain::{codec_supported, multihash_supported, verify_block};
pub use encode::{encode_block, encode_header};
pub use error::CodecError;
pub use stream::{extract_first_block, stream_verified_car};
