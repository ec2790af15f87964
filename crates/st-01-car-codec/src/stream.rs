//! The two pipeline operations over an upstream archive stream.
//!
//! Both verify strictly sequentially: entry N+1 is not examined until entry
//! N's verdict is known, so the header and first entry are validated before
//! later entries are trusted to populate the cache.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use shared_types::ContentId;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::decode::{CarDecoder, CarEvent};
use crate::domain::verify_block;
use crate::encode::{encode_block, encode_header};
use crate::error::CodecError;

/// Re-emit an archive downstream, forwarding only entries that verify.
///
/// The header is re-framed and emitted as soon as it decodes, so the client
/// starts receiving bytes before the body is fully verified. Any failure
/// ends the output with an `Err` item and no terminating frame; a fronting
/// cache layer sees an aborted transfer, not a complete object.
///
/// Dropping the returned stream cancels the pump task, which in turn drops
/// (and thereby aborts) the upstream stream.
pub fn stream_verified_car<S, E>(upstream: S) -> ReceiverStream<Result<Bytes, CodecError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(pump_verified(upstream, tx));
    ReceiverStream::new(rx)
}

async fn pump_verified<S, E>(upstream: S, tx: mpsc::Sender<Result<Bytes, CodecError>>)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut decoder = CarDecoder::new();

    loop {
        // Drain every complete frame before polling for more input.
        loop {
            match decoder.next_event() {
                Ok(Some(CarEvent::Header(header))) => {
                    if header.roots.len() > 1 {
                        let _ = tx.send(Err(CodecError::MultipleRoots(header.roots.len()))).await;
                        return;
                    }
                    let framed = match encode_header(&header.roots) {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    if tx.send(Ok(framed)).await.is_err() {
                        return; // client gone
                    }
                }
                Ok(Some(CarEvent::Block { cid, payload })) => {
                    if let Err(e) = verify_block(&cid, &payload) {
                        warn!(cid = %cid, error = %e, "dropping archive stream on bad entry");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    if tx.send(Ok(encode_block(&cid, &payload))).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }

        match upstream.next().await {
            Some(Ok(chunk)) => decoder.extend(&chunk),
            Some(Err(e)) => {
                let _ = tx.send(Err(CodecError::Upstream(e.to_string()))).await;
                return;
            }
            None => {
                if let Err(e) = decoder.finish() {
                    let _ = tx.send(Err(e)).await;
                }
                return;
            }
        }
    }
}

/// Extract the payload of the archive's first entry.
///
/// The first entry must verify, and for whole-object requests its
/// identifier must canonically equal `expected`. Remaining entries keep
/// verifying and each valid one is offered to `on_verified_sibling` (block
/// cache population from DAG siblings encountered en route).
///
/// Once the requested block has verified, a later sibling failure no longer
/// fails the call: each entry's validity is self-contained, so the result
/// stays valid and only sibling collection stops.
pub async fn extract_first_block<S, E>(
    upstream: S,
    expected: &ContentId,
    sub_path_requested: bool,
    mut on_verified_sibling: impl FnMut(ContentId, Bytes),
) -> Result<Bytes, CodecError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut decoder = CarDecoder::new();
    let mut first: Option<Bytes> = None;

    loop {
        let event = match decoder.next_event() {
            Ok(event) => event,
            Err(e) => match first.take() {
                Some(block) => {
                    warn!(error = %e, "stopping sibling collection on decode error");
                    return Ok(block);
                }
                None => return Err(e),
            },
        };

        match event {
            Some(CarEvent::Header(header)) => {
                if header.roots.len() > 1 {
                    return Err(CodecError::MultipleRoots(header.roots.len()));
                }
            }
            Some(CarEvent::Block { cid, payload }) => match verify_block(&cid, &payload) {
                Ok(()) => {
                    let id = ContentId::from_cid(cid);
                    if first.is_none() {
                        if !sub_path_requested && id != *expected {
                            return Err(CodecError::RootMismatch {
                                expected: expected.canonical().to_string(),
                                actual: id.canonical().to_string(),
                            });
                        }
                        first = Some(payload);
                    } else {
                        debug!(cid = %id, "caching verified sibling block");
                        on_verified_sibling(id, payload);
                    }
                }
                Err(e) => match first.take() {
                    Some(block) => {
                        warn!(error = %e, "stopping sibling collection on bad entry");
                        return Ok(block);
                    }
                    None => return Err(e),
                },
            },
            None => match upstream.next().await {
                Some(Ok(chunk)) => decoder.extend(&chunk),
                Some(Err(e)) => match first.take() {
                    Some(block) => {
                        warn!(error = %e, "upstream ended early after requested block");
                        return Ok(block);
                    }
                    None => return Err(CodecError::Upstream(e.to_string())),
                },
                None => {
                    if let Err(e) = decoder.finish() {
                        match first.take() {
                            Some(block) => {
                                warn!(error = %e, "truncated tail after requested block");
                                return Ok(block);
                            }
                            None => return Err(e),
                        }
                    }
                    return first.ok_or(CodecError::Truncated("archive contained no entries"));
                }
            },
        }
    }
}
