//! Source selection, verification, and response assembly.
//!
//! The pipeline consults sources in configured fall-through order and only
//! reports failure to the client once every eligible source is exhausted.
//! Archive responses stream through verification; single-block responses
//! are extracted, verified, and cached before the first byte leaves.

use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use shared_types::{
    EdgeError, ResponseFormat, RetrievalRecord, RetrievalRequest, RetrievalUpstream,
};
use st_01_car_codec::decode::MAX_FRAME_BYTES;
use st_01_car_codec::domain::verify_block;
use st_01_car_codec::stream::{extract_first_block, stream_verified_car};
use st_01_car_codec::CodecError;
use st_04_fetchers::{BodyStream, UpstreamResponse};
use st_04_fetchers::UsageReporter;
use tracing::{debug, warn};

use crate::fixture::FixtureSlice;
use crate::state::AppState;

/// Run the retrieval pipeline for one parsed request.
pub async fn retrieve(state: &AppState, request: RetrievalRequest) -> Response {
    let started = Instant::now();

    if request.id == *state.fixture.id() {
        return serve_fixture(state, &request, started);
    }

    if request.format == ResponseFormat::Raw && request.is_whole_object() {
        if let Some(block) = state.cache.get(request.id.canonical()) {
            debug!(cid = %request.id, "serving single block from cache");
            return serve_block(
                state,
                &request,
                block,
                &[],
                RetrievalUpstream::BlockCache,
                started,
            );
        }
    }

    let mut last_error = EdgeError::UpstreamUnavailable {
        upstream: "source selection",
        reason: "no eligible source configured".to_string(),
    };
    let mut last_upstream = None;

    for fetcher in state.sources.iter() {
        if !eligible(fetcher.upstream(), &request) {
            continue;
        }
        last_upstream = Some(fetcher.upstream());
        let outcome = match fetcher.fetch(&request).await {
            Ok(upstream) => assemble(state, &request, upstream, started).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(response) => return response,
            Err(e) if e.is_fall_through() => {
                debug!(cid = %request.id, source = ?fetcher.upstream(), error = %e,
                    "source missed, falling through");
                last_error = e;
            }
            Err(e) => return failure(state, &request, e, last_upstream, started),
        }
    }

    failure(state, &request, last_error, last_upstream, started)
}

/// Whether a source can serve this shape of request at all.
fn eligible(upstream: RetrievalUpstream, request: &RetrievalRequest) -> bool {
    match upstream {
        RetrievalUpstream::PeerTier => {
            request.is_whole_object()
                && matches!(request.format, ResponseFormat::Car | ResponseFormat::Raw)
        }
        // the retrieval service only speaks archives; default-format
        // passthrough falls to the public gateway
        RetrievalUpstream::RetrievalService => {
            matches!(request.format, ResponseFormat::Car | ResponseFormat::Raw)
        }
        _ => true,
    }
}

/// Turn one upstream response into a client response. A fall-through `Err`
/// means nothing was sent and the next source may be tried.
async fn assemble(
    state: &AppState,
    request: &RetrievalRequest,
    upstream: UpstreamResponse,
    started: Instant,
) -> Result<Response, EdgeError> {
    if upstream.status == 304 {
        let mut headers = base_headers(state, request);
        apply_pairs(&mut headers, &upstream.headers);
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    match request.format {
        ResponseFormat::Car => stream_archive(state, request, upstream, started).await,
        ResponseFormat::Raw => serve_raw(state, request, upstream, started).await,
        ResponseFormat::Default => Ok(stream_passthrough(state, request, upstream, started)),
    }
}

/// Archive response: re-frame through the verifier and stream.
///
/// The status is not committed until the verifier has emitted its first
/// frame, so a header-stage rejection (multiple roots, bad header, a bad
/// first entry before any output) falls through to the next source with
/// nothing sent. A verification failure after that surfaces as a body
/// error, which aborts the connection without a clean final frame.
async fn stream_archive(
    state: &AppState,
    request: &RetrievalRequest,
    upstream: UpstreamResponse,
    started: Instant,
) -> Result<Response, EdgeError> {
    let mut verified = stream_verified_car(upstream.body);
    let header_frame = match verified.next().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(e)) => return Err(e.into()),
        None => {
            return Err(EdgeError::BadUpstreamData(
                "archive stream ended before the header".to_string(),
            ))
        }
    };

    let mut headers = base_headers(state, request);
    apply_pairs(&mut headers, &upstream.headers);
    set_static(&mut headers, "content-type", "application/vnd.ipld.car");
    headers.remove("content-length"); // re-framing may change it

    let mut report =
        StreamReport::new(state.reporter.clone(), request, upstream.upstream, 200, started);
    report.chunk(header_frame.len());
    let body = futures::stream::once(async move { Ok::<_, CodecError>(header_frame) })
        .chain(counted(verified, report));
    Ok((StatusCode::OK, headers, Body::from_stream(body)).into_response())
}

/// Default-format passthrough: the body is relayed as-is; there is nothing
/// to verify at this layer for origin-encoded objects.
fn stream_passthrough(
    state: &AppState,
    request: &RetrievalRequest,
    upstream: UpstreamResponse,
    started: Instant,
) -> Response {
    let mut headers = base_headers(state, request);
    apply_pairs(&mut headers, &upstream.headers);

    let report =
        StreamReport::new(state.reporter.clone(), request, upstream.upstream, 200, started);
    let body = counted(upstream.body, report);
    (StatusCode::OK, headers, Body::from_stream(body)).into_response()
}

/// Single-block response. The upstream body is an archive (peer tier,
/// retrieval service) or the bare block (public gateway, which was asked
/// for raw); either way the requested block is verified before the
/// response starts, and verified DAG siblings from an archive populate the
/// cache en route.
async fn serve_raw(
    state: &AppState,
    request: &RetrievalRequest,
    upstream: UpstreamResponse,
    started: Instant,
) -> Result<Response, EdgeError> {
    let source = upstream.upstream;
    let block = match source {
        RetrievalUpstream::PublicGateway => collect_and_verify(request, upstream.body).await?,
        _ => {
            let cache = state.cache.clone();
            extract_first_block(
                upstream.body,
                &request.id,
                !request.is_whole_object(),
                move |id, payload| cache.put(id.canonical().to_string(), payload),
            )
            .await?
        }
    };

    if request.is_whole_object() {
        state
            .cache
            .put(request.id.canonical().to_string(), block.clone());
    }
    Ok(serve_block(
        state,
        request,
        block,
        &upstream.headers,
        source,
        started,
    ))
}

/// Buffer a bare block body and verify it against the requested
/// identifier. A sub-path block has a different identifier than the
/// request root, so it passes through unverified, as on any
/// path-translating proxy.
async fn collect_and_verify(
    request: &RetrievalRequest,
    mut body: BodyStream,
) -> Result<Bytes, EdgeError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        // same bound the archive decoder puts on a single frame
        if buf.len() + chunk.len() > MAX_FRAME_BYTES as usize {
            return Err(EdgeError::BadUpstreamData(format!(
                "bare block exceeds the {MAX_FRAME_BYTES} byte frame bound"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    let block = Bytes::from(buf);
    if request.is_whole_object() {
        verify_block(request.id.as_cid(), &block)?;
    }
    Ok(block)
}

/// A fully-verified single block.
fn serve_block(
    state: &AppState,
    request: &RetrievalRequest,
    block: Bytes,
    upstream_headers: &[(&'static str, String)],
    source: RetrievalUpstream,
    started: Instant,
) -> Response {
    let mut headers = base_headers(state, request);
    apply_pairs(&mut headers, upstream_headers);
    set_static(&mut headers, "content-type", "application/vnd.ipld.raw");
    if let Ok(len) = HeaderValue::from_str(&block.len().to_string()) {
        headers.insert("content-length", len);
    }
    report_served(state, request, source, 200, block.len() as u64, started);
    (StatusCode::OK, headers, Body::from(block)).into_response()
}

/// The local monitoring fixture, the only range-served content.
fn serve_fixture(state: &AppState, request: &RetrievalRequest, started: Instant) -> Response {
    let mut headers = base_headers(state, request);
    set_static(&mut headers, "content-type", "application/vnd.ipld.car");
    set_static(&mut headers, "accept-ranges", "bytes");

    match state.fixture.slice(request.range) {
        FixtureSlice::Whole(body) => {
            report_served(
                state,
                request,
                RetrievalUpstream::LocalFixture,
                200,
                body.len() as u64,
                started,
            );
            (StatusCode::OK, headers, Body::from(body)).into_response()
        }
        FixtureSlice::Partial {
            body,
            content_range,
        } => {
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                headers.insert("content-range", value);
            }
            report_served(
                state,
                request,
                RetrievalUpstream::LocalFixture,
                206,
                body.len() as u64,
                started,
            );
            (StatusCode::PARTIAL_CONTENT, headers, Body::from(body)).into_response()
        }
        FixtureSlice::Unsatisfiable { content_range } => {
            if let Ok(value) = HeaderValue::from_str(&content_range) {
                headers.insert("content-range", value);
            }
            (StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response()
        }
    }
}

/// Final failure: every source exhausted, or a non-recoverable error.
fn failure(
    state: &AppState,
    request: &RetrievalRequest,
    error: EdgeError,
    upstream: Option<RetrievalUpstream>,
    started: Instant,
) -> Response {
    let status = error.http_status();
    warn!(cid = %request.id, status, elapsed_ms = started.elapsed().as_millis() as u64,
        error = %error, "retrieval failed");
    if let Some(upstream) = upstream {
        state.reporter.report(RetrievalRecord {
            cid: request.id.canonical().to_string(),
            upstream,
            status,
            ttfb_ms: None,
            bytes_sent: 0,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
    let mut headers = base_headers(state, request);
    headers.remove("cache-control"); // failures must not be cached as immutable
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
        headers,
        error.to_string(),
    )
        .into_response()
}

/// Headers present on every response this node assembles.
fn base_headers(state: &AppState, request: &RetrievalRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(request.format.content_type()) {
        headers.insert("content-type", value);
    }
    set_static(
        &mut headers,
        "cache-control",
        "public, max-age=31536000, immutable",
    );
    if let Ok(value) = HeaderValue::from_str(&state.config.node_id) {
        headers.insert(HeaderName::from_static("stratus-node-id"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&state.config.node_version) {
        headers.insert(HeaderName::from_static("stratus-node-version"), value);
    }
    headers
}

fn set_static(headers: &mut HeaderMap, name: &'static str, value: &'static str) {
    headers.insert(
        HeaderName::from_static(name),
        HeaderValue::from_static(value),
    );
}

fn apply_pairs(headers: &mut HeaderMap, pairs: &[(&'static str, String)]) {
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

fn report_served(
    state: &AppState,
    request: &RetrievalRequest,
    upstream: RetrievalUpstream,
    status: u16,
    bytes_sent: u64,
    started: Instant,
) {
    state.reporter.report(RetrievalRecord {
        cid: request.id.canonical().to_string(),
        upstream,
        status,
        ttfb_ms: Some(started.elapsed().as_millis() as u64),
        bytes_sent,
        duration_ms: started.elapsed().as_millis() as u64,
    });
}

/// Count a body stream into its usage report, marking how it ended.
///
/// A stream dropped before its terminal state is a client that went away
/// mid-body; the report records that as a client abort.
fn counted<S, E>(
    inner: S,
    report: StreamReport,
) -> impl futures::Stream<Item = Result<Bytes, E>> + Send + 'static
where
    S: futures::Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Send + 'static,
{
    futures::stream::unfold((inner, report), |(mut inner, mut report)| async move {
        match inner.next().await {
            Some(item) => {
                match &item {
                    Ok(chunk) => report.chunk(chunk.len()),
                    Err(_) => report.fail(),
                }
                Some((item, (inner, report)))
            }
            None => {
                report.complete();
                None
            }
        }
    })
}

/// Per-stream usage accounting; reports when the body stream drops.
struct StreamReport {
    reporter: UsageReporter,
    cid: String,
    upstream: RetrievalUpstream,
    status: u16,
    started: Instant,
    first_byte_ms: Option<u64>,
    bytes: u64,
    terminal: bool,
}

impl StreamReport {
    fn new(
        reporter: UsageReporter,
        request: &RetrievalRequest,
        upstream: RetrievalUpstream,
        status: u16,
        started: Instant,
    ) -> Self {
        Self {
            reporter,
            cid: request.id.canonical().to_string(),
            upstream,
            status,
            started,
            first_byte_ms: None,
            bytes: 0,
            terminal: false,
        }
    }

    fn chunk(&mut self, len: usize) {
        if self.first_byte_ms.is_none() {
            self.first_byte_ms = Some(self.started.elapsed().as_millis() as u64);
        }
        self.bytes += len as u64;
    }

    /// The body ended on an error after the status was committed; the
    /// connection aborts and the record carries the gateway-error status.
    fn fail(&mut self) {
        self.status = EdgeError::BadUpstreamData(String::new()).http_status();
        self.terminal = true;
    }

    /// The body was delivered in full.
    fn complete(&mut self) {
        self.terminal = true;
    }
}

impl Drop for StreamReport {
    fn drop(&mut self) {
        if !self.terminal {
            self.status = EdgeError::ClientAborted.http_status();
            debug!(cid = %self.cid, bytes = self.bytes, "client went away mid-body");
        }
        self.reporter.report(RetrievalRecord {
            cid: std::mem::take(&mut self.cid),
            upstream: self.upstream,
            status: self.status,
            ttfb_ms: self.first_byte_ms,
            bytes_sent: self.bytes,
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
    }
}
