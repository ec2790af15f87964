//! HTTP route table and handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use st_03_peer_router::registry::{PeerRegistry, Registration};
use st_03_peer_router::PeerWire;
use tower_http::trace::TraceLayer;
use tracing::debug;

use shared_types::ContentId;

use crate::parse::parse_request;
use crate::pipeline;
use crate::state::AppState;

/// Interval between bare-newline keep-alives on a registration stream.
const KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Assemble the full route table.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ipfs/:cid", get(retrieve_root))
        .route("/ipfs/:cid/*path", get(retrieve_path))
        .route("/register/:peer_id", get(register_peer))
        .route("/data/:cid", post(deliver_data))
        .route("/register-check", get(register_check))
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn retrieve_root(
    State(state): State<AppState>,
    Path(cid): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    handle_retrieval(state, cid, None, query, headers).await
}

async fn retrieve_path(
    State(state): State<AppState>,
    Path((cid, path)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    handle_retrieval(state, cid, Some(path), query, headers).await
}

async fn handle_retrieval(
    state: AppState,
    cid: String,
    sub_path: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
) -> Response {
    match parse_request(&cid, sub_path, &query, &headers) {
        Ok(request) => pipeline::retrieve(&state, request).await,
        // rejected before any network call
        Err(e) => (
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_REQUEST),
            e.to_string(),
        )
            .into_response(),
    }
}

/// Carries one peer's registration for the lifetime of its stream;
/// dropping it (client disconnect) deregisters, unless a newer
/// registration already replaced this one.
struct RegistrationStream {
    registry: Arc<PeerRegistry>,
    peer_id: String,
    registration: Registration,
    keep_alive: tokio::time::Interval,
}

impl Drop for RegistrationStream {
    fn drop(&mut self) {
        self.registry.deregister(&self.peer_id, &self.registration);
        debug!(peer = %self.peer_id, "registration stream closed");
    }
}

/// Long-lived registration stream: newline keep-alives plus solicitation
/// lines, never completes until the peer disconnects (or a newer
/// registration for the same id replaces this one).
async fn register_peer(State(state): State<AppState>, Path(peer_id): Path<String>) -> Response {
    let registry = Arc::clone(state.peers.registry());
    let registration = registry.register(&peer_id);
    debug!(peer = %peer_id, "peer registered");

    let stream_state = RegistrationStream {
        registry,
        peer_id,
        registration,
        keep_alive: tokio::time::interval(KEEP_ALIVE),
    };
    let lines = futures::stream::unfold(stream_state, |mut s| async move {
        tokio::select! {
            message = s.registration.receiver.recv() => match message {
                Some(wire) => Some((Ok::<_, std::convert::Infallible>(wire.encode()), s)),
                // replaced by a newer registration; end this stream
                None => None,
            },
            _ = s.keep_alive.tick() => {
                Some((Ok(PeerWire::KeepAlive.encode()), s))
            }
        }
    });

    (
        [("content-type", "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

/// A peer answering a solicitation posts the archive body here; it is
/// correlated to the pending request by identifier.
async fn deliver_data(
    State(state): State<AppState>,
    Path(cid): Path<String>,
    body: Bytes,
) -> Response {
    match ContentId::parse(&cid) {
        Ok(id) => {
            let consumed = state.peers.deliver(&id, body);
            debug!(cid = %id, consumed, "peer delivery");
            StatusCode::OK.into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Liveness and identity probe: succeeds only for this node's own id.
async fn register_check(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match query.get("nodeId") {
        Some(node_id) if *node_id == state.config.node_id => {
            (StatusCode::OK, "OK").into_response()
        }
        _ => (StatusCode::FORBIDDEN, "node id mismatch").into_response(),
    }
}
