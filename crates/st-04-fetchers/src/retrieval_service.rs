//! The content-retrieval service source.
//!
//! Translates the local request vocabulary into the service's own: the
//! `depth` parameter becomes a traversal scope, a raw-block request becomes
//! a bounded entity-scoped fetch, and a configurable fraction of requests
//! additionally enable the slower-but-more-available secondary transport.
//! The body always comes back as an archive stream for downstream
//! verification.

use async_trait::async_trait;
use shared_types::{DagDepth, EdgeError, NodeConfig, ResponseFormat, RetrievalRequest,
    RetrievalUpstream};
use tracing::debug;

use crate::headers::{passthrough_response_headers, IMMUTABLE_CACHE_CONTROL};
use crate::{http_body, transport_error, Fetcher, UpstreamResponse};

const UPSTREAM_NAME: &str = "retrieval service";

/// Raw-block requests bound the traversal instead of pulling a whole DAG.
const RAW_BLOCK_LIMIT: &str = "10";

pub struct RetrievalServiceFetcher {
    client: reqwest::Client,
    origin: String,
    secondary_fraction: f64,
}

impl RetrievalServiceFetcher {
    pub fn new(config: &NodeConfig, origin: String) -> Result<Self, EdgeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.node_ua.clone())
            .timeout(config.upstream_timeout)
            .pool_max_idle_per_host(config.max_idle_connections_per_host)
            .build()
            .map_err(|e| EdgeError::UpstreamUnavailable {
                upstream: UPSTREAM_NAME,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            origin,
            secondary_fraction: config.secondary_transport_fraction,
        })
    }
}

/// Query parameters in the service's vocabulary.
fn translated_query(request: &RetrievalRequest, secondary_transport: bool) -> Vec<(&'static str, String)> {
    let mut query = vec![("format", "car".to_string())];

    if request.format == ResponseFormat::Raw {
        query.push(("dag-scope", "entity".to_string()));
        query.push(("blockLimit", RAW_BLOCK_LIMIT.to_string()));
    } else if let Some(depth) = request.depth {
        let scope = match depth {
            DagDepth::Block => "block",
            DagDepth::File => "entity",
            DagDepth::All => "all",
        };
        query.push(("dag-scope", scope.to_string()));
    }

    if let Some(filename) = &request.filename {
        query.push(("filename", filename.clone()));
    }
    if secondary_transport {
        query.push(("protocols", "http,bitswap".to_string()));
    }
    query
}

#[async_trait]
impl Fetcher for RetrievalServiceFetcher {
    fn upstream(&self) -> RetrievalUpstream {
        RetrievalUpstream::RetrievalService
    }

    async fn fetch(&self, request: &RetrievalRequest) -> Result<UpstreamResponse, EdgeError> {
        let secondary = self.secondary_fraction > 0.0
            && rand::random::<f64>() < self.secondary_fraction;
        let url = format!("{}{}", self.origin, request.upstream_path());
        debug!(cid = %request.id, secondary, "fetching from retrieval service");

        let response = self
            .client
            .get(&url)
            .query(&translated_query(request, secondary))
            .send()
            .await
            .map_err(|e| transport_error(e, UPSTREAM_NAME))?;

        match response.status().as_u16() {
            200 => {
                let mut headers: Vec<(&'static str, String)> =
                    passthrough_response_headers(response.headers())
                        .into_iter()
                        .filter(|(name, _)| *name != "cache-control")
                        .collect();
                headers.push(("cache-control", IMMUTABLE_CACHE_CONTROL.to_string()));
                Ok(UpstreamResponse {
                    upstream: RetrievalUpstream::RetrievalService,
                    status: 200,
                    headers,
                    body: http_body(response, UPSTREAM_NAME),
                })
            }
            // not-found during traversal is an upstream resolution failure,
            // not proof the object does not exist
            404 => Err(EdgeError::UpstreamUnavailable {
                upstream: UPSTREAM_NAME,
                reason: "object not resolvable during traversal".to_string(),
            }),
            504 => Err(EdgeError::UpstreamTimeout {
                upstream: UPSTREAM_NAME,
            }),
            status => Err(EdgeError::UpstreamUnavailable {
                upstream: UPSTREAM_NAME,
                reason: format!("status {status}"),
            }),
        }
    }
}
