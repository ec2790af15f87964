//! The public-gateway fallback source.
//!
//! Plain reverse-proxy semantics: forward the client's negotiated format
//! and conditional hints, relay the allow-listed response headers, and
//! stamp the immutable cache directive on success.

use async_trait::async_trait;
use shared_types::{EdgeError, NodeConfig, ResponseFormat, RetrievalRequest, RetrievalUpstream};
use tracing::debug;

use crate::headers::{passthrough_response_headers, IMMUTABLE_CACHE_CONTROL};
use crate::{http_body, transport_error, Fetcher, UpstreamResponse};

const UPSTREAM_NAME: &str = "public gateway";

pub struct PublicGatewayFetcher {
    client: reqwest::Client,
    origin: String,
}

impl PublicGatewayFetcher {
    pub fn new(config: &NodeConfig) -> Result<Self, EdgeError> {
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
            origin: config.ipfs_gateway_origin.clone(),
        })
    }
}

#[async_trait]
impl Fetcher for PublicGatewayFetcher {
    fn upstream(&self) -> RetrievalUpstream {
        RetrievalUpstream::PublicGateway
    }

    async fn fetch(&self, request: &RetrievalRequest) -> Result<UpstreamResponse, EdgeError> {
        let url = format!("{}{}", self.origin, request.upstream_path());
        debug!(cid = %request.id, "fetching from public gateway");

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(format) = request.format.query_value() {
            query.push(("format", format.to_string()));
        }
        if let Some(filename) = &request.filename {
            query.push(("filename", filename.clone()));
        }

        let mut builder = self.client.get(&url).query(&query);
        if let Some(cache_control) = &request.cache_control {
            builder = builder.header("cache-control", cache_control);
        }
        // some fronting layers consume if-none-match, so clients smuggle it
        // through under a prefixed name
        if let Some(etag) = &request.if_none_match {
            builder = builder.header("if-none-match", etag);
        }

        let response = builder
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
                if request.format != ResponseFormat::Car
                    && !headers.iter().any(|(name, _)| *name == "accept-ranges")
                {
                    headers.push(("accept-ranges", "bytes".to_string()));
                }
                Ok(UpstreamResponse {
                    upstream: RetrievalUpstream::PublicGateway,
                    status: 200,
                    headers,
                    body: http_body(response, UPSTREAM_NAME),
                })
            }
            304 => Ok(UpstreamResponse {
                upstream: RetrievalUpstream::PublicGateway,
                status: 304,
                headers: passthrough_response_headers(response.headers()),
                body: Box::pin(futures::stream::empty()),
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
