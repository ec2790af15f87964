//! HTTP clients for the external collaborators.
//!
//! The interfaces live in `shared-types`; these are the production
//! implementations talking to the control plane and the log ingestor.
//! Tests substitute doubles at the trait seam.

use async_trait::async_trait;
use serde::Serialize;
use shared_types::{
    EdgeError, LogIngestor, NodeConfig, NodeRequirements, NodeStats, RegistrationService,
    RegistrationToken, RetrievalRecord,
};
use tracing::debug;

fn build_client(config: &NodeConfig, upstream: &'static str) -> Result<reqwest::Client, EdgeError> {
    reqwest::Client::builder()
        .user_agent(config.node_ua.clone())
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| EdgeError::UpstreamUnavailable {
            upstream,
            reason: e.to_string(),
        })
}

fn transport(upstream: &'static str) -> impl Fn(reqwest::Error) -> EdgeError {
    move |e| {
        if e.is_timeout() {
            EdgeError::UpstreamTimeout { upstream }
        } else {
            EdgeError::UpstreamUnavailable {
                upstream,
                reason: e.to_string(),
            }
        }
    }
}

fn check_status(response: &reqwest::Response, upstream: &'static str) -> Result<(), EdgeError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(EdgeError::UpstreamUnavailable {
            upstream,
            reason: format!("status {}", response.status().as_u16()),
        })
    }
}

/// Usage-record submission to the log ingestor.
pub struct HttpLogIngestor {
    client: reqwest::Client,
    url: String,
    node_id: String,
}

#[derive(Serialize)]
struct LogBatch<'a> {
    #[serde(rename = "nodeId")]
    node_id: &'a str,
    records: Vec<RetrievalRecord>,
}

impl HttpLogIngestor {
    pub fn new(config: &NodeConfig) -> Result<Self, EdgeError> {
        Ok(Self {
            client: build_client(config, "log ingestor")?,
            url: format!("{}/logs", config.log_ingestor_url),
            node_id: config.node_id.clone(),
        })
    }
}

#[async_trait]
impl LogIngestor for HttpLogIngestor {
    async fn submit(&self, batch: Vec<RetrievalRecord>) -> Result<(), EdgeError> {
        let count = batch.len();
        let response = self
            .client
            .post(&self.url)
            .json(&LogBatch {
                node_id: &self.node_id,
                records: batch,
            })
            .send()
            .await
            .map_err(transport("log ingestor"))?;
        check_status(&response, "log ingestor")?;
        debug!(count, "usage records accepted");
        Ok(())
    }
}

/// Control-plane registration client.
pub struct HttpRegistrationService {
    client: reqwest::Client,
    base: String,
    node_id: String,
    node_version: String,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    #[serde(rename = "nodeId")]
    node_id: &'a str,
    version: &'a str,
    stats: NodeStats,
}

impl HttpRegistrationService {
    pub fn new(config: &NodeConfig) -> Result<Self, EdgeError> {
        Ok(Self {
            client: build_client(config, "orchestrator")?,
            base: config.orchestrator_url.clone(),
            node_id: config.node_id.clone(),
            node_version: config.node_version.clone(),
        })
    }
}

#[async_trait]
impl RegistrationService for HttpRegistrationService {
    async fn fetch_requirements(&self) -> Result<NodeRequirements, EdgeError> {
        let response = self
            .client
            .get(format!("{}/requirements", self.base))
            .send()
            .await
            .map_err(transport("orchestrator"))?;
        check_status(&response, "orchestrator")?;
        response
            .json()
            .await
            .map_err(transport("orchestrator"))
    }

    async fn register(&self, stats: NodeStats) -> Result<RegistrationToken, EdgeError> {
        let response = self
            .client
            .post(format!("{}/register", self.base))
            .json(&RegisterBody {
                node_id: &self.node_id,
                version: &self.node_version,
                stats,
            })
            .send()
            .await
            .map_err(transport("orchestrator"))?;
        check_status(&response, "orchestrator")?;
        response
            .json()
            .await
            .map_err(transport("orchestrator"))
    }

    async fn deregister(&self) -> Result<(), EdgeError> {
        let response = self
            .client
            .delete(format!("{}/register/{}", self.base, self.node_id))
            .send()
            .await
            .map_err(transport("orchestrator"))?;
        check_status(&response, "orchestrator")
    }
}

/// Whether this machine satisfies the control plane's admission floor.
pub fn meets_requirements(requirements: &NodeRequirements, stats: &NodeStats) -> bool {
    stats.cpu_cores >= requirements.min_cpu_cores
        && stats.memory_gb >= requirements.min_memory_gb
        && stats.disk_gb >= requirements.min_disk_gb
}

/// Capability snapshot for registration. Memory and disk probing is
/// platform specific; deployments inject them through the environment.
pub fn local_stats() -> NodeStats {
    NodeStats {
        cpu_cores: std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1),
        memory_gb: env_u32("NODE_MEMORY_GB"),
        disk_gb: env_u32("NODE_DISK_GB"),
    }
}

fn env_u32(key: &str) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
