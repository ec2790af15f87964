//! Immutable node configuration.
//!
//! Built exactly once at process start from the environment and passed by
//! `Arc` into every component that needs it. Components never read the
//! environment themselves.

use std::time::Duration;

use uuid::Uuid;

/// Which network tier this deployment participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTier {
    Main,
    Test,
    Local,
}

impl NetworkTier {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "main" => NetworkTier::Main,
            "test" => NetworkTier::Test,
            _ => NetworkTier::Local,
        }
    }
}

/// Process-wide configuration, immutable after construction.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Network tier; gates peer-tier participation.
    pub network: NetworkTier,
    /// Listen port for the cache-miss callback server.
    pub port: u16,
    /// Stable node identity.
    pub node_id: String,
    /// Version string echoed in the node-version response header.
    pub node_version: String,
    /// User-Agent sent to upstreams.
    pub node_ua: String,
    /// Control-plane registration service origin.
    pub orchestrator_url: String,
    /// Usage-record ingestion endpoint.
    pub log_ingestor_url: String,
    /// Content-retrieval service origin; `None` disables that source.
    pub lassie_origin: Option<String>,
    /// Public gateway fallback origin.
    pub ipfs_gateway_origin: String,
    /// Block cache budget in bytes (aggregate payload size, not entry count).
    pub block_cache_bytes: usize,
    /// How many closest peers a solicitation fans out to.
    pub solicitation_fanout: usize,
    /// How long to wait for a peer-tier response before moving on.
    pub solicitation_timeout: Duration,
    /// Notify peers but do not wait for a response (best-effort telemetry
    /// deployments).
    pub peer_fire_and_forget: bool,
    /// Fraction of retrieval-service requests that additionally enable the
    /// slower-but-more-available secondary transport.
    pub secondary_transport_fraction: f64,
    /// Overall deadline for an upstream fetch, connect through full body.
    pub upstream_timeout: Duration,
    /// Keep-alive connection budget per upstream host.
    pub max_idle_connections_per_host: usize,
    /// Whether to register with the control plane on startup.
    pub registration_enabled: bool,
    /// Payout wallet address, echoed in the startup banner.
    pub wallet_address: Option<String>,
    /// Operator contact for payment and update notices.
    pub operator_email: Option<String>,
}

/// Development fallback version, mirrored by deployments that do not inject
/// a release tag.
pub const DEV_VERSION: &str = "0_dev";

impl NodeConfig {
    /// Build configuration from the environment. Call once, at startup.
    pub fn from_env() -> Self {
        let network = NetworkTier::parse(&env_or("NETWORK", "local"));
        let node_version = pinned_version(&env_or("NODE_VERSION", DEV_VERSION));
        let fire_and_forget = match std::env::var("L2_FIRE_AND_FORGET") {
            Ok(v) => v == "true",
            Err(_) => network == NetworkTier::Test,
        };

        Self {
            network,
            port: parse_or("PORT", 10361),
            node_id: env_or("NODE_ID", &Uuid::new_v4().to_string()),
            node_ua: format!("Stratus/{node_version}"),
            node_version,
            orchestrator_url: std::env::var("ORCHESTRATOR_URL")
                .unwrap_or_else(|_| default_orchestrator(network).to_string()),
            log_ingestor_url: env_or("LOG_INGESTOR_URL", "http://localhost:10364"),
            lassie_origin: std::env::var("LASSIE_ORIGIN").ok().filter(|s| !s.is_empty()),
            ipfs_gateway_origin: env_or("IPFS_GATEWAY_ORIGIN", "https://ipfs.io"),
            block_cache_bytes: parse_or("BLOCK_CACHE_BYTES", 1024 * 1024 * 1024),
            solicitation_fanout: parse_or("SOLICITATION_FANOUT", 3),
            solicitation_timeout: Duration::from_millis(parse_or(
                "SOLICITATION_TIMEOUT_MS",
                10_000,
            )),
            peer_fire_and_forget: fire_and_forget,
            secondary_transport_fraction: parse_or("SECONDARY_TRANSPORT_FRACTION", 0.0),
            upstream_timeout: Duration::from_millis(parse_or("UPSTREAM_TIMEOUT_MS", 120_000)),
            max_idle_connections_per_host: default_pool_size(),
            registration_enabled: std::env::var("ORCHESTRATOR_REGISTRATION")
                .map(|v| v == "true")
                .unwrap_or(true),
            wallet_address: std::env::var("WALLET_ADDRESS").ok().filter(|s| !s.is_empty()),
            operator_email: std::env::var("NODE_OPERATOR_EMAIL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Whether the peer tier is a candidate source on this deployment.
    pub fn peer_tier_enabled(&self) -> bool {
        self.network != NetworkTier::Main
    }

    /// A configuration suitable for tests: local tier, short timeouts, no
    /// registration, no retrieval service unless a test injects one.
    pub fn for_tests() -> Self {
        Self {
            network: NetworkTier::Local,
            port: 0,
            node_id: Uuid::new_v4().to_string(),
            node_version: DEV_VERSION.to_string(),
            node_ua: format!("Stratus/{DEV_VERSION}"),
            orchestrator_url: "http://localhost:10365".to_string(),
            log_ingestor_url: "http://localhost:10364".to_string(),
            lassie_origin: None,
            ipfs_gateway_origin: "http://localhost:10380".to_string(),
            block_cache_bytes: 16 * 1024 * 1024,
            solicitation_fanout: 3,
            solicitation_timeout: Duration::from_millis(200),
            peer_fire_and_forget: false,
            secondary_transport_fraction: 0.0,
            upstream_timeout: Duration::from_secs(5),
            max_idle_connections_per_host: 4,
            registration_enabled: false,
            wallet_address: None,
            operator_email: None,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_orchestrator(network: NetworkTier) -> &'static str {
    match network {
        NetworkTier::Main => "https://orchestrator.stratus.network",
        NetworkTier::Test => "https://orchestrator.test.stratus.network",
        NetworkTier::Local => "http://localhost:10365",
    }
}

/// Connection budget per upstream host, split across CPU-parallel workers.
fn default_pool_size() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (100 / cpus).max(1)
}

/// Release tags look like `<epoch>_<commit>`; keep the epoch plus a short
/// commit prefix so the header stays bounded.
fn pinned_version(version: &str) -> String {
    match version.find('_') {
        Some(idx) => version[..(idx + 8).min(version.len())].to_string(),
        None => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_tier_parse() {
        assert_eq!(NetworkTier::parse("main"), NetworkTier::Main);
        assert_eq!(NetworkTier::parse(" TEST "), NetworkTier::Test);
        assert_eq!(NetworkTier::parse("anything"), NetworkTier::Local);
    }

    #[test]
    fn pinned_version_truncates_commit() {
        assert_eq!(pinned_version("0_dev"), "0_dev");
        assert_eq!(
            pinned_version("1023_abcdef0123456789"),
            "1023_abcdef0123456789"[..12].to_string()
        );
        assert_eq!(pinned_version("plain"), "plain");
    }

    #[test]
    fn peer_tier_gating() {
        let mut config = NodeConfig::for_tests();
        assert!(config.peer_tier_enabled());
        config.network = NetworkTier::Main;
        assert!(!config.peer_tier_enabled());
    }
}
