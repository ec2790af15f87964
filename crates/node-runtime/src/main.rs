//! # Stratus Edge Node
//!
//! Entry point: configuration, component wiring, registration with the
//! control plane, and the serve loop.
//!
//! ## Startup Sequence
//!
//! 1. Initialize structured logging (env-filter)
//! 2. Build configuration from the environment
//! 3. Wire components: block cache, peer router, fetchers, gateway
//! 4. Register with the orchestrator (when enabled)
//! 5. Serve until ctrl-c / SIGTERM, then drain and deregister

mod collaborators;

use std::sync::Arc;

use anyhow::{Context, Result};
use shared_types::{LogIngestor, NodeConfig, RegistrationService};
use st_02_block_cache::BlockCache;
use st_03_peer_router::PeerRouter;
use st_04_fetchers::{
    Fetcher, PeerTierFetcher, PublicGatewayFetcher, RetrievalServiceFetcher, UsageReporter,
};
use st_05_gateway::{build_router, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::collaborators::{
    local_stats, meets_requirements, HttpLogIngestor, HttpRegistrationService,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Arc::new(NodeConfig::from_env());
    banner(&config);

    let cache = Arc::new(BlockCache::new(config.block_cache_bytes));
    let peers = Arc::new(PeerRouter::new(&config));
    let ingestor: Arc<dyn LogIngestor> = Arc::new(HttpLogIngestor::new(&config)?);
    let reporter = UsageReporter::spawn(ingestor);

    let mut sources: Vec<Arc<dyn Fetcher>> = Vec::new();
    if config.peer_tier_enabled() {
        sources.push(Arc::new(PeerTierFetcher::new(Arc::clone(&peers))));
    }
    if let Some(origin) = &config.lassie_origin {
        sources.push(Arc::new(RetrievalServiceFetcher::new(
            &config,
            origin.clone(),
        )?));
        info!(origin = %origin, "retrieval service enabled");
    }
    sources.push(Arc::new(PublicGatewayFetcher::new(&config)?));

    let state = AppState::new(
        Arc::clone(&config),
        cache,
        peers,
        sources,
        reporter,
    )?;
    info!(fixture = %state.fixture.id(), "local test fixture ready");
    let app = build_router(state);

    let registration = HttpRegistrationService::new(&config)?;
    if config.registration_enabled {
        register(&registration).await;
    }

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    info!(port = config.port, "edge node listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve loop")?;

    if config.registration_enabled {
        if let Err(e) = registration.deregister().await {
            warn!(error = %e, "deregistration failed");
        }
    }
    info!("shutdown complete");
    Ok(())
}

fn banner(config: &NodeConfig) {
    info!("Stratus Edge Node");
    info!(node_id = %config.node_id, version = %config.node_version, network = ?config.network);
    match &config.wallet_address {
        Some(wallet) => info!(wallet = %wallet, "earnings will be sent to this wallet address"),
        None => warn!("no wallet address configured, earnings cannot be paid out"),
    }
    match &config.operator_email {
        Some(email) => info!(email = %email, "payment and update notices will be sent here"),
        None => warn!("no operator email set, setting one is strongly recommended"),
    }
}

async fn register(registration: &HttpRegistrationService) {
    let stats = local_stats();
    match registration.fetch_requirements().await {
        Ok(requirements) => {
            if !meets_requirements(&requirements, &stats) {
                warn!(
                    ?requirements,
                    ?stats,
                    "node is below the control plane's admission floor"
                );
            }
        }
        Err(e) => warn!(error = %e, "could not fetch admission requirements"),
    }
    match registration.register(stats).await {
        Ok(_token) => info!("registered with orchestrator"),
        Err(e) => warn!(error = %e, "registration failed, serving unregistered"),
    }
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
