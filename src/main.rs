mod api;
mod config;
mod db;
mod error;
mod pipeline;
mod snapshot;
mod subgraph;
mod types;
mod verification;

#[cfg(test)]
mod fixtures;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{ChainConfig, Config, HTTP_TIMEOUT_SECS};
use crate::db::{FingerprintCache, SqliteCacheStore, SqliteEnrichmentStore};
use crate::error::Result;
use crate::pipeline::{Aggregator, ChainSources};
use crate::snapshot::{FsBlobStore, SnapshotScheduler};
use crate::subgraph::{SubgraphClient, SubgraphMarketIndex};
use crate::verification::{
    CurateSubgraphSource, RegistryContractSource, RegistrySource, VerificationResolver,
};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::open_pool(&cfg.db_path).await?;

    // --- Upstreams ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?;

    let chains: HashMap<_, _> = cfg
        .chains
        .iter()
        .map(|chain| (chain.chain_id, chain_sources(&cfg, chain, &http)))
        .collect();

    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());
    let aggregator = Arc::new(Aggregator::new(
        chains,
        Arc::new(SqliteEnrichmentStore::new(pool.clone())),
        cfg.require_enrichment,
        Arc::clone(&latency),
    ));
    let blob = Arc::new(FsBlobStore::new(&cfg.snapshot_dir));

    // --- Snapshot scheduler (background) ---
    let scheduler = SnapshotScheduler::new(
        Arc::clone(&aggregator),
        blob.clone(),
        cfg.chain_ids(),
        cfg.snapshot_interval_secs,
        Arc::clone(&health),
    );
    tokio::spawn(async move { scheduler.run().await });
    info!(
        interval_secs = cfg.snapshot_interval_secs,
        dir = %cfg.snapshot_dir,
        "Snapshot scheduler started"
    );

    // --- HTTP API server ---
    let cache = FingerprintCache::new(Arc::new(SqliteCacheStore::new(pool.clone())), cfg.cache_ttl_secs);
    let api_state = ApiState {
        aggregator,
        cache: Arc::new(cache),
        blob,
        latency,
        health,
        chain_ids: cfg.chain_ids(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Market index plus whichever registry paths are configured for one chain.
fn chain_sources(cfg: &Config, chain: &ChainConfig, http: &reqwest::Client) -> ChainSources {
    let index = SubgraphMarketIndex::new(SubgraphClient::new(http.clone(), &chain.markets_subgraph_url));

    let primary: Option<Arc<dyn RegistrySource>> =
        match (&chain.curate_subgraph_url, chain.registry_address) {
            (Some(url), Some(registry)) => Some(Arc::new(CurateSubgraphSource::new(
                SubgraphClient::new(http.clone(), url),
                &registry.to_string(),
                &cfg.registry_market_label,
            ))),
            _ => None,
        };

    let fallback: Option<Arc<dyn RegistrySource>> = match (&chain.rpc_url, chain.registry_address) {
        (Some(rpc), Some(registry)) => Some(Arc::new(RegistryContractSource::new(
            http.clone(),
            rpc,
            registry,
            cfg.multicall_address,
            cfg.registry_columns.clone(),
            &cfg.registry_market_label,
        ))),
        _ => None,
    };

    if primary.is_none() && fallback.is_none() {
        warn!(chain_id = chain.chain_id, "No registry configured, markets will be not_verified");
    }
    info!(
        chain_id = chain.chain_id,
        subgraph = %chain.markets_subgraph_url,
        curate = primary.is_some(),
        contract = fallback.is_some(),
        "Chain configured"
    );

    ChainSources {
        index: Arc::new(index),
        verification: VerificationResolver::new(chain.chain_id, primary, fallback),
    }
}
