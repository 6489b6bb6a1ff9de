use std::str::FromStr;

use alloy_primitives::Address;

use crate::error::{AppError, Result};

/// Markets requested per subgraph round.
pub const PAGE_SIZE: usize = 1000;

/// Hard cap on pagination rounds per chain (max 20,000 markets).
pub const MAX_PAGE_ROUNDS: usize = 20;

/// Registry items resolved per multicall batch on the contract fallback path.
pub const REGISTRY_BATCH_SIZE: usize = 100;

/// Timeout applied to every outbound subgraph / RPC request (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Blob key the snapshot is written under, overwritten wholesale on every run.
pub const SNAPSHOT_KEY: &str = "markets.json";

/// Fingerprint cache freshness window (seconds).
pub const CACHE_TTL_SECS: u64 = 300;

/// Snapshot refresh interval (seconds).
pub const SNAPSHOT_INTERVAL_SECS: u64 = 900;

/// Canonical Multicall3 deployment, identical on every supported chain.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Category assigned to markets with no enrichment tags.
pub const DEFAULT_CATEGORY: &str = "misc";

/// Per-chain upstream endpoints.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Markets subgraph (MARKETS_SUBGRAPH_URL_<id>)
    pub markets_subgraph_url: String,
    /// Curated-registry subgraph (CURATE_SUBGRAPH_URL_<id>)
    pub curate_subgraph_url: Option<String>,
    /// Registry contract (REGISTRY_ADDRESS_<id>)
    pub registry_address: Option<Address>,
    /// JSON-RPC node used for the registry contract fallback (RPC_URL_<id>)
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub snapshot_dir: String,
    pub chains: Vec<ChainConfig>,
    pub multicall_address: Address,
    /// Metadata label whose value is the verified market id (REGISTRY_MARKET_LABEL)
    pub registry_market_label: String,
    /// Column labels of contract-encoded registry items, in order (REGISTRY_COLUMNS)
    pub registry_columns: Vec<String>,
    pub cache_ttl_secs: u64,
    pub snapshot_interval_secs: u64,
    /// Fail aggregations when the enrichment store cannot be read (REQUIRE_ENRICHMENT)
    pub require_enrichment: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let chain_ids: Vec<u64> = std::env::var("CHAINS")
            .unwrap_or_else(|_| "100".to_string())
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| AppError::Config(format!("CHAINS entry `{s}` is not a chain id")))
            })
            .collect::<Result<_>>()?;

        if chain_ids.is_empty() {
            return Err(AppError::Config("CHAINS must name at least one chain".to_string()));
        }

        let chains = chain_ids
            .into_iter()
            .map(chain_from_env)
            .collect::<Result<Vec<_>>>()?;

        let multicall_address = parse_address(
            "MULTICALL_ADDRESS",
            &std::env::var("MULTICALL_ADDRESS").unwrap_or_else(|_| MULTICALL3_ADDRESS.to_string()),
        )?;

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "aggregator.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            snapshot_dir: std::env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "snapshots".to_string()),
            chains,
            multicall_address,
            registry_market_label: std::env::var("REGISTRY_MARKET_LABEL")
                .unwrap_or_else(|_| "Market".to_string()),
            registry_columns: std::env::var("REGISTRY_COLUMNS")
                .unwrap_or_else(|_| "Market,Title".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(CACHE_TTL_SECS),
            snapshot_interval_secs: std::env::var("SNAPSHOT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(SNAPSHOT_INTERVAL_SECS),
            require_enrichment: std::env::var("REQUIRE_ENRICHMENT")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(false),
        })
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        self.chains.iter().map(|c| c.chain_id).collect()
    }
}

fn chain_from_env(chain_id: u64) -> Result<ChainConfig> {
    let markets_subgraph_url = std::env::var(format!("MARKETS_SUBGRAPH_URL_{chain_id}"))
        .map_err(|_| {
            AppError::Config(format!("MARKETS_SUBGRAPH_URL_{chain_id} must be set for chain {chain_id}"))
        })?;

    let registry_address = match std::env::var(format!("REGISTRY_ADDRESS_{chain_id}")) {
        Ok(v) if !v.trim().is_empty() => Some(parse_address(&format!("REGISTRY_ADDRESS_{chain_id}"), &v)?),
        _ => None,
    };

    Ok(ChainConfig {
        chain_id,
        markets_subgraph_url,
        curate_subgraph_url: non_empty_var(&format!("CURATE_SUBGRAPH_URL_{chain_id}")),
        registry_address,
        rpc_url: non_empty_var(&format!("RPC_URL_{chain_id}")),
    })
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|_| AppError::Config(format!("{key} must be a 20-byte hex address")))
}
