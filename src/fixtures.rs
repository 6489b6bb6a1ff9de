//! Shared builders and upstream fakes for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::latency::LatencyStats;
use crate::db::enrichment::EnrichmentSource;
use crate::error::{AppError, Result};
use crate::pipeline::{Aggregator, ChainSources};
use crate::subgraph::{IndexPage, MarketIndex};
use crate::types::{
    ChainId, EnrichmentRecord, MarketIndexEntity, MarketKind, RawMarketQuestion, RawParentMarket,
    RawQuestion, VerificationRecord, VerificationStatus,
};
use crate::verification::{RegistryItem, RegistrySource, VerificationResolver};

/// An open, answered-never market with one question, opened at t=1000.
pub fn sample_entity(id: &str) -> MarketIndexEntity {
    MarketIndexEntity {
        id: id.to_string(),
        kind: MarketKind::Generic,
        market_name: format!("Market {id}"),
        outcomes: vec!["Yes".to_string(), "No".to_string(), "Invalid result".to_string()],
        wrapped_tokens: vec!["0x01".to_string(), "0x02".to_string(), "0x03".to_string()],
        collateral_token: "0xaf204776c7245bf4147c2612bf6e5972ee483701".to_string(),
        collateral_token1: None,
        collateral_token2: None,
        parent_market: None,
        parent_outcome: "0".to_string(),
        condition_id: "0xc0".to_string(),
        template_id: "2".to_string(),
        questions: vec![RawMarketQuestion {
            question: RawQuestion {
                id: format!("{id}-q0"),
                opening_ts: "1000".to_string(),
                timeout: "86400".to_string(),
                finalize_ts: "0".to_string(),
                is_pending_arbitration: false,
                best_answer: None,
                bond: "0".to_string(),
                min_bond: "10000000000000000000".to_string(),
                arbitration_occurred: false,
            },
        }],
        opening_ts: "1000".to_string(),
        finalize_ts: "0".to_string(),
        lower_bound: Some("0".to_string()),
        upper_bound: Some("0".to_string()),
        payout_reported: false,
        payout_numerators: Vec::new(),
        outcomes_supply: "1000000000000000000000".to_string(),
        block_timestamp: "900".to_string(),
        creator: Some("0xc4ea70".to_string()),
    }
}

/// Same as [`sample_entity`] but already resolved with a payout.
pub fn closed_entity(id: &str) -> MarketIndexEntity {
    let mut e = sample_entity(id);
    e.payout_reported = true;
    e.payout_numerators = vec!["1".to_string(), "0".to_string(), "0".to_string()];
    e.questions[0].question.finalize_ts = "2000".to_string();
    e.questions[0].question.best_answer = Some(
        "0x0000000000000000000000000000000000000000000000000000000000000000".to_string(),
    );
    e
}

/// A child market whose parent reported a payout of zero for its parent outcome.
pub fn worthless_child_entity(id: &str) -> MarketIndexEntity {
    let mut e = sample_entity(id);
    e.parent_market = Some(RawParentMarket {
        id: "0x9a9e".to_string(),
        condition_id: "0xc1".to_string(),
        payout_reported: true,
        payout_numerators: vec!["1".to_string(), "0".to_string()],
    });
    e.parent_outcome = "1".to_string();
    e
}

pub fn enrichment(liquidity_usd: f64) -> EnrichmentRecord {
    EnrichmentRecord {
        liquidity_usd,
        incentive: 0.0,
        odds: if liquidity_usd > 0.0 { vec![Some(0.5), Some(0.5), None] } else { Vec::new() },
        categories: vec!["misc".to_string()],
        pool_balances: Vec::new(),
        url: String::new(),
    }
}

pub fn verification(status: VerificationStatus) -> VerificationRecord {
    VerificationRecord { status, item_id: Some("0x17e1".to_string()), deadline: None }
}

// ---------------------------------------------------------------------------
// Upstream fakes
// ---------------------------------------------------------------------------

/// Serves every entity (optionally narrowed by an `id` clause) in a single page.
pub struct StaticIndex(pub Vec<MarketIndexEntity>);

#[async_trait]
impl MarketIndex for StaticIndex {
    async fn fetch_page(&self, filter: &Value, _first: usize) -> Result<IndexPage> {
        if filter.get("id_gt").is_some() {
            return Ok(IndexPage::default());
        }
        let wanted = filter.get("id").and_then(|v| v.as_str());
        let page: Vec<MarketIndexEntity> =
            self.0.iter().filter(|m| wanted.map_or(true, |id| m.id == id)).cloned().collect();
        Ok(page.into())
    }
}

pub struct DownIndex;

#[async_trait]
impl MarketIndex for DownIndex {
    async fn fetch_page(&self, _filter: &Value, _first: usize) -> Result<IndexPage> {
        Err(AppError::Subgraph("indexer unreachable".to_string()))
    }
}

pub struct StaticRegistry(pub Vec<RegistryItem>);

#[async_trait]
impl RegistrySource for StaticRegistry {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_items(&self) -> Result<Vec<RegistryItem>> {
        Ok(self.0.clone())
    }
}

/// `None` behaves like an unreachable store.
pub struct StaticEnrichment(pub Option<HashMap<String, EnrichmentRecord>>);

#[async_trait]
impl EnrichmentSource for StaticEnrichment {
    async fn read_all(&self) -> Result<HashMap<String, EnrichmentRecord>> {
        self.0.clone().ok_or(AppError::EnrichmentUnavailable)
    }

    async fn market_id_by_url(&self, url: &str) -> Result<Option<String>> {
        Ok(self.0.iter().flatten().find(|(_, r)| r.url == url).map(|(id, _)| id.clone()))
    }
}

pub fn static_chain(entities: Vec<MarketIndexEntity>, items: Vec<RegistryItem>) -> ChainSources {
    ChainSources {
        index: Arc::new(StaticIndex(entities)),
        verification: VerificationResolver::new(0, Some(Arc::new(StaticRegistry(items))), None),
    }
}

pub fn aggregator(
    chains: Vec<(ChainId, ChainSources)>,
    enrichment: Option<HashMap<String, EnrichmentRecord>>,
    require_enrichment: bool,
) -> Aggregator {
    aggregator_with_latency(chains, enrichment, require_enrichment, Arc::new(LatencyStats::new()))
}

/// Like [`aggregator`], recording into a caller-owned latency histogram.
pub fn aggregator_with_latency(
    chains: Vec<(ChainId, ChainSources)>,
    enrichment: Option<HashMap<String, EnrichmentRecord>>,
    require_enrichment: bool,
    latency: Arc<LatencyStats>,
) -> Aggregator {
    Aggregator::new(
        chains.into_iter().collect(),
        Arc::new(StaticEnrichment(enrichment)),
        require_enrichment,
        latency,
    )
}
