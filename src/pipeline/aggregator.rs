use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::try_join_all;
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::db::enrichment::{read_enrichment, EnrichmentSource};
use crate::error::{AppError, Result};
use crate::pipeline::{merge, market_status, sort_markets};
use crate::subgraph::{read_all_markets, MarketFilter, MarketIndex};
use crate::types::{
    now_secs, ChainId, MarketIndexEntity, MarketStatus, MergedMarket, OrderBy, OrderDirection,
    VerificationRecord,
};
use crate::verification::VerificationResolver;

/// Upstreams for one chain.
#[derive(Clone)]
pub struct ChainSources {
    pub index: Arc<dyn MarketIndex>,
    pub verification: VerificationResolver,
}

/// Everything a caller can constrain on one aggregation.
#[derive(Debug, Clone, Default)]
pub struct AggregateQuery {
    pub filter: MarketFilter,
    /// Applied after merge. Empty means no constraint.
    pub statuses: Vec<MarketStatus>,
    pub order_by: Option<OrderBy>,
    pub direction: OrderDirection,
}

/// Fan-out over chains, merge with enrichment and verification, rank.
pub struct Aggregator {
    chains: HashMap<ChainId, ChainSources>,
    enrichment: Arc<dyn EnrichmentSource>,
    require_enrichment: bool,
    latency: Arc<LatencyStats>,
}

struct ChainRead {
    chain_id: ChainId,
    entities: Vec<MarketIndexEntity>,
    verification: HashMap<String, VerificationRecord>,
}

impl Aggregator {
    pub fn new(
        chains: HashMap<ChainId, ChainSources>,
        enrichment: Arc<dyn EnrichmentSource>,
        require_enrichment: bool,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self { chains, enrichment, require_enrichment, latency }
    }

    pub fn supports(&self, chain_id: ChainId) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// Market id for a canonical url, via the enrichment store.
    pub async fn resolve_url(&self, url: &str) -> Result<Option<String>> {
        self.enrichment.market_id_by_url(url).await
    }

    /// All markets on `chain_ids` matching `query`, ranked.
    ///
    /// Any chain's index failure fails the whole call. Verification failures
    /// degrade to `not_verified`. Markets that fail to merge are dropped.
    pub async fn aggregate(
        &self,
        chain_ids: &[ChainId],
        query: &AggregateQuery,
    ) -> Result<Vec<MergedMarket>> {
        let sources = chain_ids
            .iter()
            .map(|id| {
                self.chains
                    .get(id)
                    .map(|s| (*id, s))
                    .ok_or(AppError::UnsupportedChain(*id))
            })
            .collect::<Result<Vec<_>>>()?;

        let started = Instant::now();
        let chain_reads =
            try_join_all(sources.iter().map(|(id, s)| read_chain(*id, s, &query.filter)));
        let (enrichment, chain_reads) =
            tokio::join!(read_enrichment(self.enrichment.as_ref()), chain_reads);
        let chain_reads = chain_reads?;

        let enrichment = match enrichment {
            Some(map) => map,
            None if self.require_enrichment => return Err(AppError::EnrichmentUnavailable),
            None => HashMap::new(),
        };

        let mut markets = Vec::new();
        let mut dropped = 0usize;
        for read in chain_reads {
            for entity in &read.entities {
                let key = entity.id.to_lowercase();
                let verification = read.verification.get(&key);
                match merge(read.chain_id, entity, enrichment.get(&key), verification) {
                    Ok(m) => markets.push(m),
                    Err(e) => {
                        dropped += 1;
                        warn!(
                            chain_id = read.chain_id,
                            market_id = %entity.id,
                            "Dropping malformed market: {e}"
                        );
                    }
                }
            }
        }

        let now = now_secs();
        if !query.statuses.is_empty() {
            markets.retain(|m| {
                market_status(m, now).map_or(false, |s| query.statuses.contains(&s))
            });
        }
        sort_markets(&mut markets, query.order_by, query.direction, now);

        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        info!(
            chains = ?chain_ids,
            count = markets.len(),
            dropped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Aggregation complete"
        );
        Ok(markets)
    }
}

async fn read_chain(
    chain_id: ChainId,
    sources: &ChainSources,
    filter: &MarketFilter,
) -> Result<ChainRead> {
    let (entities, verification) = tokio::join!(
        read_all_markets(sources.index.as_ref(), chain_id, filter),
        sources.verification.resolve()
    );
    let entities = entities?;
    debug!(chain_id, markets = entities.len(), verified = verification.len(), "Chain read");
    Ok(ChainRead { chain_id, entities, verification })
}
