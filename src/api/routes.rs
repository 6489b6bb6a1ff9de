use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::SNAPSHOT_KEY;
use crate::db::FingerprintCache;
use crate::error::AppError;
use crate::pipeline::aggregator::{AggregateQuery, Aggregator};
use crate::snapshot::BlobStore;
use crate::subgraph::MarketFilter;
use crate::types::{ChainId, MarketRequest, MarketsRequest, MergedMarket};

#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<FingerprintCache>,
    pub blob: Arc<dyn BlobStore>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
    /// Configured chains, used when a request names none.
    pub chain_ids: Vec<ChainId>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/markets", post(post_markets))
        .route("/market", post(post_market))
        .route("/snapshot", get(get_snapshot))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub chains: Vec<ChainId>,
    pub last_snapshot_at: Option<u64>,
    pub snapshot_markets: u64,
    pub consecutive_snapshot_failures: u64,
    pub cache_hit_rate: f64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn post_markets(
    State(state): State<ApiState>,
    payload: Result<Json<MarketsRequest>, JsonRejection>,
) -> Result<Json<Vec<MergedMarket>>, AppError> {
    let Json(req) = payload?;
    let chain_ids = requested_chains(&state, req.chains_list.as_deref())?;
    let key = FingerprintCache::fingerprint("markets", &req)?;

    let markets = state
        .cache
        .get_or_compute(&key, || live_markets(&state, &req, &chain_ids))
        .await?;
    Ok(Json(markets))
}

async fn live_markets(
    state: &ApiState,
    req: &MarketsRequest,
    chain_ids: &[ChainId],
) -> Result<Vec<MergedMarket>, AppError> {
    let mut filter = MarketFilter::from_request(req);

    if let Some(url) = req.url.as_deref().filter(|u| !u.trim().is_empty()) {
        let Some(id) = state.aggregator.resolve_url(url.trim()).await? else {
            return Ok(Vec::new());
        };
        if filter.id.as_deref().is_some_and(|wanted| wanted != id) {
            return Ok(Vec::new());
        }
        filter.id = Some(id);
    }

    let query = AggregateQuery {
        filter,
        statuses: req.market_status_list.clone().unwrap_or_default(),
        order_by: req.order_by,
        direction: req.order_direction.unwrap_or_default(),
    };
    state.aggregator.aggregate(chain_ids, &query).await
}

async fn post_market(
    State(state): State<ApiState>,
    payload: Result<Json<MarketRequest>, JsonRejection>,
) -> Result<Json<MergedMarket>, AppError> {
    let Json(req) = payload?;
    let id = req.id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let url = req.url.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if id.is_none() && url.is_none() {
        return Err(AppError::BadRequest("either id or url is required".to_string()));
    }
    let chain_ids = match req.chain_id {
        Some(c) => requested_chains(&state, Some(&[c][..]))?,
        None => state.chain_ids.clone(),
    };
    let key = FingerprintCache::fingerprint("market", &req)?;

    let market = state
        .cache
        .get_or_compute(&key, || async {
            let id = match id {
                Some(id) => id.to_string(),
                None => state
                    .aggregator
                    .resolve_url(url.unwrap_or_default())
                    .await?
                    .ok_or(AppError::NotFound)?,
            };
            let query = AggregateQuery { filter: MarketFilter::by_id(&id), ..Default::default() };
            state
                .aggregator
                .aggregate(&chain_ids, &query)
                .await?
                .into_iter()
                .next()
                .ok_or(AppError::NotFound)
        })
        .await?;
    Ok(Json(market))
}

async fn get_snapshot(State(state): State<ApiState>) -> Result<Response, AppError> {
    let body = state.blob.get(SNAPSHOT_KEY).await?.ok_or(AppError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_snapshot_at();
    let failures = state.health.consecutive_failures();
    Json(HealthResponse {
        status: if failures == 0 { "ok" } else { "degraded" },
        chains: state.chain_ids.clone(),
        last_snapshot_at: (last > 0).then_some(last),
        snapshot_markets: state.health.snapshot_markets(),
        consecutive_snapshot_failures: failures,
        cache_hit_rate: state.cache.stats.hit_rate(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}

/// Requested chains in request order without repeats, or every configured chain
/// when none are named.
fn requested_chains(
    state: &ApiState,
    requested: Option<&[ChainId]>,
) -> Result<Vec<ChainId>, AppError> {
    match requested {
        None => Ok(state.chain_ids.clone()),
        Some([]) => Err(AppError::BadRequest("chainsList must not be empty".to_string())),
        Some(ids) => {
            if let Some(unknown) = ids.iter().find(|id| !state.aggregator.supports(**id)) {
                return Err(AppError::UnsupportedChain(*unknown));
            }
            let mut seen = HashSet::new();
            Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
        }
    }
}
