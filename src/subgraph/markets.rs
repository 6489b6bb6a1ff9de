use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{MAX_PAGE_ROUNDS, PAGE_SIZE};
use crate::error::{AppError, Result};
use crate::subgraph::SubgraphClient;
use crate::types::{ChainId, MarketIndexEntity, MarketKind, MarketsRequest};

const MARKETS_QUERY: &str = r#"
query Markets($where: Market_filter, $first: Int!) {
  markets(where: $where, first: $first, orderBy: id, orderDirection: asc) {
    id
    type
    marketName
    outcomes
    wrappedTokens
    collateralToken
    collateralToken1
    collateralToken2
    parentMarket { id conditionId payoutReported payoutNumerators }
    parentOutcome
    conditionId
    templateId
    questions {
      question {
        id
        opening_ts
        timeout
        finalize_ts
        is_pending_arbitration
        best_answer
        bond
        min_bond
        arbitration_occurred
      }
    }
    openingTs
    finalizeTs
    lowerBound
    upperBound
    payoutReported
    payoutNumerators
    outcomesSupply
    blockTimestamp
    creator
  }
}
"#;

/// One chain's market index. Implementations return at most what the server
/// returns for a single `{where, first, orderBy: id asc}` request.
#[async_trait]
pub trait MarketIndex: Send + Sync {
    async fn fetch_page(&self, filter: &Value, first: usize) -> Result<IndexPage>;
}

/// One response from the index. `len` and `last_id` count every row the server
/// sent, including rows that failed to decode, so pagination advances past them.
#[derive(Debug, Default)]
pub struct IndexPage {
    pub markets: Vec<MarketIndexEntity>,
    pub len: usize,
    pub last_id: Option<String>,
}

impl From<Vec<MarketIndexEntity>> for IndexPage {
    fn from(markets: Vec<MarketIndexEntity>) -> Self {
        Self { len: markets.len(), last_id: markets.last().map(|m| m.id.clone()), markets }
    }
}

impl IndexPage {
    /// Decode rows one by one. A row that does not fit the entity shape is dropped
    /// with a warning; the rest of the page survives.
    pub fn decode(rows: Vec<Value>) -> Self {
        let len = rows.len();
        let last_id = rows
            .last()
            .and_then(|r| r.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let markets = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id").and_then(|v| v.as_str()).unwrap_or("?").to_string();
                match serde_json::from_value::<MarketIndexEntity>(row) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        warn!(market_id = %id, "Dropping undecodable market: {e}");
                        None
                    }
                }
            })
            .collect();

        Self { markets, len, last_id }
    }
}

pub struct SubgraphMarketIndex {
    client: SubgraphClient,
}

impl SubgraphMarketIndex {
    pub fn new(client: SubgraphClient) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct MarketsPage {
    markets: Vec<Value>,
}

#[async_trait]
impl MarketIndex for SubgraphMarketIndex {
    async fn fetch_page(&self, filter: &Value, first: usize) -> Result<IndexPage> {
        let page: MarketsPage = self
            .client
            .query(MARKETS_QUERY, json!({ "where": filter, "first": first }))
            .await?;
        let page = IndexPage::decode(page.markets);
        debug!(
            url = self.client.url(),
            rows = page.len,
            decoded = page.markets.len(),
            "Markets page fetched"
        );
        Ok(page)
    }
}

// ---------------------------------------------------------------------------
// Index-level filter
// ---------------------------------------------------------------------------

/// Request constraints the index can evaluate server-side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketFilter {
    pub kind: Option<MarketKind>,
    pub parent_market: Option<String>,
    pub market_name: Option<String>,
    pub creator: Option<String>,
    pub participant: Option<String>,
    pub id: Option<String>,
}

impl MarketFilter {
    pub fn from_request(req: &MarketsRequest) -> Self {
        Self {
            kind: req.kind,
            parent_market: req.parent_market.as_deref().map(normalize_address),
            market_name: req.market_name.clone().filter(|s| !s.trim().is_empty()),
            creator: req.creator.as_deref().map(normalize_address),
            participant: req.participant.as_deref().map(normalize_address),
            id: req.id.as_deref().map(normalize_address),
        }
    }

    pub fn by_id(id: &str) -> Self {
        Self { id: Some(normalize_address(id)), ..Default::default() }
    }

    fn clauses(&self) -> Vec<Value> {
        let mut clauses = Vec::new();
        if let Some(kind) = self.kind {
            clauses.push(json!({ "type": kind.to_string() }));
        }
        if let Some(parent) = &self.parent_market {
            clauses.push(json!({ "parentMarket": parent }));
        }
        if let Some(name) = &self.market_name {
            clauses.push(json!({ "marketName_contains_nocase": name }));
        }
        if let Some(creator) = &self.creator {
            clauses.push(json!({ "creator": creator }));
        }
        if let Some(p) = &self.participant {
            clauses.push(json!({ "or": [{ "creator": p }, { "participants_contains": [p] }] }));
        }
        if let Some(id) = &self.id {
            clauses.push(json!({ "id": id }));
        }
        clauses
    }

    /// The `where` object for one round: the caller's constraints intersected with
    /// `id > cursor`. Clauses are always combined under `and` so an `or` never shares
    /// a level with column filters.
    pub fn page_where(&self, cursor: Option<&str>) -> Value {
        let mut clauses = self.clauses();
        if let Some(c) = cursor {
            clauses.push(json!({ "id_gt": c }));
        }
        match clauses.len() {
            0 => Value::Object(Map::new()),
            1 => clauses.remove(0),
            _ => json!({ "and": clauses }),
        }
    }
}

fn normalize_address(s: &str) -> String {
    s.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Exhaustive pagination
// ---------------------------------------------------------------------------

/// Read every market on `chain_id` matching `filter`, paging by id cursor.
/// Any page failure fails the whole read; partial results are discarded.
pub async fn read_all_markets(
    index: &dyn MarketIndex,
    chain_id: ChainId,
    filter: &MarketFilter,
) -> Result<Vec<MarketIndexEntity>> {
    read_all_markets_with(index, chain_id, filter, PAGE_SIZE, MAX_PAGE_ROUNDS).await
}

async fn read_all_markets_with(
    index: &dyn MarketIndex,
    chain_id: ChainId,
    filter: &MarketFilter,
    page_size: usize,
    max_rounds: usize,
) -> Result<Vec<MarketIndexEntity>> {
    let mut markets = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut rounds = 0usize;

    loop {
        if rounds >= max_rounds {
            warn!(
                chain_id,
                rounds,
                count = markets.len(),
                "Market index page cap reached, stopping pagination"
            );
            break;
        }
        rounds += 1;

        let page = index
            .fetch_page(&filter.page_where(cursor.as_deref()), page_size)
            .await
            .map_err(|e| AppError::IndexUnavailable { chain_id, reason: e.to_string() })?;

        for market in page.markets {
            if seen.insert(market.id.clone()) {
                markets.push(market);
            }
        }

        if page.len < page_size {
            break;
        }

        match page.last_id {
            Some(id) if cursor.as_deref() != Some(id.as_str()) => cursor = Some(id),
            _ => {
                warn!(
                    chain_id,
                    rounds,
                    cursor = ?cursor,
                    "Market index cursor did not advance, stopping"
                );
                break;
            }
        }
    }

    debug!(chain_id, rounds, count = markets.len(), "Market index read complete");
    Ok(markets)
}
