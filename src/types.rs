use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

pub type ChainId = u64;

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Market index entity (wire representation from the markets subgraph)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketKind {
    Generic,
    Futarchy,
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketKind::Generic => write!(f, "Generic"),
            MarketKind::Futarchy => write!(f, "Futarchy"),
        }
    }
}

/// One market as known to a chain's index. Integer fields arrive as decimal strings
/// and are coerced by the merger.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIndexEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MarketKind,
    #[serde(default)]
    pub market_name: String,
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub wrapped_tokens: Vec<String>,
    pub collateral_token: String,
    pub collateral_token1: Option<String>,
    pub collateral_token2: Option<String>,
    pub parent_market: Option<RawParentMarket>,
    pub parent_outcome: String,
    pub condition_id: String,
    pub template_id: String,
    #[serde(default)]
    pub questions: Vec<RawMarketQuestion>,
    pub opening_ts: String,
    pub finalize_ts: String,
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
    pub payout_reported: bool,
    #[serde(default)]
    pub payout_numerators: Vec<String>,
    pub outcomes_supply: String,
    pub block_timestamp: String,
    pub creator: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParentMarket {
    pub id: String,
    pub condition_id: String,
    pub payout_reported: bool,
    #[serde(default)]
    pub payout_numerators: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMarketQuestion {
    pub question: RawQuestion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestion {
    pub id: String,
    pub opening_ts: String,
    pub timeout: String,
    pub finalize_ts: String,
    pub is_pending_arbitration: bool,
    pub best_answer: Option<String>,
    pub bond: String,
    pub min_bond: String,
    #[serde(default)]
    pub arbitration_occurred: bool,
}

// ---------------------------------------------------------------------------
// Enrichment (off-chain relational store)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub balance: f64,
}

/// One pool's two sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolBalance {
    pub token0: TokenBalance,
    pub token1: TokenBalance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRecord {
    pub liquidity_usd: f64,
    pub incentive: f64,
    pub odds: Vec<Option<f64>>,
    /// Never empty: rows without tags carry the default category.
    pub categories: Vec<String>,
    pub pool_balances: Vec<Option<PoolBalance>>,
    pub url: String,
}

impl EnrichmentRecord {
    /// A market has liquidity once at least one outcome is quoted.
    pub fn has_liquidity(&self) -> bool {
        self.odds.iter().any(|o| o.is_some())
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Verifying,
    Challenged,
    NotVerified,
}

impl VerificationStatus {
    /// Lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            VerificationStatus::Verified => 0,
            VerificationStatus::Verifying => 1,
            VerificationStatus::Challenged => 2,
            VerificationStatus::NotVerified => 3,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Verifying => "verifying",
            VerificationStatus::Challenged => "challenged",
            VerificationStatus::NotVerified => "not_verified",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Challenge-period end (unix seconds), only while `verifying`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
}

impl VerificationRecord {
    pub fn not_verified() -> Self {
        Self { status: VerificationStatus::NotVerified, item_id: None, deadline: None }
    }
}

// ---------------------------------------------------------------------------
// Merged market (the externally visible unit)
// ---------------------------------------------------------------------------

/// Lifecycle status derived from chain timestamps and payout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    NotOpen,
    Open,
    AnswerNotFinal,
    InDispute,
    PendingExecution,
    Closed,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketStatus::NotOpen => "not_open",
            MarketStatus::Open => "open",
            MarketStatus::AnswerNotFinal => "answer_not_final",
            MarketStatus::InDispute => "in_dispute",
            MarketStatus::PendingExecution => "pending_execution",
            MarketStatus::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentMarket {
    pub id: String,
    pub condition_id: String,
    pub payout_reported: bool,
    #[serde(with = "decimal::vec")]
    pub payout_numerators: Vec<U256>,
}

impl ParentMarket {
    /// Zero-value parent used for top-level markets.
    pub fn none() -> Self {
        Self {
            id: ZERO_ADDRESS.to_string(),
            condition_id: ZERO_BYTES32.to_string(),
            payout_reported: false,
            payout_numerators: Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.id == ZERO_ADDRESS
    }
}

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const ZERO_BYTES32: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub opening_ts: u64,
    pub timeout: u64,
    pub finalize_ts: u64,
    pub is_pending_arbitration: bool,
    pub best_answer: Option<String>,
    #[serde(with = "decimal")]
    pub bond: U256,
    #[serde(with = "decimal")]
    pub min_bond: U256,
    pub arbitration_occurred: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedMarket {
    pub id: String,
    pub chain_id: ChainId,
    #[serde(rename = "type")]
    pub kind: MarketKind,
    pub market_name: String,
    pub outcomes: Vec<String>,
    pub wrapped_tokens: Vec<String>,
    pub collateral_token: String,
    pub collateral_token1: Option<String>,
    pub collateral_token2: Option<String>,
    pub parent_market: ParentMarket,
    pub parent_outcome: u64,
    pub condition_id: String,
    pub template_id: u64,
    pub questions: Vec<Question>,
    pub opening_ts: u64,
    pub finalize_ts: u64,
    #[serde(with = "decimal")]
    pub lower_bound: U256,
    #[serde(with = "decimal")]
    pub upper_bound: U256,
    pub payout_reported: bool,
    #[serde(with = "decimal::vec")]
    pub payout_numerators: Vec<U256>,
    #[serde(with = "decimal")]
    pub outcomes_supply: U256,
    /// Creation time (unix seconds).
    pub block_timestamp: u64,
    pub creator: Option<String>,

    #[serde(rename = "liquidityUSD")]
    pub liquidity_usd: f64,
    pub incentive: f64,
    pub has_liquidity: bool,
    pub categories: Vec<String>,
    pub odds: Vec<Option<f64>>,
    pub pool_balance: Vec<Option<PoolBalance>>,
    pub url: String,

    pub verification: VerificationRecord,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBy {
    #[serde(rename = "liquidityUSD")]
    LiquidityUsd,
    #[serde(rename = "creationDate")]
    CreationDate,
    #[serde(rename = "openingTs")]
    OpeningTs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn sign(self) -> i8 {
        match self {
            OrderDirection::Asc => 1,
            OrderDirection::Desc => -1,
        }
    }
}

/// Body of `POST /markets`. Every field is optional; absent means "no constraint",
/// except `chainsList` which defaults to all configured chains and `orderDirection`
/// which defaults to descending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketsRequest {
    pub chains_list: Option<Vec<ChainId>>,
    #[serde(rename = "type")]
    pub kind: Option<MarketKind>,
    pub parent_market: Option<String>,
    pub market_name: Option<String>,
    pub market_status_list: Option<Vec<MarketStatus>>,
    pub creator: Option<String>,
    pub participant: Option<String>,
    pub order_by: Option<OrderBy>,
    pub order_direction: Option<OrderDirection>,
    pub id: Option<String>,
    pub url: Option<String>,
}

/// Body of `POST /market`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRequest {
    pub chain_id: Option<ChainId>,
    pub id: Option<String>,
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Decimal-string serde for 256-bit integers
// ---------------------------------------------------------------------------

/// Parse a base-10 integer string without precision loss.
pub fn parse_u256(s: &str) -> std::result::Result<U256, String> {
    let t = s.trim();
    if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("`{s}` is not a decimal integer"));
    }
    U256::from_str_radix(t, 10).map_err(|e| format!("`{s}` is not a uint256: {e}"))
}

pub mod decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_u256(&s).map_err(serde::de::Error::custom)
    }

    pub mod vec {
        use alloy_primitives::U256;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &[U256], s: S) -> Result<S::Ok, S::Error> {
            s.collect_seq(v.iter().map(|x| x.to_string()))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<U256>, D::Error> {
            Vec::<String>::deserialize(d)?
                .iter()
                .map(|s| super::super::parse_u256(s).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}
