//! Database row types matching `migrations/0001_init.sql`.
//! JSON columns are kept as text here and decoded by the readers.

#[derive(Debug, sqlx::FromRow)]
pub struct EnrichmentRow {
    pub id: String,
    pub liquidity_usd: f64,
    pub incentive: f64,
    pub odds: String,
    pub categories: String,
    pub pool_balances: String,
    pub url: String,
    pub updated_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CacheRow {
    pub computed_at: i64,
    pub value: String,
}
