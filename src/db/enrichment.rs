use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::DEFAULT_CATEGORY;
use crate::db::models::EnrichmentRow;
use crate::error::Result;
use crate::types::EnrichmentRecord;

/// Read side of the off-chain enrichment store.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Full table, keyed by lowercased market id.
    async fn read_all(&self) -> Result<HashMap<String, EnrichmentRecord>>;

    /// Resolve a canonical slug/url to its market id.
    async fn market_id_by_url(&self, url: &str) -> Result<Option<String>>;
}

pub struct SqliteEnrichmentStore {
    pool: SqlitePool,
}

impl SqliteEnrichmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrichmentSource for SqliteEnrichmentStore {
    async fn read_all(&self) -> Result<HashMap<String, EnrichmentRecord>> {
        let rows: Vec<EnrichmentRow> = sqlx::query_as(
            r#"
            SELECT id, liquidity_usd, incentive, odds, categories, pool_balances, url, updated_at
            FROM market_enrichment
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let newest = rows.iter().map(|r| r.updated_at).max();
        debug!(rows = rows.len(), newest_update = ?newest, "Enrichment rows read");

        Ok(rows
            .into_iter()
            .map(|row| (row.id.to_lowercase(), to_record(row)))
            .collect())
    }

    async fn market_id_by_url(&self, url: &str) -> Result<Option<String>> {
        let id: Option<(String,)> =
            sqlx::query_as("SELECT id FROM market_enrichment WHERE url = ? LIMIT 1")
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.map(|(id,)| id.to_lowercase()))
    }
}

fn to_record(row: EnrichmentRow) -> EnrichmentRecord {
    let mut categories: Vec<String> = json_column(&row.id, "categories", &row.categories);
    categories.retain(|c| !c.trim().is_empty());
    if categories.is_empty() {
        categories.push(DEFAULT_CATEGORY.to_string());
    }

    EnrichmentRecord {
        liquidity_usd: if row.liquidity_usd.is_finite() { row.liquidity_usd } else { 0.0 },
        incentive: if row.incentive.is_finite() { row.incentive } else { 0.0 },
        odds: json_column(&row.id, "odds", &row.odds),
        categories,
        pool_balances: json_column(&row.id, "pool_balances", &row.pool_balances),
        url: row.url,
    }
}

/// Decode a JSON text column, falling back to the empty value when it is malformed.
fn json_column<T: DeserializeOwned + Default>(id: &str, column: &str, raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        debug!(market_id = id, column, "Malformed enrichment column: {e}");
        T::default()
    })
}

/// Bulk enrichment read. `None` means the store could not be read, which is not
/// the same as an empty table.
pub async fn read_enrichment(
    source: &dyn EnrichmentSource,
) -> Option<HashMap<String, EnrichmentRecord>> {
    match source.read_all().await {
        Ok(map) => {
            debug!(count = map.len(), "Enrichment loaded");
            Some(map)
        }
        Err(e) => {
            warn!("Enrichment store unavailable: {e}");
            None
        }
    }
}
