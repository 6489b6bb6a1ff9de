use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::config::SNAPSHOT_KEY;
use crate::error::Result;
use crate::pipeline::aggregator::{AggregateQuery, Aggregator};
use crate::snapshot::blob::BlobStore;
use crate::types::{now_secs, ChainId, MergedMarket};

/// Blob payload: the full unfiltered aggregation plus when it was taken.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub updated_at: u64,
    pub markets: Vec<MergedMarket>,
}

/// Periodically writes a full aggregation of every configured chain to the blob
/// store. Bypasses the request cache. A failed run leaves the previous snapshot.
pub struct SnapshotScheduler {
    aggregator: Arc<Aggregator>,
    blob: Arc<dyn BlobStore>,
    chain_ids: Vec<ChainId>,
    interval_secs: u64,
    health: Arc<HealthState>,
}

impl SnapshotScheduler {
    pub fn new(
        aggregator: Arc<Aggregator>,
        blob: Arc<dyn BlobStore>,
        chain_ids: Vec<ChainId>,
        interval_secs: u64,
        health: Arc<HealthState>,
    ) -> Self {
        Self { aggregator, blob, chain_ids, interval_secs, health }
    }

    pub async fn run(self) {
        // First tick fires immediately so a snapshot exists shortly after startup.
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    pub async fn run_once(&self) {
        match self.snapshot().await {
            Ok(count) => {
                self.health.record_snapshot(now_secs(), count as u64);
                info!(count, chains = ?self.chain_ids, "Snapshot written");
            }
            Err(e) => {
                let failures = self.health.record_snapshot_failure();
                error!(consecutive_failures = failures, "Snapshot failed: {e}");
            }
        }
    }

    async fn snapshot(&self) -> Result<usize> {
        let markets = self
            .aggregator
            .aggregate(&self.chain_ids, &AggregateQuery::default())
            .await?;
        let count = markets.len();
        let body = serde_json::to_vec(&Snapshot { updated_at: now_secs(), markets })?;
        self.blob.put(SNAPSHOT_KEY, body).await?;
        Ok(count)
    }
}
