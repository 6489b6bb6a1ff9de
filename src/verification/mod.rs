//! Market verification state from a curated registry.
//!
//! Two acquisition paths produce the same [`RegistryItem`] shape: the registry
//! subgraph ([`curate`]) and batched contract reads against a node ([`registry`]).
//! The resolver tries them in that order and never fails; an empty map means every
//! market defaults to `not_verified`.

pub mod curate;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{ChainId, VerificationRecord, VerificationStatus};

pub use curate::CurateSubgraphSource;
pub use registry::RegistryContractSource;

/// Raw item state as stored by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Absent,
    Registered,
    RegistrationRequested,
    ClearingRequested,
}

impl ItemStatus {
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Absent" => Some(ItemStatus::Absent),
            "Registered" => Some(ItemStatus::Registered),
            "RegistrationRequested" => Some(ItemStatus::RegistrationRequested),
            "ClearingRequested" => Some(ItemStatus::ClearingRequested),
            _ => None,
        }
    }

    /// Contract enum discriminant.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ItemStatus::Absent),
            1 => Some(ItemStatus::Registered),
            2 => Some(ItemStatus::RegistrationRequested),
            3 => Some(ItemStatus::ClearingRequested),
            _ => None,
        }
    }
}

/// One registry item reduced to what verification needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryItem {
    pub item_id: String,
    /// Lowercased market id taken from the item's metadata.
    pub market_id: String,
    pub status: ItemStatus,
    /// Whether the most recent request is disputed.
    pub disputed: bool,
    /// Whether a registration request on this item was resolved in the past.
    pub prior_registration_resolved: bool,
    /// End of the current request's challenge period (unix seconds).
    pub challenge_deadline: Option<u64>,
}

pub fn derive_status(item: &RegistryItem) -> VerificationStatus {
    match item.status {
        ItemStatus::Registered => VerificationStatus::Verified,
        ItemStatus::ClearingRequested if item.prior_registration_resolved => {
            VerificationStatus::Verified
        }
        ItemStatus::RegistrationRequested if item.disputed => VerificationStatus::Challenged,
        ItemStatus::RegistrationRequested => VerificationStatus::Verifying,
        _ => VerificationStatus::NotVerified,
    }
}

pub fn to_record(item: &RegistryItem) -> VerificationRecord {
    let status = derive_status(item);
    VerificationRecord {
        status,
        item_id: Some(item.item_id.clone()),
        deadline: match status {
            VerificationStatus::Verifying => item.challenge_deadline,
            _ => None,
        },
    }
}

/// Fold items into one record per market. When several items point at the same
/// market the best-priority status wins; ties keep the first item seen.
pub fn build_records(items: &[RegistryItem]) -> HashMap<String, VerificationRecord> {
    let mut records: HashMap<String, VerificationRecord> = HashMap::new();
    for item in items {
        let record = to_record(item);
        match records.get(&item.market_id) {
            Some(existing) if existing.status.priority() <= record.status.priority() => {}
            _ => {
                records.insert(item.market_id.clone(), record);
            }
        }
    }
    records
}

/// A source of registry items for one chain.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_items(&self) -> Result<Vec<RegistryItem>>;
}

/// Outcome of one acquisition attempt.
#[derive(Debug)]
pub enum RegistryFetch {
    Ok(Vec<RegistryItem>),
    Unavailable(String),
}

pub async fn attempt(source: &dyn RegistrySource, chain_id: ChainId) -> RegistryFetch {
    match source.fetch_items().await {
        Ok(items) => RegistryFetch::Ok(items),
        Err(e) => {
            warn!(chain_id, source = source.name(), "Registry source unavailable: {e}");
            RegistryFetch::Unavailable(e.to_string())
        }
    }
}

/// Per-chain verification resolver with a primary and a fallback source.
#[derive(Clone)]
pub struct VerificationResolver {
    chain_id: ChainId,
    primary: Option<Arc<dyn RegistrySource>>,
    fallback: Option<Arc<dyn RegistrySource>>,
}

impl VerificationResolver {
    pub fn new(
        chain_id: ChainId,
        primary: Option<Arc<dyn RegistrySource>>,
        fallback: Option<Arc<dyn RegistrySource>>,
    ) -> Self {
        Self { chain_id, primary, fallback }
    }

    /// Market id → verification record. Never fails.
    pub async fn resolve(&self) -> HashMap<String, VerificationRecord> {
        for source in [&self.primary, &self.fallback].into_iter().flatten() {
            if let RegistryFetch::Ok(items) = attempt(source.as_ref(), self.chain_id).await {
                let records = build_records(&items);
                debug!(
                    chain_id = self.chain_id,
                    source = source.name(),
                    items = items.len(),
                    markets = records.len(),
                    "Verification resolved"
                );
                return records;
            }
        }
        if self.primary.is_some() || self.fallback.is_some() {
            warn!(chain_id = self.chain_id, "All registry sources failed, markets default to not_verified");
        }
        HashMap::new()
    }
}
