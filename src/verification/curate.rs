use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{MAX_PAGE_ROUNDS, PAGE_SIZE};
use crate::error::Result;
use crate::subgraph::SubgraphClient;
use crate::verification::{ItemStatus, RegistryItem, RegistrySource};

const ITEMS_QUERY: &str = r#"
query RegistryItems($registry: String!, $first: Int!, $cursor: String!) {
  litems(
    first: $first
    orderBy: id
    orderDirection: asc
    where: { registryAddress: $registry, id_gt: $cursor }
  ) {
    id
    itemID
    status
    disputed
    requests(orderBy: submissionTime, orderDirection: desc) {
      requestType
      resolved
      disputed
      submissionTime
    }
    metadata { props { label value } }
  }
  lregistry(id: $registry) { challengePeriodDuration }
}
"#;

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    litems: Vec<CurateItem>,
    lregistry: Option<CurateRegistry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurateRegistry {
    challenge_period_duration: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CurateItem {
    /// Subgraph entity id, the pagination cursor.
    #[serde(default)]
    id: String,
    #[serde(rename = "itemID")]
    item_id: String,
    status: String,
    #[serde(default)]
    disputed: bool,
    #[serde(default)]
    requests: Vec<CurateRequest>,
    metadata: Option<CurateMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurateRequest {
    request_type: String,
    resolved: bool,
    #[serde(default)]
    disputed: bool,
    submission_time: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CurateMetadata {
    #[serde(default)]
    props: Vec<CurateProp>,
}

#[derive(Debug, Clone, Deserialize)]
struct CurateProp {
    label: String,
    value: Option<String>,
}

/// Registry items from the curated-registry subgraph, paged by entity id.
pub struct CurateSubgraphSource {
    client: SubgraphClient,
    registry: String,
    market_label: String,
}

impl CurateSubgraphSource {
    pub fn new(client: SubgraphClient, registry: &str, market_label: impl Into<String>) -> Self {
        Self {
            client,
            registry: registry.to_lowercase(),
            market_label: market_label.into(),
        }
    }
}

#[async_trait]
impl RegistrySource for CurateSubgraphSource {
    fn name(&self) -> &'static str {
        "curate-subgraph"
    }

    async fn fetch_items(&self) -> Result<Vec<RegistryItem>> {
        let (litems, challenge_period) =
            read_all_items(PAGE_SIZE, MAX_PAGE_ROUNDS, |cursor| async move {
                self.client
                    .query::<ItemsResponse>(
                        ITEMS_QUERY,
                        json!({ "registry": self.registry, "first": PAGE_SIZE, "cursor": cursor }),
                    )
                    .await
            })
            .await?;

        let items: Vec<RegistryItem> = litems
            .iter()
            .filter_map(|item| to_registry_item(item, &self.market_label, challenge_period))
            .collect();

        debug!(
            registry = %self.registry,
            total = litems.len(),
            usable = items.len(),
            "Curate items fetched"
        );
        Ok(items)
    }
}

/// Every item behind `fetch`, paged by id cursor until a short page, a cursor
/// that does not advance, or `max_rounds`. Also returns the registry's challenge
/// period from the first page that carries it.
async fn read_all_items<F, Fut>(
    page_size: usize,
    max_rounds: usize,
    mut fetch: F,
) -> Result<(Vec<CurateItem>, Option<u64>)>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ItemsResponse>>,
{
    let mut items = Vec::new();
    let mut challenge_period = None;
    let mut cursor = String::new();

    for round in 1..=max_rounds {
        let page = fetch(cursor.clone()).await?;
        if challenge_period.is_none() {
            challenge_period = page
                .lregistry
                .and_then(|r| r.challenge_period_duration.parse::<u64>().ok());
        }

        let page_len = page.litems.len();
        let last_id = page.litems.last().map(|i| i.id.clone());
        items.extend(page.litems);

        if page_len < page_size {
            return Ok((items, challenge_period));
        }
        match last_id {
            Some(id) if id > cursor => cursor = id,
            _ => {
                warn!(round, cursor = %cursor, "Curate item cursor did not advance, stopping");
                return Ok((items, challenge_period));
            }
        }
    }

    warn!(rounds = max_rounds, count = items.len(), "Curate item page cap reached, stopping");
    Ok((items, challenge_period))
}

/// `None` when the item has an unknown status or no market id under `label`.
fn to_registry_item(
    item: &CurateItem,
    label: &str,
    challenge_period: Option<u64>,
) -> Option<RegistryItem> {
    let status = ItemStatus::from_label(&item.status)?;

    let market_id = item
        .metadata
        .as_ref()?
        .props
        .iter()
        .find(|p| p.label.eq_ignore_ascii_case(label))
        .and_then(|p| p.value.as_deref())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())?;

    // Requests arrive newest first.
    let latest = item.requests.first();
    let disputed = item.disputed || latest.map_or(false, |r| r.disputed);
    let prior_registration_resolved = item
        .requests
        .iter()
        .find(|r| r.request_type == "RegistrationRequested")
        .map_or(false, |r| r.resolved);

    let challenge_deadline = match (status, latest, challenge_period) {
        (ItemStatus::RegistrationRequested, Some(req), Some(period)) => req
            .submission_time
            .parse::<u64>()
            .ok()
            .map(|t| t.saturating_add(period)),
        _ => None,
    };

    Some(RegistryItem {
        item_id: item.item_id.clone(),
        market_id,
        status,
        disputed,
        prior_registration_resolved,
        challenge_deadline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registered(n: usize) -> CurateItem {
        CurateItem {
            id: format!("0x{n:06x}@registry"),
            item_id: format!("0x{n:06x}"),
            status: "Registered".to_string(),
            disputed: false,
            requests: Vec::new(),
            metadata: Some(CurateMetadata {
                props: vec![CurateProp {
                    label: "Market".to_string(),
                    value: Some(format!("0xm{n}")),
                }],
            }),
        }
    }

    /// Serves `all` sorted by id, honouring the `id_gt` cursor and page size.
    async fn serve(all: &[CurateItem], cursor: &str, first: usize) -> Result<ItemsResponse> {
        Ok(ItemsResponse {
            litems: all.iter().filter(|i| i.id.as_str() > cursor).take(first).cloned().collect(),
            lregistry: Some(CurateRegistry { challenge_period_duration: "3600".to_string() }),
        })
    }

    #[tokio::test]
    async fn registry_larger_than_one_page_is_read_in_full() {
        let all: Vec<_> = (0..1500).map(registered).collect();
        let calls = AtomicUsize::new(0);

        let (items, period) = read_all_items(1000, 20, |cursor| {
            calls.fetch_add(1, Ordering::SeqCst);
            let all = &all;
            async move { serve(all, &cursor, 1000).await }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 1500);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(period, Some(3600));
        let usable = items.iter().filter_map(|i| to_registry_item(i, "Market", period)).count();
        assert_eq!(usable, 1500);
    }

    #[tokio::test]
    async fn item_paging_stops_at_round_cap_and_on_stuck_cursor() {
        let all: Vec<_> = (0..100).map(registered).collect();
        let (items, _) = read_all_items(10, 3, |cursor| {
            let all = &all;
            async move { serve(all, &cursor, 10).await }
        })
        .await
        .unwrap();
        assert_eq!(items.len(), 30);

        let calls = AtomicUsize::new(0);
        let (items, _) = read_all_items(10, 20, |_cursor| {
            calls.fetch_add(1, Ordering::SeqCst);
            let all = &all;
            async move { serve(all, "", 10).await }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(items.len(), 20);
    }

    #[tokio::test]
    async fn failing_item_page_fails_the_read() {
        let err = read_all_items(10, 20, |_cursor| async {
            Err::<ItemsResponse, _>(crate::error::AppError::Subgraph("down".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Subgraph(_)));
    }

    fn parse_items(raw: serde_json::Value) -> Vec<CurateItem> {
        let resp: ItemsResponse = serde_json::from_value(raw).unwrap();
        resp.litems
    }

    #[test]
    fn clearing_request_after_resolved_registration() {
        let items = parse_items(json!({
            "litems": [{
                "itemID": "0xitem",
                "status": "ClearingRequested",
                "disputed": false,
                "requests": [
                    { "requestType": "ClearingRequested", "resolved": false, "disputed": false, "submissionTime": "1700000500" },
                    { "requestType": "RegistrationRequested", "resolved": true, "disputed": false, "submissionTime": "1700000000" }
                ],
                "metadata": { "props": [
                    { "label": "Title", "value": "Will it rain?" },
                    { "label": "Market", "value": "0xABCDEF" }
                ]}
            }],
            "lregistry": { "challengePeriodDuration": "86400" }
        }));

        let item = to_registry_item(&items[0], "Market", Some(86400)).unwrap();
        assert_eq!(item.market_id, "0xabcdef");
        assert_eq!(item.status, ItemStatus::ClearingRequested);
        assert!(item.prior_registration_resolved);
        assert_eq!(item.challenge_deadline, None);
    }

    #[test]
    fn pending_registration_carries_deadline() {
        let items = parse_items(json!({
            "litems": [{
                "itemID": "0xitem",
                "status": "RegistrationRequested",
                "disputed": false,
                "requests": [
                    { "requestType": "RegistrationRequested", "resolved": false, "disputed": false, "submissionTime": "1700000000" }
                ],
                "metadata": { "props": [{ "label": "market", "value": "0x01" }] }
            }],
            "lregistry": null
        }));

        let item = to_registry_item(&items[0], "Market", Some(3600)).unwrap();
        assert_eq!(item.challenge_deadline, Some(1_700_003_600));
        assert!(!item.disputed);
        assert!(!item.prior_registration_resolved);
    }

    #[test]
    fn items_without_market_label_are_dropped() {
        let items = parse_items(json!({
            "litems": [
                { "itemID": "0x1", "status": "Registered", "requests": [], "metadata": { "props": [{ "label": "Title", "value": "x" }] } },
                { "itemID": "0x2", "status": "Registered", "requests": [], "metadata": null },
                { "itemID": "0x3", "status": "Registered", "requests": [], "metadata": { "props": [{ "label": "Market", "value": "  " }] } },
                { "itemID": "0x4", "status": "Unknown", "requests": [], "metadata": { "props": [{ "label": "Market", "value": "0x9" }] } }
            ],
            "lregistry": null
        }));

        assert!(items.iter().all(|i| to_registry_item(i, "Market", None).is_none()));
    }
}
