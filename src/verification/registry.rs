//! Fallback verification path: read registry state straight from the contract.
//!
//! Items are enumerated with `itemCount`/`itemList`, then item info and request
//! info are fetched through Multicall3 `aggregate3` in fixed-size batches. Item
//! data is an RLP list of column values; the market id is the column whose label
//! matches the configured market label.

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use alloy_rlp::Decodable;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::{MAX_PAGE_ROUNDS, PAGE_SIZE, REGISTRY_BATCH_SIZE};
use crate::error::{AppError, Result};
use crate::verification::{ItemStatus, RegistryItem, RegistrySource};

/// Upper bound on items enumerated from the contract.
const MAX_REGISTRY_ITEMS: u64 = (PAGE_SIZE * MAX_PAGE_ROUNDS) as u64;

sol! {
    interface IGeneralizedTCR {
        function itemCount() external view returns (uint256);
        function itemList(uint256 index) external view returns (bytes32);
        function challengePeriodDuration() external view returns (uint256);
        function getItemInfo(bytes32 itemID) external view returns (bytes data, uint8 status, uint256 numberOfRequests);
        function getRequestInfo(bytes32 itemID, uint256 request) external view returns (
            bool disputed,
            uint256 disputeID,
            uint256 submissionTime,
            bool resolved,
            address[3] parties,
            uint256 numberOfRounds,
            uint8 ruling,
            address requestArbitrator,
            bytes requestArbitratorExtraData,
            uint256 metaEvidenceID
        );
    }

    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
    }
}

#[derive(Debug, Clone)]
struct ItemInfo {
    data: Bytes,
    status: u8,
    requests: u64,
}

#[derive(Debug, Clone)]
struct RequestInfo {
    disputed: bool,
    resolved: bool,
    submission_time: u64,
}

pub struct RegistryContractSource {
    http: reqwest::Client,
    rpc_url: String,
    registry: Address,
    multicall: Address,
    columns: Vec<String>,
    market_label: String,
    batch_size: usize,
}

impl RegistryContractSource {
    pub fn new(
        http: reqwest::Client,
        rpc_url: impl Into<String>,
        registry: Address,
        multicall: Address,
        columns: Vec<String>,
        market_label: impl Into<String>,
    ) -> Self {
        Self {
            http,
            rpc_url: rpc_url.into(),
            registry,
            multicall,
            columns,
            market_label: market_label.into(),
            batch_size: REGISTRY_BATCH_SIZE,
        }
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Bytes> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [
                { "to": to.to_string(), "data": hex::encode_prefixed(&data) },
                "latest"
            ],
            "id": 1
        });

        let resp: Value = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = resp.get("error") {
            return Err(AppError::Rpc(error.to_string()));
        }

        let result = resp
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| AppError::Rpc("missing result in eth_call response".to_string()))?;

        hex::decode(result.trim_start_matches("0x"))
            .map(Bytes::from)
            .map_err(|e| AppError::Rpc(format!("invalid hex in eth_call result: {e}")))
    }

    /// Run registry calls through Multicall3 in batches. Failed sub-calls are `None`.
    async fn multicall(&self, calls: Vec<Vec<u8>>) -> Result<Vec<Option<Bytes>>> {
        let mut out = Vec::with_capacity(calls.len());
        for chunk in calls.chunks(self.batch_size) {
            let batch: Vec<IMulticall3::Call3> = chunk
                .iter()
                .map(|data| IMulticall3::Call3 {
                    target: self.registry,
                    allowFailure: true,
                    callData: Bytes::copy_from_slice(data),
                })
                .collect();

            let raw = self
                .eth_call(self.multicall, IMulticall3::aggregate3Call { calls: batch }.abi_encode())
                .await?;
            let results = IMulticall3::aggregate3Call::abi_decode_returns(&raw)?;
            if results.len() != chunk.len() {
                return Err(AppError::Rpc(format!(
                    "multicall returned {} results for {} calls",
                    results.len(),
                    chunk.len()
                )));
            }
            out.extend(results.into_iter().map(|r| r.success.then_some(r.returnData)));
        }
        Ok(out)
    }

    async fn call_registry(&self, data: Vec<u8>) -> Result<Bytes> {
        self.eth_call(self.registry, data).await
    }
}

#[async_trait]
impl RegistrySource for RegistryContractSource {
    fn name(&self) -> &'static str {
        "registry-contract"
    }

    async fn fetch_items(&self) -> Result<Vec<RegistryItem>> {
        let count_raw = self.call_registry(IGeneralizedTCR::itemCountCall {}.abi_encode()).await?;
        let count = IGeneralizedTCR::itemCountCall::abi_decode_returns(&count_raw)?;
        let count = u64::try_from(count).unwrap_or(u64::MAX).min(MAX_REGISTRY_ITEMS);

        let period_raw = self
            .call_registry(IGeneralizedTCR::challengePeriodDurationCall {}.abi_encode())
            .await?;
        let period = IGeneralizedTCR::challengePeriodDurationCall::abi_decode_returns(&period_raw)?;
        let period = u64::try_from(period).ok();

        let list_calls = (0..count)
            .map(|i| IGeneralizedTCR::itemListCall { index: U256::from(i) }.abi_encode())
            .collect();
        let ids: Vec<B256> = self
            .multicall(list_calls)
            .await?
            .into_iter()
            .flatten()
            .filter_map(|raw| IGeneralizedTCR::itemListCall::abi_decode_returns(&raw).ok())
            .collect();

        let info_calls = ids
            .iter()
            .map(|id| IGeneralizedTCR::getItemInfoCall { itemID: *id }.abi_encode())
            .collect();
        let infos: Vec<Option<ItemInfo>> = self
            .multicall(info_calls)
            .await?
            .into_iter()
            .map(|raw| raw.and_then(|r| decode_item_info(&r)))
            .collect();

        // Latest request for every item; for clearing requests also the one before it,
        // which is the registration that got the item listed.
        let mut request_calls = Vec::new();
        let mut slots: Vec<(usize, bool)> = Vec::new();
        for (idx, (id, info)) in ids.iter().zip(&infos).enumerate() {
            let Some(info) = info else { continue };
            if info.requests == 0 {
                continue;
            }
            let request_info = |n: u64| {
                IGeneralizedTCR::getRequestInfoCall { itemID: *id, request: U256::from(n) }
                    .abi_encode()
            };
            request_calls.push(request_info(info.requests - 1));
            slots.push((idx, false));
            let status = ItemStatus::from_code(info.status);
            if status == Some(ItemStatus::ClearingRequested) && info.requests >= 2 {
                request_calls.push(request_info(info.requests - 2));
                slots.push((idx, true));
            }
        }

        let mut latest: Vec<Option<RequestInfo>> = vec![None; ids.len()];
        let mut prior: Vec<Option<RequestInfo>> = vec![None; ids.len()];
        for ((idx, is_prior), raw) in slots.into_iter().zip(self.multicall(request_calls).await?) {
            let info = raw.and_then(|r| decode_request_info(&r));
            if is_prior {
                prior[idx] = info;
            } else {
                latest[idx] = info;
            }
        }

        let items: Vec<RegistryItem> = ids
            .iter()
            .enumerate()
            .filter_map(|(idx, id)| {
                let info = infos[idx].as_ref()?;
                assemble_item(
                    *id,
                    info,
                    latest[idx].as_ref(),
                    prior[idx].as_ref(),
                    period,
                    &self.columns,
                    &self.market_label,
                )
            })
            .collect();

        debug!(
            registry = %self.registry,
            count,
            usable = items.len(),
            "Registry contract items read"
        );
        Ok(items)
    }
}

fn decode_item_info(raw: &[u8]) -> Option<ItemInfo> {
    let ret = IGeneralizedTCR::getItemInfoCall::abi_decode_returns(raw).ok()?;
    Some(ItemInfo {
        data: ret.data,
        status: ret.status,
        requests: u64::try_from(ret.numberOfRequests).ok()?,
    })
}

fn decode_request_info(raw: &[u8]) -> Option<RequestInfo> {
    let ret = IGeneralizedTCR::getRequestInfoCall::abi_decode_returns(raw).ok()?;
    Some(RequestInfo {
        disputed: ret.disputed,
        resolved: ret.resolved,
        submission_time: u64::try_from(ret.submissionTime).ok()?,
    })
}

fn assemble_item(
    item_id: B256,
    info: &ItemInfo,
    latest: Option<&RequestInfo>,
    prior: Option<&RequestInfo>,
    challenge_period: Option<u64>,
    columns: &[String],
    label: &str,
) -> Option<RegistryItem> {
    let status = ItemStatus::from_code(info.status)?;
    let market_id = market_id_from_data(&info.data, columns, label)?;

    let challenge_deadline = match (status, latest, challenge_period) {
        (ItemStatus::RegistrationRequested, Some(req), Some(period)) => {
            Some(req.submission_time.saturating_add(period))
        }
        _ => None,
    };

    Some(RegistryItem {
        item_id: hex::encode_prefixed(item_id),
        market_id,
        status,
        disputed: latest.map_or(false, |r| r.disputed),
        prior_registration_resolved: status == ItemStatus::ClearingRequested
            && prior.map_or(false, |r| r.resolved),
        challenge_deadline,
    })
}

/// Pick the labelled column out of RLP-encoded item data.
fn market_id_from_data(data: &[u8], columns: &[String], label: &str) -> Option<String> {
    let pos = columns.iter().position(|c| c.eq_ignore_ascii_case(label))?;
    let values = Vec::<Bytes>::decode(&mut &data[..]).ok()?;
    let value = std::str::from_utf8(values.get(pos)?).ok()?.trim().to_lowercase();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerificationStatus;
    use crate::verification::derive_status;
    use alloy_sol_types::SolValue;

    fn columns() -> Vec<String> {
        vec!["Market".to_string(), "Title".to_string()]
    }

    fn item_data(market: &str) -> Bytes {
        let values = vec![
            Bytes::from(market.as_bytes().to_vec()),
            Bytes::from_static(b"Will it rain tomorrow?"),
        ];
        let mut out = Vec::new();
        alloy_rlp::encode_list::<_, Bytes>(&values, &mut out);
        Bytes::from(out)
    }

    #[test]
    fn market_id_read_from_labelled_column() {
        let data = item_data("0xAbC123");
        assert_eq!(market_id_from_data(&data, &columns(), "market").as_deref(), Some("0xabc123"));
        assert_eq!(market_id_from_data(&data, &columns(), "Creator"), None);
        assert_eq!(market_id_from_data(&[0xff, 0x00], &columns(), "Market"), None);
    }

    #[test]
    fn clearing_item_with_resolved_registration_is_verified() {
        let info = ItemInfo { data: item_data("0x01"), status: 3, requests: 2 };
        let latest = RequestInfo { disputed: false, resolved: false, submission_time: 500 };
        let prior = RequestInfo { disputed: false, resolved: true, submission_time: 100 };

        let item = assemble_item(
            B256::repeat_byte(0x11),
            &info,
            Some(&latest),
            Some(&prior),
            Some(60),
            &columns(),
            "Market",
        )
        .unwrap();
        assert_eq!(item.status, ItemStatus::ClearingRequested);
        assert!(item.prior_registration_resolved);
        assert_eq!(derive_status(&item), VerificationStatus::Verified);
        assert!(item.item_id.starts_with("0x1111"));
    }

    #[test]
    fn registration_request_gets_deadline_from_challenge_period() {
        let info = ItemInfo { data: item_data("0x02"), status: 2, requests: 1 };
        let latest = RequestInfo { disputed: false, resolved: false, submission_time: 1_000 };

        let item = assemble_item(
            B256::ZERO,
            &info,
            Some(&latest),
            None,
            Some(3_600),
            &columns(),
            "Market",
        )
        .unwrap();
        assert_eq!(item.challenge_deadline, Some(4_600));
        assert_eq!(derive_status(&item), VerificationStatus::Verifying);
    }

    #[test]
    fn unknown_status_code_is_dropped() {
        let info = ItemInfo { data: item_data("0x03"), status: 9, requests: 0 };
        assert!(assemble_item(B256::ZERO, &info, None, None, None, &columns(), "Market").is_none());
    }

    #[test]
    fn item_info_decodes_from_return_data() {
        let encoded = (item_data("0x04"), U256::from(1u8), U256::from(3u64)).abi_encode_params();
        let info = decode_item_info(&encoded).unwrap();
        assert_eq!(info.status, 1);
        assert_eq!(info.requests, 3);
        assert_eq!(market_id_from_data(&info.data, &columns(), "Market").as_deref(), Some("0x04"));
    }

    #[test]
    fn calldata_uses_function_selectors() {
        let call =
            IGeneralizedTCR::getItemInfoCall { itemID: B256::repeat_byte(0x42) }.abi_encode();
        assert_eq!(&call[0..4], &IGeneralizedTCR::getItemInfoCall::SELECTOR);
        assert_eq!(call.len(), 4 + 32);
    }
}
