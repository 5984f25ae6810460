//! JSON-RPC adapter implementing the client traits over HTTP.
//!
//! Standard reads go through an alloy `RootProvider`. Receipts and the
//! `zks_*` methods use raw JSON-RPC so the zkSync receipt fields
//! (`l1BatchNumber`, `l1BatchTxIndex`) and proof payloads come back intact.

use crate::client::{
    ChainClient, LogEntry, LogFilter, LogProof, RollupClient, TxReceipt, TxRequest,
};
use crate::errors::{Result, SdkError};
use crate::revert::revert_from_payload;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256, U64};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{BlockNumberOrTag, Filter, Log, TransactionInput, TransactionRequest};
use alloy_transport::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RpcClient {
    url: Url,
    http: Client,
    provider: RootProvider,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|err| SdkError::config(format!("invalid rpc url {url}: {err}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| SdkError::rpc(format!("failed to build http client: {err}")))?;
        let provider = RootProvider::new_http(url.clone());
        Ok(Self {
            url,
            http,
            provider,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn raw<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                SdkError::rpc(format!("rpc request failed: {err}")).with_operation(method)
            })?;
        let status = response.status();
        let value: Value = response.json().await.map_err(|err| {
            SdkError::rpc(format!("rpc decode failed: {err}")).with_operation(method)
        })?;
        if !status.is_success() {
            return Err(SdkError::rpc(format!("rpc error status {status}: {value}"))
                .with_operation(method));
        }
        if let Some(error) = value.get("error") {
            return Err(rpc_error(error).with_operation(method));
        }
        serde_json::from_value(value.get("result").cloned().unwrap_or_default()).map_err(|err| {
            SdkError::rpc(format!("unexpected {method} result: {err}")).with_operation(method)
        })
    }
}

/// A JSON-RPC error object: a decoded revert when it carries revert data.
fn rpc_error(error: &Value) -> SdkError {
    if let Some(err) = revert_from_payload(error) {
        return err;
    }
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    SdkError::rpc(message)
}

/// Maps a provider failure through the same revert decoding as raw calls.
fn provider_error(method: &'static str) -> impl FnOnce(TransportError) -> SdkError {
    move |err| {
        let payload = err.as_error_resp().and_then(|resp| serde_json::to_value(resp).ok());
        let error = match payload {
            Some(payload) => rpc_error(&payload),
            None => SdkError::rpc(err.to_string()),
        };
        error.with_operation(method)
    }
}

fn call_request(tx: &TxRequest) -> TransactionRequest {
    TransactionRequest {
        from: tx.from,
        to: Some(TxKind::Call(tx.to)),
        input: TransactionInput::new(tx.data.clone()),
        value: Some(tx.value),
        ..Default::default()
    }
}

/// `zks_estimateGasL1ToL2` takes the legacy `data` key.
fn call_object(tx: &TxRequest) -> Value {
    let mut object = json!({
        "to": tx.to,
        "data": tx.data,
        "value": tx.value,
    });
    if let Some(from) = tx.from {
        object["from"] = json!(from);
    }
    object
}

fn to_filter(filter: &LogFilter) -> Result<Filter> {
    if filter.topics.len() > 4 {
        return Err(SdkError::validation(format!(
            "log filter has {} topics, at most 4 allowed",
            filter.topics.len()
        )));
    }
    let from = filter
        .from_block
        .map_or(BlockNumberOrTag::Earliest, BlockNumberOrTag::Number);
    let to = filter
        .to_block
        .map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number);
    let mut out = Filter::new().from_block(from).to_block(to);
    if let Some(address) = filter.address {
        out = out.address(address);
    }
    for (position, topic) in filter.topics.iter().enumerate() {
        let Some(topic) = *topic else { continue };
        out = match position {
            0 => out.event_signature(topic),
            1 => out.topic1(topic),
            2 => out.topic2(topic),
            _ => out.topic3(topic),
        };
    }
    Ok(out)
}

impl From<Log> for LogEntry {
    fn from(log: Log) -> Self {
        let address = log.inner.address;
        let (topics, data) = log.inner.data.split();
        LogEntry {
            address,
            topics,
            data,
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
    block_number: Option<U64>,
    transaction_hash: Option<B256>,
    log_index: Option<U64>,
}

impl From<RpcLog> for LogEntry {
    fn from(log: RpcLog) -> Self {
        LogEntry {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: log.block_number.map(|n| n.to::<u64>()),
            transaction_hash: log.transaction_hash,
            log_index: log.log_index.map(|n| n.to::<u64>()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    transaction_index: Option<U64>,
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<RpcLog>,
    l1_batch_number: Option<U64>,
    l1_batch_tx_index: Option<U64>,
}

impl From<RpcReceipt> for TxReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.to::<u64>()),
            transaction_index: receipt.transaction_index.map(|n| n.to::<u64>()),
            status: receipt.status.is_some_and(|status| status == U64::from(1)),
            logs: receipt.logs.into_iter().map(LogEntry::from).collect(),
            l1_batch_number: receipt.l1_batch_number.map(|n| n.to::<u64>()),
            l1_batch_tx_index: receipt.l1_batch_tx_index.map(|n| n.to::<u64>()),
        }
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(provider_error("eth_chainId"))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(data),
            ..Default::default()
        };
        self.provider
            .call(request)
            .await
            .map_err(provider_error("eth_call"))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let filter = to_filter(filter)?;
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(provider_error("eth_getLogs"))?;
        Ok(logs.into_iter().map(LogEntry::from).collect())
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(provider_error("eth_blockNumber"))
    }

    async fn finalized_block_number(&self) -> Result<Option<u64>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Finalized)
            .await
            .map_err(provider_error("eth_getBlockByNumber"))?;
        Ok(block.map(|block| block.header.number))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>> {
        let receipt: Option<RpcReceipt> =
            self.raw("eth_getTransactionReceipt", json!([hash])).await?;
        Ok(receipt.map(TxReceipt::from))
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<U256> {
        let gas = self
            .provider
            .estimate_gas(call_request(tx))
            .await
            .map_err(provider_error("eth_estimateGas"))?;
        Ok(U256::from(gas))
    }

    async fn gas_price(&self) -> Result<U256> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(provider_error("eth_gasPrice"))?;
        Ok(U256::from(price))
    }
}

#[async_trait]
impl RollupClient for RpcClient {
    fn as_chain(&self) -> &dyn ChainClient {
        self
    }

    async fn log_proof(&self, tx_hash: B256, index: u32) -> Result<Option<LogProof>> {
        let params = json!([tx_hash, index]);
        match self.raw("zks_getLogProof", params.clone()).await {
            Ok(proof) => Ok(proof),
            Err(err) => {
                tracing::debug!(error = %err, "zks_getLogProof failed, trying getLogProof");
                self.raw("getLogProof", params).await
            }
        }
    }

    async fn estimate_l1_to_l2_gas(&self, tx: &TxRequest) -> Result<U256> {
        self.raw("zks_estimateGasL1ToL2", json!([call_object(tx)])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    const REVERT_NOPE: &str = concat!(
        "0x08c379a0",
        "0000000000000000000000000000000000000000000000000000000000000020",
        "0000000000000000000000000000000000000000000000000000000000000004",
        "6e6f706500000000000000000000000000000000000000000000000000000000",
    );

    #[test]
    fn parses_rollup_receipt_fields() {
        let raw = json!({
            "transactionHash": format!("{:#x}", B256::repeat_byte(1)),
            "blockNumber": "0x5a",
            "transactionIndex": "0x3",
            "status": "0x1",
            "l1BatchNumber": "0x7",
            "l1BatchTxIndex": "0x2",
            "logs": [{
                "address": "0x000000000000000000000000000000000000800a",
                "topics": [format!("{:#x}", B256::repeat_byte(2))],
                "data": "0x",
                "blockNumber": "0x5a",
                "logIndex": "0x0"
            }]
        });
        let receipt: TxReceipt = serde_json::from_value::<RpcReceipt>(raw).unwrap().into();
        assert!(receipt.status);
        assert_eq!(receipt.block_number, Some(90));
        assert_eq!(receipt.l1_batch_number, Some(7));
        assert_eq!(receipt.l1_batch_tx_index, Some(2));
        assert_eq!(receipt.logs[0].topic0(), Some(B256::repeat_byte(2)));
    }

    #[test]
    fn failed_status_and_missing_batch() {
        let raw = json!({
            "transactionHash": format!("{:#x}", B256::repeat_byte(1)),
            "blockNumber": null,
            "status": "0x0",
            "logs": []
        });
        let receipt: TxReceipt = serde_json::from_value::<RpcReceipt>(raw).unwrap().into();
        assert!(!receipt.status);
        assert_eq!(receipt.l1_batch_number, None);
    }

    #[test]
    fn error_object_with_revert_data_decodes() {
        let error = json!({ "code": 3, "message": "execution reverted", "data": REVERT_NOPE });
        let err = rpc_error(&error);
        assert!(err.is(ErrorKind::OnChainRevert));

        let err = rpc_error(&json!({ "code": -32000, "message": "nonce too low" }));
        assert!(err.is(ErrorKind::Rpc));
        assert_eq!(err.message, "nonce too low");
    }

    #[test]
    fn filter_keeps_block_range_and_topic_positions() {
        let filter = LogFilter {
            address: Some(Address::repeat_byte(9)),
            topics: vec![None, Some(B256::repeat_byte(3))],
            from_block: Some(0x50),
            to_block: None,
        };
        let object = serde_json::to_value(to_filter(&filter).unwrap()).unwrap();
        assert_eq!(object["fromBlock"], "0x50");
        assert_eq!(object["toBlock"], "latest");
        assert!(object["topics"][0].is_null());
        assert_eq!(object["topics"][1], format!("{:#x}", B256::repeat_byte(3)));

        let open = serde_json::to_value(to_filter(&LogFilter::default()).unwrap()).unwrap();
        assert_eq!(open["fromBlock"], "earliest");
    }

    #[test]
    fn filter_rejects_more_than_four_topics() {
        let filter = LogFilter {
            topics: vec![None; 5],
            ..Default::default()
        };
        assert!(to_filter(&filter).unwrap_err().is(ErrorKind::Validation));
    }

    #[test]
    fn call_request_keeps_sender_and_value() {
        let tx = TxRequest {
            to: Address::repeat_byte(1),
            from: Some(Address::repeat_byte(2)),
            value: U256::from(7u64),
            ..Default::default()
        };
        let request = call_request(&tx);
        assert_eq!(request.from, Some(Address::repeat_byte(2)));
        assert_eq!(request.to, Some(TxKind::Call(Address::repeat_byte(1))));
        assert_eq!(request.value, Some(U256::from(7u64)));
    }
}
