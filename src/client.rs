//! Capability interfaces the planners and trackers consume.
//!
//! Nothing in here knows about a concrete node library. `rpc` adapts alloy to
//! these traits; tests use the in-memory `testing::MockChain`.

use crate::errors::Result;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An unsigned transaction request as produced by the route builders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub to: Address,
    pub from: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<U256>,
    pub nonce: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl TxRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            ..Default::default()
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl LogEntry {
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub transaction_index: Option<u64>,
    pub status: bool,
    pub logs: Vec<LogEntry>,
    /// zkSync batch the transaction landed in (rollup receipts only)
    pub l1_batch_number: Option<u64>,
    /// Position within that batch (rollup receipts only)
    pub l1_batch_tx_index: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    /// Positional topic filters; `None` matches anything.
    pub topics: Vec<Option<B256>>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn matches(&self, log: &LogEntry) -> bool {
        if let Some(address) = self.address {
            if log.address != address {
                return false;
            }
        }
        if let Some(from) = self.from_block {
            if log.block_number.is_some_and(|block| block < from) {
                return false;
            }
        }
        if let Some(to) = self.to_block {
            if log.block_number.is_some_and(|block| block > to) {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(idx, wanted)| match wanted {
            Some(topic) => log.topics.get(idx) == Some(topic),
            None => true,
        })
    }
}

/// Merkle proof of an L2 -> L1 log, as returned by `zks_getLogProof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogProof {
    pub id: u64,
    pub proof: Vec<B256>,
    pub root: B256,
    #[serde(rename = "batch_number", alias = "batchNumber")]
    pub batch_number: u64,
}

/// Read access to one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;
    async fn block_number(&self) -> Result<u64>;
    /// Latest block tagged `finalized`; `None` when the node has no such tag yet.
    async fn finalized_block_number(&self) -> Result<Option<u64>>;
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>>;
    async fn estimate_gas(&self, tx: &TxRequest) -> Result<U256>;
    async fn gas_price(&self) -> Result<U256>;
}

/// zkSync-specific reads on a rollup chain.
#[async_trait]
pub trait RollupClient: ChainClient {
    fn as_chain(&self) -> &dyn ChainClient;
    async fn log_proof(&self, tx_hash: B256, index: u32) -> Result<Option<LogProof>>;
    async fn estimate_l1_to_l2_gas(&self, tx: &TxRequest) -> Result<U256>;
}

/// Signs and submits transactions. Receipts are awaited through a
/// `ChainClient` so the sender stays a thin shim.
#[async_trait]
pub trait TxSender: Send + Sync {
    fn address(&self) -> Address;
    async fn send(&self, tx: TxRequest) -> Result<B256>;
}

/// Estimation seam used by the gas planner.
#[async_trait]
pub trait GasEstimator: Send + Sync {
    async fn estimate(&self, tx: &TxRequest) -> Result<U256>;
}

/// Plain `eth_estimateGas` against one chain.
pub struct ChainEstimator<'a>(pub &'a dyn ChainClient);

#[async_trait]
impl GasEstimator for ChainEstimator<'_> {
    async fn estimate(&self, tx: &TxRequest) -> Result<U256> {
        self.0.estimate_gas(tx).await
    }
}

/// Estimates the L2 gas limit of an L1 -> L2 priority transaction.
pub struct L1ToL2Estimator<'a>(pub &'a dyn RollupClient);

#[async_trait]
impl GasEstimator for L1ToL2Estimator<'_> {
    async fn estimate(&self, tx: &TxRequest) -> Result<U256> {
        self.0.estimate_l1_to_l2_gas(tx).await
    }
}
