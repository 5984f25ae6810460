//! In-memory chain and sender used by the unit tests.

use crate::abi::{
    BundleAttributes, InteropBundle, InteropBundleSent, InteropCall, L2CanonicalTransaction,
    NewPriorityRequest,
};
use crate::client::{
    ChainClient, LogEntry, LogFilter, LogProof, RollupClient, TxReceipt, TxRequest, TxSender,
};
use crate::context::BridgeContext;
use crate::errors::{Result, SdkError};
use crate::gas::GasPolicyStore;
use crate::registry::ChainInfo;
use crate::revert::decode_revert;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Scripted {
    Return(Bytes),
    Revert(Bytes),
}

#[derive(Debug, Default)]
struct MockState {
    chain_id: u64,
    responses: HashMap<(Address, [u8; 4]), VecDeque<Scripted>>,
    calls: Vec<(Address, Bytes)>,
    receipts: HashMap<B256, TxReceipt>,
    logs: Vec<LogEntry>,
    log_filters: Vec<LogFilter>,
    proofs: HashMap<(B256, u32), LogProof>,
    estimate: Option<U256>,
    estimate_calls: usize,
    l1_to_l2_estimate: Option<U256>,
    gas_price: U256,
    block_number: u64,
    finalized: Option<u64>,
}

/// Scripted chain: both a `ChainClient` and a `RollupClient`. Clones share state.
#[derive(Debug, Clone)]
pub struct MockChain {
    inner: Arc<Mutex<MockState>>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        let state = MockState {
            chain_id,
            estimate: Some(U256::from(100_000u64)),
            l1_to_l2_estimate: Some(U256::from(500_000u64)),
            gas_price: U256::from(1_000_000_000u64),
            block_number: 100,
            finalized: Some(100),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().expect("mock state poisoned")
    }

    /// Every call to `to` with `selector` returns `ret`.
    pub fn respond(&self, to: Address, selector: [u8; 4], ret: impl Into<Vec<u8>>) {
        self.respond_seq(to, selector, vec![ret.into()]);
    }

    /// Successive calls consume `rets` in order; the last one repeats.
    pub fn respond_seq(&self, to: Address, selector: [u8; 4], rets: Vec<Vec<u8>>) {
        let queue = rets
            .into_iter()
            .map(|ret| Scripted::Return(Bytes::from(ret)))
            .collect();
        self.state().responses.insert((to, selector), queue);
    }

    pub fn revert(&self, to: Address, selector: [u8; 4], data: impl Into<Vec<u8>>) {
        let queue = VecDeque::from([Scripted::Revert(Bytes::from(data.into()))]);
        self.state().responses.insert((to, selector), queue);
    }

    pub fn calls_to(&self, to: Address) -> usize {
        self.state().calls.iter().filter(|(addr, _)| *addr == to).count()
    }

    pub fn add_receipt(&self, receipt: TxReceipt) {
        self.state()
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn add_log(&self, log: LogEntry) {
        self.state().logs.push(log);
    }

    /// Every filter passed to `get_logs`, oldest first.
    pub fn log_filters(&self) -> Vec<LogFilter> {
        self.state().log_filters.clone()
    }

    pub fn set_proof(&self, tx_hash: B256, index: u32, proof: LogProof) {
        self.state().proofs.insert((tx_hash, index), proof);
    }

    /// `None` makes every estimate fail.
    pub fn set_estimate(&self, estimate: Option<u64>) {
        self.state().estimate = estimate.map(U256::from);
    }

    pub fn set_finalized(&self, block: Option<u64>) {
        self.state().finalized = block;
    }

    pub fn estimate_calls(&self) -> usize {
        self.state().estimate_calls
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.state().chain_id)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let mut state = self.state();
        state.calls.push((to, data.clone()));
        if data.len() < 4 {
            return Err(SdkError::rpc("calldata without selector"));
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        let Some(queue) = state.responses.get_mut(&(to, selector)) else {
            return Err(SdkError::rpc(format!(
                "no response scripted for {to:#x} selector 0x{}",
                hex::encode(selector)
            )));
        };
        let scripted = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match scripted {
            Some(Scripted::Return(ret)) => Ok(ret),
            Some(Scripted::Revert(data)) => Err(SdkError::reverted(decode_revert(&data))),
            None => Ok(Bytes::new()),
        }
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let mut state = self.state();
        state.log_filters.push(filter.clone());
        Ok(state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state().block_number)
    }

    async fn finalized_block_number(&self) -> Result<Option<u64>> {
        Ok(self.state().finalized)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>> {
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<U256> {
        let mut state = self.state();
        state.estimate_calls += 1;
        state
            .estimate
            .ok_or_else(|| SdkError::rpc("execution reverted: estimate disabled"))
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.state().gas_price)
    }
}

#[async_trait]
impl RollupClient for MockChain {
    fn as_chain(&self) -> &dyn ChainClient {
        self
    }

    async fn log_proof(&self, tx_hash: B256, index: u32) -> Result<Option<LogProof>> {
        Ok(self.state().proofs.get(&(tx_hash, index)).cloned())
    }

    async fn estimate_l1_to_l2_gas(&self, _tx: &TxRequest) -> Result<U256> {
        self.state()
            .l1_to_l2_estimate
            .ok_or_else(|| SdkError::rpc("zks_estimateGasL1ToL2 failed"))
    }
}

/// Records submissions and mines them instantly on `chain`.
#[derive(Debug, Clone)]
pub struct MockSender {
    address: Address,
    chain: MockChain,
    sent: Arc<Mutex<Vec<TxRequest>>>,
    failing: Arc<Mutex<Vec<usize>>>,
    logs: Vec<LogEntry>,
}

impl MockSender {
    pub fn new(address: Address, chain: MockChain) -> Self {
        Self {
            address,
            chain,
            sent: Arc::default(),
            failing: Arc::default(),
            logs: Vec::new(),
        }
    }

    /// Every mined receipt carries `logs`.
    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    /// The `index`-th submission is mined with a failure status.
    pub fn fail_at(&self, index: usize) {
        self.failing.lock().expect("poisoned").push(index);
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.sent.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl TxSender for MockSender {
    fn address(&self) -> Address {
        self.address
    }

    async fn send(&self, tx: TxRequest) -> Result<B256> {
        let index = {
            let mut sent = self.sent.lock().expect("poisoned");
            sent.push(tx);
            sent.len() - 1
        };
        let mut seed = self.address.to_vec();
        seed.extend_from_slice(&(index as u64).to_be_bytes());
        let hash = keccak256(seed);
        let status = !self.failing.lock().expect("poisoned").contains(&index);
        self.chain.add_receipt(receipt(hash, status, self.logs.clone()));
        Ok(hash)
    }
}

pub fn receipt(hash: B256, status: bool, logs: Vec<LogEntry>) -> TxReceipt {
    TxReceipt {
        transaction_hash: hash,
        block_number: Some(90),
        transaction_index: Some(3),
        status,
        logs,
        l1_batch_number: Some(7),
        l1_batch_tx_index: Some(2),
    }
}

pub fn log(address: Address, topics: Vec<B256>, data: impl Into<Vec<u8>>) -> LogEntry {
    LogEntry {
        address,
        topics,
        data: Bytes::from(data.into()),
        block_number: Some(90),
        transaction_hash: None,
        log_index: Some(0),
    }
}

pub fn context(l1: MockChain, l2: MockChain, bridgehub: Address) -> BridgeContext {
    let chain_id = l2.state().chain_id;
    context_for(ChainInfo::new("test", chain_id, bridgehub), l1, l2)
}

pub fn context_for(chain: ChainInfo, l1: MockChain, l2: MockChain) -> BridgeContext {
    BridgeContext::new(
        chain,
        Arc::new(l1),
        Arc::new(l2),
        Arc::new(GasPolicyStore::defaults()),
    )
    .expect("context")
}

/// `NewPriorityRequest` event data carrying `tx_hash`.
pub fn priority_request_data(tx_hash: B256) -> Vec<u8> {
    let event = NewPriorityRequest {
        txId: U256::from(12u64),
        txHash: tx_hash,
        expirationTimestamp: 0,
        transaction: L2CanonicalTransaction {
            txType: U256::from(255u64),
            from: U256::ZERO,
            to: U256::ZERO,
            gasLimit: U256::ZERO,
            gasPerPubdataByteLimit: U256::from(800u64),
            maxFeePerGas: U256::ZERO,
            maxPriorityFeePerGas: U256::ZERO,
            paymaster: U256::ZERO,
            nonce: U256::ZERO,
            value: U256::ZERO,
            reserved: [U256::ZERO; 4],
            data: Bytes::new(),
            signature: Bytes::new(),
            factoryDeps: Vec::new(),
            paymasterInput: Bytes::new(),
            reservedDynamic: Bytes::new(),
        },
        factoryDeps: Vec::new(),
    };
    event.abi_encode_params()
}

pub fn sample_bundle(source: u64, destination: u64) -> InteropBundle {
    InteropBundle {
        version: alloy_primitives::FixedBytes([0x01]),
        sourceChainId: U256::from(source),
        destinationChainId: U256::from(destination),
        interopBundleSalt: B256::repeat_byte(0x5a),
        calls: vec![InteropCall {
            version: alloy_primitives::FixedBytes([0x01]),
            shadowAccount: false,
            to: Address::repeat_byte(0x01),
            from: Address::repeat_byte(0x5e),
            value: U256::from(3u64),
            data: Bytes::new(),
        }],
        bundleAttributes: BundleAttributes {
            executionAddress: Bytes::new(),
            unbundlerAddress: Bytes::new(),
        },
    }
}

/// `InteropBundleSent` event data for a one-call bundle.
pub fn bundle_sent_data(
    send_id: B256,
    bundle_hash: B256,
    source: u64,
    destination: u64,
) -> Vec<u8> {
    InteropBundleSent {
        l2l1MsgHash: send_id,
        interopBundleHash: bundle_hash,
        interopBundle: sample_bundle(source, destination),
    }
    .abi_encode_params()
}
