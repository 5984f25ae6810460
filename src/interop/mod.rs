//! Rollup -> rollup interop bundles: planning, submission, destination-side
//! tracking and relaying.

mod builder;
mod relay;
mod status;

pub use builder::{pick_interop_route, BundleValuePolicy, InteropItem, InteropRoute};
pub use relay::{RelayMode, RelayOutcome};
pub use status::{bundle_from_receipt, BundleStatus, CallStatus, InteropPhase, SentBundle};

use crate::abi::{calldata, decode_u8, IInteropHandler};
use crate::bundle_index::{BundleIndex, BundleRef};
use crate::client::{LogFilter, TxSender};
use crate::context::{read, BridgeContext};
use crate::errors::{Result, SdkError};
use crate::gas::{GasPolicyOverride, GasSnapshot};
use crate::plan::{submit_steps, ApprovalNeed, HandleKind, Plan};
use crate::types::now_ms;
use crate::wait::{poll_until, WaitOptions};
use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How far behind the destination head the handler log scan starts.
pub const DEFAULT_LOG_LOOKBACK_BLOCKS: u64 = 50_000;

#[derive(Debug, Clone, Default)]
pub struct InteropParams {
    pub items: Vec<InteropItem>,
    /// Only this address may execute the bundle; permissionless when unset.
    pub execution_address: Option<Address>,
    pub unbundler: Option<Address>,
    pub value_policy: BundleValuePolicy,
    pub gas_overrides: BTreeMap<String, GasPolicyOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteropQuote {
    pub route: InteropRoute,
    pub approvals_needed: Vec<ApprovalNeed>,
    /// Tokens that get a vault registration step first.
    pub registrations: Vec<Address>,
    pub total_value: U256,
    pub value_policy: BundleValuePolicy,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub suggested_gas_limit: Option<U256>,
    pub gas: GasSnapshot,
}

pub type InteropPlan = Plan<InteropRoute, InteropQuote>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteropHandle {
    pub kind: HandleKind,
    pub source_tx_hash: B256,
    pub send_id: Option<B256>,
    pub bundle_hash: Option<B256>,
    pub step_hashes: Vec<(String, B256)>,
    pub plan: Option<InteropPlan>,
    /// Lower bound of the destination handler log scan, fixed on first
    /// observation.
    pub destination_from_block: Option<u64>,
    #[serde(skip)]
    last_phase: Option<InteropPhase>,
}

impl InteropHandle {
    pub fn from_tx(source_tx_hash: B256) -> Self {
        Self {
            kind: HandleKind::Interop,
            source_tx_hash,
            send_id: None,
            bundle_hash: None,
            step_hashes: Vec::new(),
            plan: None,
            destination_from_block: None,
            last_phase: None,
        }
    }

    pub fn last_phase(&self) -> Option<InteropPhase> {
        self.last_phase
    }

    fn remember(&mut self, sent: &SentBundle) {
        self.send_id = Some(sent.send_id);
        self.bundle_hash = Some(sent.bundle_hash);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteropStatus {
    pub phase: InteropPhase,
    pub source_tx_hash: B256,
    pub send_id: Option<B256>,
    pub bundle_hash: Option<B256>,
    pub last_update_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteropWaitTarget {
    Sent,
    Verified,
    /// Executed or unbundled.
    Executed,
}

impl InteropWaitTarget {
    fn reached(&self, phase: InteropPhase) -> bool {
        let wanted = match self {
            InteropWaitTarget::Sent => 1,
            InteropWaitTarget::Verified => 2,
            InteropWaitTarget::Executed => 3,
        };
        phase != InteropPhase::Failed && phase.rank() >= wanted
    }
}

/// Interop between one source and one destination rollup.
pub struct Interop {
    src: Arc<BridgeContext>,
    dst: Arc<BridgeContext>,
    index: Arc<BundleIndex>,
    wait: WaitOptions,
    log_lookback: u64,
}

impl Interop {
    pub fn new(src: Arc<BridgeContext>, dst: Arc<BridgeContext>, index: Arc<BundleIndex>) -> Self {
        Self {
            src,
            dst,
            index,
            wait: WaitOptions::default(),
            log_lookback: DEFAULT_LOG_LOOKBACK_BLOCKS,
        }
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_log_lookback(mut self, blocks: u64) -> Self {
        self.log_lookback = blocks;
        self
    }

    pub fn route(&self, params: &InteropParams) -> InteropRoute {
        pick_interop_route(&params.items)
    }

    pub async fn prepare(&self, params: &InteropParams, sender: Address) -> Result<InteropPlan> {
        let route = self.route(params);
        tracing::info!(
            %route,
            items = params.items.len(),
            source = %self.src.chain.key,
            destination = %self.dst.chain.key,
            "preparing interop bundle"
        );
        route.preflight(&self.src, &self.dst, params).await?;
        route.build(&self.src, &self.dst, params, sender).await
    }

    pub async fn quote(&self, params: &InteropParams, sender: Address) -> Result<InteropQuote> {
        Ok(self.prepare(params, sender).await?.summary)
    }

    pub async fn create(
        &self,
        params: &InteropParams,
        sender: &dyn TxSender,
    ) -> Result<InteropHandle> {
        let plan = self.prepare(params, sender.address()).await?;
        let step_hashes = submit_steps(&plan.steps, sender, self.src.l2.as_chain(), &self.wait)
            .await
            .map_err(|err| err.with_resource("interop"))?;
        let (_, source_tx_hash) = step_hashes
            .last()
            .cloned()
            .ok_or_else(|| SdkError::validation("interop plan has no steps"))?;
        let mut handle = InteropHandle::from_tx(source_tx_hash);
        handle.step_hashes = step_hashes;
        handle.plan = Some(plan);

        let center = self.src.chain.l2.interop_center;
        let receipt = self.src.l2.transaction_receipt(source_tx_hash).await?;
        match receipt.and_then(|receipt| bundle_from_receipt(&receipt, center)) {
            Some(sent) => {
                tracing::info!(
                    bundle_hash = %sent.bundle_hash,
                    send_id = %sent.send_id,
                    "bundle sent"
                );
                self.remember(&mut handle, &sent);
            }
            None => tracing::warn!(%source_tx_hash, "send receipt carries no InteropBundleSent"),
        }
        Ok(handle)
    }

    fn remember(&self, handle: &mut InteropHandle, sent: &SentBundle) {
        handle.remember(sent);
        self.index.insert(
            sent.send_id,
            BundleRef {
                bundle_hash: sent.bundle_hash,
                source_tx_hash: handle.source_tx_hash,
            },
        );
    }

    /// A handle for a send id seen earlier in this process.
    pub fn track(&self, send_id: B256) -> Option<InteropHandle> {
        let entry = self.index.get(&send_id)?;
        let mut handle = InteropHandle::from_tx(entry.source_tx_hash);
        handle.send_id = Some(send_id);
        handle.bundle_hash = Some(entry.bundle_hash);
        Some(handle)
    }

    pub async fn status(&self, handle: &mut InteropHandle) -> Result<InteropStatus> {
        let observed = self.observe(handle).await?;
        let phase = self.record(handle, observed);
        Ok(InteropStatus {
            phase,
            source_tx_hash: handle.source_tx_hash,
            send_id: handle.send_id,
            bundle_hash: handle.bundle_hash,
            last_update_ms: now_ms(),
        })
    }

    fn record(&self, handle: &mut InteropHandle, observed: InteropPhase) -> InteropPhase {
        let phase = observed.clamp(handle.last_phase);
        if phase != observed {
            tracing::debug!(?observed, ?phase, "kept later interop phase");
        }
        handle.last_phase = Some(phase);
        phase
    }

    async fn observe(&self, handle: &mut InteropHandle) -> Result<InteropPhase> {
        if handle.bundle_hash.is_none() {
            if let Some(entry) = handle.send_id.and_then(|id| self.index.get(&id)) {
                handle.bundle_hash = Some(entry.bundle_hash);
            }
        }
        let bundle_hash = match handle.bundle_hash {
            Some(hash) => hash,
            None => {
                let receipt = self.src.l2.transaction_receipt(handle.source_tx_hash).await?;
                let Some(receipt) = receipt else {
                    return Ok(InteropPhase::Pending);
                };
                if !receipt.status {
                    return Ok(InteropPhase::Failed);
                }
                let center = self.src.chain.l2.interop_center;
                let Some(sent) = bundle_from_receipt(&receipt, center) else {
                    return Err(SdkError::contract("source receipt carries no InteropBundleSent")
                        .with_operation("interop.status")
                        .with_context("txHash", handle.source_tx_hash));
                };
                self.remember(handle, &sent);
                sent.bundle_hash
            }
        };

        let from_block = match handle.destination_from_block {
            Some(block) => block,
            None => {
                let head = self.dst.l2.block_number().await?;
                let from = head.saturating_sub(self.log_lookback);
                tracing::debug!(head, from, "anchored destination log scan");
                handle.destination_from_block = Some(from);
                from
            }
        };
        let filter = LogFilter {
            address: Some(self.dst.chain.l2.interop_handler),
            topics: vec![None, Some(bundle_hash)],
            from_block: Some(from_block),
            to_block: None,
        };
        let logs = self.dst.l2.get_logs(&filter).await?;
        Ok(InteropPhase::from_handler_logs(&logs))
    }

    pub async fn wait(
        &self,
        handle: &mut InteropHandle,
        target: InteropWaitTarget,
        options: &WaitOptions,
    ) -> Result<InteropStatus> {
        let slot = tokio::sync::Mutex::new(handle);
        poll_until(&format!("interop bundle {target:?}"), options, || async {
            let mut handle = slot.lock().await;
            let status = self.status(&mut handle).await?;
            if status.phase == InteropPhase::Failed {
                return Err(SdkError::send_failed("bundle send reverted on the source chain")
                    .with_operation("interop.wait")
                    .with_context("txHash", handle.source_tx_hash));
            }
            Ok(target.reached(status.phase).then_some(status))
        })
        .await
    }

    /// `bundleStatus` straight from the destination handler.
    pub async fn bundle_status(&self, bundle_hash: B256) -> Result<BundleStatus> {
        let data = calldata(IInteropHandler::bundleStatusCall { bundleHash: bundle_hash });
        let raw = read(
            self.dst.l2.as_chain(),
            self.dst.chain.l2.interop_handler,
            data,
            "interopHandler.bundleStatus",
        )
        .await?;
        Ok(BundleStatus::from(decode_u8(&raw)?))
    }

    pub async fn call_statuses(&self, bundle_hash: B256, count: usize) -> Result<Vec<CallStatus>> {
        let handler = self.dst.chain.l2.interop_handler;
        let dst = self.dst.l2.as_chain();
        let reads = (0..count).map(|index| async move {
            let data = calldata(IInteropHandler::callStatusCall {
                bundleHash: bundle_hash,
                callIndex: U256::from(index),
            });
            let raw = read(dst, handler, data, "interopHandler.callStatus").await?;
            Ok::<_, SdkError>(CallStatus::from(decode_u8(&raw)?))
        });
        futures::future::try_join_all(reads).await
    }
}
