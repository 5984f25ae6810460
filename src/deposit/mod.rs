//! Settlement layer -> rollup deposits.

mod routes;
mod status;

pub use routes::{pick_deposit_route, DepositRoute};
pub use status::{extract_l2_tx_hash, CanonicalHash, DepositPhase};

use crate::client::{TxReceipt, TxSender};
use crate::context::BridgeContext;
use crate::errors::{Result, SdkError};
use crate::gas::{GasPolicyOverride, GasSnapshot};
use crate::plan::{submit_steps, ApprovalNeed, HandleKind, Plan};
use crate::types::now_ms;
use crate::wait::{poll_until, WaitOptions};
use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct DepositParams {
    pub token: Address,
    pub amount: U256,
    /// L2 receiver; the sender when unset.
    pub to: Option<Address>,
    pub refund_recipient: Option<Address>,
    pub operator_tip: Option<U256>,
    pub l2_gas_limit: Option<U256>,
    pub gas_per_pubdata: Option<U256>,
    /// Per-call policy overrides keyed by policy name.
    pub gas_overrides: BTreeMap<String, GasPolicyOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositQuote {
    pub route: DepositRoute,
    pub approvals_needed: Vec<ApprovalNeed>,
    pub base_cost: U256,
    pub operator_tip: U256,
    pub mint_value: U256,
    pub suggested_l2_gas_limit: U256,
    pub gas_per_pubdata: U256,
    pub l1_gas_price: U256,
    pub base_token: Address,
    pub gas: GasSnapshot,
}

pub type DepositPlan = Plan<DepositRoute, DepositQuote>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositHandle {
    pub kind: HandleKind,
    /// Settlement-layer transaction carrying the bridge call.
    pub l1_tx_hash: B256,
    /// Canonical L2 hash, once derived from the priority request.
    pub l2_tx_hash: Option<B256>,
    pub derived_via_fallback: bool,
    pub step_hashes: Vec<(String, B256)>,
    pub plan: Option<DepositPlan>,
    #[serde(skip)]
    last_phase: Option<DepositPhase>,
}

impl DepositHandle {
    /// Track a deposit submitted elsewhere.
    pub fn from_tx(l1_tx_hash: B256) -> Self {
        Self {
            kind: HandleKind::Deposit,
            l1_tx_hash,
            l2_tx_hash: None,
            derived_via_fallback: false,
            step_hashes: Vec::new(),
            plan: None,
            last_phase: None,
        }
    }

    pub fn last_phase(&self) -> Option<DepositPhase> {
        self.last_phase
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositStatus {
    pub phase: DepositPhase,
    pub l1_tx_hash: B256,
    pub l2_tx_hash: Option<B256>,
    pub last_update_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositWaitTarget {
    /// Settlement-layer receipt.
    L1,
    /// Rollup-layer receipt of the priority transaction.
    L2,
}

pub struct Deposits {
    ctx: Arc<BridgeContext>,
    wait: WaitOptions,
}

impl Deposits {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self {
            ctx,
            wait: WaitOptions::default(),
        }
    }

    /// Wait settings used by `create` while stepping through a plan.
    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub async fn route(&self, token: Address) -> Result<DepositRoute> {
        pick_deposit_route(token, |_| self.ctx.base_token(), self.ctx.chain.chain_id).await
    }

    pub async fn prepare(&self, params: &DepositParams, sender: Address) -> Result<DepositPlan> {
        let route = self.route(params.token).await?;
        tracing::info!(
            %route,
            token = %params.token,
            amount = %params.amount,
            chain = %self.ctx.chain.key,
            "preparing deposit"
        );
        route.preflight(&self.ctx, params).await?;
        route.build(&self.ctx, params, sender).await
    }

    pub async fn quote(&self, params: &DepositParams, sender: Address) -> Result<DepositQuote> {
        Ok(self.prepare(params, sender).await?.summary)
    }

    /// Build, then submit every step in order. The handle points at the final
    /// bridge transaction.
    pub async fn create(
        &self,
        params: &DepositParams,
        sender: &dyn TxSender,
    ) -> Result<DepositHandle> {
        let plan = self.prepare(params, sender.address()).await?;
        let step_hashes = submit_steps(&plan.steps, sender, self.ctx.l1.as_ref(), &self.wait)
            .await
            .map_err(|err| err.with_resource("deposit"))?;
        let (_, l1_tx_hash) = step_hashes
            .last()
            .cloned()
            .ok_or_else(|| SdkError::validation("deposit plan has no steps"))?;
        let mut handle = DepositHandle::from_tx(l1_tx_hash);
        handle.step_hashes = step_hashes;
        handle.plan = Some(plan);
        Ok(handle)
    }

    pub async fn status(&self, handle: &mut DepositHandle) -> Result<DepositStatus> {
        let observed = self.observe(handle).await?;
        let phase = observed.clamp(handle.last_phase);
        if phase != observed {
            tracing::debug!(?observed, ?phase, "kept later deposit phase");
        }
        if phase.rank().is_some() {
            handle.last_phase = Some(phase);
        }
        Ok(DepositStatus {
            phase,
            l1_tx_hash: handle.l1_tx_hash,
            l2_tx_hash: handle.l2_tx_hash,
            last_update_ms: now_ms(),
        })
    }

    async fn observe(&self, handle: &mut DepositHandle) -> Result<DepositPhase> {
        let l1_receipt = self.ctx.l1.transaction_receipt(handle.l1_tx_hash).await?;
        let Some(l1_receipt) = l1_receipt else {
            return match handle.l2_tx_hash {
                // the settlement receipt vanished after we derived the L2 hash
                Some(l2_hash) => Ok(self
                    .l2_phase(l2_hash)
                    .await?
                    .unwrap_or(DepositPhase::Unknown)),
                None => Ok(DepositPhase::L1Pending),
            };
        };
        if !l1_receipt.status {
            return Ok(DepositPhase::L1Failed);
        }

        let l2_hash = match handle.l2_tx_hash {
            Some(hash) => hash,
            None => {
                let found = extract_l2_tx_hash(
                    &l1_receipt,
                    self.ctx.chain.l1.bridgehub,
                    self.ctx.chain.allow_fallback_hash_extraction,
                );
                let Some(found) = found else {
                    tracing::warn!(
                        l1_tx_hash = %handle.l1_tx_hash,
                        "no priority request found in L1 receipt"
                    );
                    return Ok(DepositPhase::L1Included);
                };
                handle.l2_tx_hash = Some(found.hash);
                handle.derived_via_fallback = found.via_fallback;
                found.hash
            }
        };
        Ok(self
            .l2_phase(l2_hash)
            .await?
            .unwrap_or(DepositPhase::L2Pending))
    }

    async fn l2_phase(&self, l2_hash: B256) -> Result<Option<DepositPhase>> {
        Ok(self
            .ctx
            .l2
            .transaction_receipt(l2_hash)
            .await?
            .map(|receipt| {
                if receipt.status {
                    DepositPhase::L2Executed
                } else {
                    DepositPhase::L2Failed
                }
            }))
    }

    /// Block until the requested layer's receipt exists. A reverted L1
    /// transaction ends the wait with `SendFailed`; the L2 receipt is returned
    /// whatever its status.
    pub async fn wait(
        &self,
        handle: &mut DepositHandle,
        target: DepositWaitTarget,
        options: &WaitOptions,
    ) -> Result<TxReceipt> {
        let slot = tokio::sync::Mutex::new(handle);
        poll_until(&format!("deposit {target:?} receipt"), options, || async {
            let mut handle = slot.lock().await;
            let status = self.status(&mut handle).await?;
            if status.phase == DepositPhase::L1Failed {
                return Err(SdkError::send_failed("deposit reverted on L1")
                    .with_operation("deposits.wait")
                    .with_context("l1TxHash", handle.l1_tx_hash));
            }
            match target {
                DepositWaitTarget::L1 => self.ctx.l1.transaction_receipt(handle.l1_tx_hash).await,
                DepositWaitTarget::L2 => match handle.l2_tx_hash {
                    Some(l2_hash) if status.phase.is_terminal() => {
                        self.ctx.l2.transaction_receipt(l2_hash).await
                    }
                    _ => Ok(None),
                },
            }
        })
        .await
    }
}
