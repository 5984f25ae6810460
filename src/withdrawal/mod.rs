//! Rollup -> settlement layer withdrawals, including the idempotent
//! settlement-layer finalization.

mod routes;
mod status;

pub use routes::{pick_withdrawal_route, WithdrawalRoute};
pub use status::WithdrawalPhase;

use crate::abi::{calldata, decode_bool, IL1Nullifier};
use crate::client::{ChainEstimator, LogProof, TxReceipt, TxRequest, TxSender};
use crate::context::{read, BridgeContext};
use crate::errors::{Result, SdkError};
use crate::gas::{keys, EnsureOptions, GasPolicyOverride, GasSnapshot};
use crate::messages::{find_l1_message, L1Message};
use crate::plan::{submit_steps, ApprovalNeed, HandleKind, Plan};
use crate::types::now_ms;
use crate::wait::{poll_until, WaitOptions};
use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct WithdrawalParams {
    pub token: Address,
    pub amount: U256,
    /// L1 receiver; the sender when unset.
    pub to: Option<Address>,
    pub gas_overrides: BTreeMap<String, GasPolicyOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalQuote {
    pub route: WithdrawalRoute,
    pub approvals_needed: Vec<ApprovalNeed>,
    /// Asset id burned through the asset router (ERC-20 route only).
    pub asset_id: Option<B256>,
    pub suggested_l2_gas_limit: Option<U256>,
    pub gas: GasSnapshot,
}

pub type WithdrawalPlan = Plan<WithdrawalRoute, WithdrawalQuote>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalHandle {
    pub kind: HandleKind,
    pub l2_tx_hash: B256,
    /// Settlement-layer finalization, once this client submitted one.
    pub finalize_tx_hash: Option<B256>,
    pub step_hashes: Vec<(String, B256)>,
    pub plan: Option<WithdrawalPlan>,
    #[serde(skip)]
    last_phase: Option<WithdrawalPhase>,
}

impl WithdrawalHandle {
    pub fn from_tx(l2_tx_hash: B256) -> Self {
        Self {
            kind: HandleKind::Withdrawal,
            l2_tx_hash,
            finalize_tx_hash: None,
            step_hashes: Vec::new(),
            plan: None,
            last_phase: None,
        }
    }

    pub fn last_phase(&self) -> Option<WithdrawalPhase> {
        self.last_phase
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalStatus {
    pub phase: WithdrawalPhase,
    pub l2_tx_hash: B256,
    pub finalize_tx_hash: Option<B256>,
    pub last_update_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalWaitTarget {
    /// Included on the rollup.
    L2,
    /// Proof available, not yet finalized.
    Ready,
    Finalized,
}

impl WithdrawalWaitTarget {
    fn reached(&self, phase: WithdrawalPhase) -> bool {
        match self {
            WithdrawalWaitTarget::L2 => phase.rank() >= 1,
            WithdrawalWaitTarget::Ready => phase.rank() >= 2,
            WithdrawalWaitTarget::Finalized => phase == WithdrawalPhase::Finalized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum FinalizeOutcome {
    /// Someone (possibly us, earlier) already finalized; nothing was sent.
    AlreadyFinalized,
    Submitted {
        #[serde(rename = "txHash")]
        tx_hash: B256,
    },
}

/// What the chains currently say about one withdrawal.
enum Inspection {
    Pending,
    Failed,
    Included,
    Ready(Box<IL1Nullifier::FinalizeL1DepositParams>),
    Finalized,
}

impl Inspection {
    fn phase(&self) -> WithdrawalPhase {
        match self {
            Inspection::Pending => WithdrawalPhase::L2Pending,
            Inspection::Failed => WithdrawalPhase::L2Failed,
            Inspection::Included => WithdrawalPhase::L2Included,
            Inspection::Ready(_) => WithdrawalPhase::ReadyToFinalize,
            Inspection::Finalized => WithdrawalPhase::Finalized,
        }
    }
}

pub struct Withdrawals {
    ctx: Arc<BridgeContext>,
    wait: WaitOptions,
}

impl Withdrawals {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self {
            ctx,
            wait: WaitOptions::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn route(&self, token: Address) -> WithdrawalRoute {
        pick_withdrawal_route(token)
    }

    pub async fn prepare(
        &self,
        params: &WithdrawalParams,
        sender: Address,
    ) -> Result<WithdrawalPlan> {
        let route = self.route(params.token);
        tracing::info!(
            %route,
            token = %params.token,
            amount = %params.amount,
            chain = %self.ctx.chain.key,
            "preparing withdrawal"
        );
        route.preflight(&self.ctx, params).await?;
        route.build(&self.ctx, params, sender).await
    }

    pub async fn quote(
        &self,
        params: &WithdrawalParams,
        sender: Address,
    ) -> Result<WithdrawalQuote> {
        Ok(self.prepare(params, sender).await?.summary)
    }

    pub async fn create(
        &self,
        params: &WithdrawalParams,
        sender: &dyn TxSender,
    ) -> Result<WithdrawalHandle> {
        let plan = self.prepare(params, sender.address()).await?;
        let step_hashes = submit_steps(&plan.steps, sender, self.ctx.l2.as_chain(), &self.wait)
            .await
            .map_err(|err| err.with_resource("withdrawal"))?;
        let (_, l2_tx_hash) = step_hashes
            .last()
            .cloned()
            .ok_or_else(|| SdkError::validation("withdrawal plan has no steps"))?;
        let mut handle = WithdrawalHandle::from_tx(l2_tx_hash);
        handle.step_hashes = step_hashes;
        handle.plan = Some(plan);
        Ok(handle)
    }

    pub async fn status(&self, handle: &mut WithdrawalHandle) -> Result<WithdrawalStatus> {
        let observed = self.inspect(handle.l2_tx_hash).await?.phase();
        let phase = self.record(handle, observed);
        Ok(WithdrawalStatus {
            phase,
            l2_tx_hash: handle.l2_tx_hash,
            finalize_tx_hash: handle.finalize_tx_hash,
            last_update_ms: now_ms(),
        })
    }

    fn record(&self, handle: &mut WithdrawalHandle, observed: WithdrawalPhase) -> WithdrawalPhase {
        let phase = observed.clamp(handle.last_phase);
        if phase != observed {
            tracing::debug!(?observed, ?phase, "kept later withdrawal phase");
        }
        handle.last_phase = Some(phase);
        phase
    }

    async fn inspect(&self, l2_tx_hash: B256) -> Result<Inspection> {
        let Some(receipt) = self.ctx.l2.transaction_receipt(l2_tx_hash).await? else {
            return Ok(Inspection::Pending);
        };
        if !receipt.status {
            return Ok(Inspection::Failed);
        }
        let l2 = &self.ctx.chain.l2;
        let senders = [l2.base_token_system, l2.asset_router];
        let message = find_l1_message(&receipt, l2.l1_messenger, &senders)?;
        let Some(proof) = self.ctx.l2.log_proof(l2_tx_hash, message.index).await? else {
            tracing::debug!(%l2_tx_hash, "withdrawal proof not available yet");
            return Ok(Inspection::Included);
        };
        if self.is_finalized(U256::from(proof.batch_number), U256::from(proof.id)).await? {
            return Ok(Inspection::Finalized);
        }
        let params = self.finalize_params(&receipt, message, proof)?;
        Ok(Inspection::Ready(Box::new(params)))
    }

    fn finalize_params(
        &self,
        receipt: &TxReceipt,
        message: L1Message,
        proof: LogProof,
    ) -> Result<IL1Nullifier::FinalizeL1DepositParams> {
        let tx_number = receipt
            .l1_batch_tx_index
            .or(receipt.transaction_index)
            .ok_or_else(|| SdkError::contract("receipt has no position in its batch"))?;
        let tx_number = u16::try_from(tx_number)
            .map_err(|_| SdkError::contract(format!("batch tx index {tx_number} out of range")))?;
        Ok(IL1Nullifier::FinalizeL1DepositParams {
            chainId: self.ctx.chain_id(),
            l2BatchNumber: U256::from(proof.batch_number),
            l2MessageIndex: U256::from(proof.id),
            l2Sender: message.sender,
            l2TxNumberInBatch: tx_number,
            message: message.message,
            merkleProof: proof.proof,
        })
    }

    async fn is_finalized(&self, batch_number: U256, message_index: U256) -> Result<bool> {
        let nullifier = self.ctx.l1_nullifier().await?;
        let data = calldata(IL1Nullifier::isWithdrawalFinalizedCall {
            _chainId: self.ctx.chain_id(),
            _l2BatchNumber: batch_number,
            _l2MessageIndex: message_index,
        });
        let raw =
            read(self.ctx.l1.as_ref(), nullifier, data, "nullifier.isWithdrawalFinalized").await?;
        decode_bool(&raw)
    }

    /// Prove the withdrawal on the settlement layer. Safe to repeat: an
    /// already finalized withdrawal returns `AlreadyFinalized` without sending,
    /// and so does a finalization that lost a race to another submitter.
    pub async fn finalize(
        &self,
        handle: &mut WithdrawalHandle,
        sender: &dyn TxSender,
    ) -> Result<FinalizeOutcome> {
        let inspection = self.inspect(handle.l2_tx_hash).await?;
        let phase = inspection.phase();
        let params = match inspection {
            Inspection::Finalized => {
                self.record(handle, phase);
                tracing::info!(l2_tx_hash = %handle.l2_tx_hash, "withdrawal already finalized");
                return Ok(FinalizeOutcome::AlreadyFinalized);
            }
            Inspection::Ready(params) => *params,
            _ => {
                return Err(SdkError::validation("withdrawal is not ready to finalize")
                    .with_operation("withdrawals.finalize")
                    .with_context("phase", phase)
                    .with_context("l2TxHash", handle.l2_tx_hash))
            }
        };

        let nullifier = self.ctx.l1_nullifier().await?;
        let (batch_number, message_index) = (params.l2BatchNumber, params.l2MessageIndex);
        let data = calldata(IL1Nullifier::finalizeDepositCall {
            _finalizeWithdrawalParams: params,
        });
        let mut tx = TxRequest::new(nullifier, data).from(sender.address());
        let quote = self
            .ctx
            .planner()
            .ensure(
                "finalize",
                keys::WITHDRAW_FINALIZE,
                &tx,
                EnsureOptions {
                    estimator: Some(&ChainEstimator(self.ctx.l1.as_ref())),
                    overrides: None,
                },
            )
            .await?;
        tx.gas = quote.recommended;

        let tx_hash = sender
            .send(tx)
            .await
            .map_err(|err| err.with_operation("withdrawals.finalize"))?;
        tracing::info!(%tx_hash, l2_tx_hash = %handle.l2_tx_hash, "finalization submitted");
        handle.finalize_tx_hash = Some(tx_hash);

        let l1 = self.ctx.l1.as_ref();
        let receipt = poll_until(&format!("finalization {tx_hash:#x}"), &self.wait, || async move {
            l1.transaction_receipt(tx_hash).await
        })
        .await?;
        if !receipt.status {
            if self.is_finalized(batch_number, message_index).await? {
                tracing::warn!(%tx_hash, "finalization reverted but the withdrawal is finalized");
                self.record(handle, WithdrawalPhase::Finalized);
                return Ok(FinalizeOutcome::AlreadyFinalized);
            }
            return Err(SdkError::send_failed("finalization reverted")
                .with_operation("withdrawals.finalize")
                .with_context("txHash", tx_hash));
        }
        self.record(handle, WithdrawalPhase::Finalized);
        Ok(FinalizeOutcome::Submitted { tx_hash })
    }

    /// Poll until `target` is reached. A withdrawal reverted on L2 ends every
    /// wait with `SendFailed`.
    pub async fn wait(
        &self,
        handle: &mut WithdrawalHandle,
        target: WithdrawalWaitTarget,
        options: &WaitOptions,
    ) -> Result<WithdrawalStatus> {
        let slot = tokio::sync::Mutex::new(handle);
        poll_until(&format!("withdrawal {target:?}"), options, || async {
            let mut handle = slot.lock().await;
            let status = self.status(&mut handle).await?;
            if status.phase == WithdrawalPhase::L2Failed {
                return Err(SdkError::send_failed("withdrawal reverted on L2")
                    .with_operation("withdrawals.wait")
                    .with_context("l2TxHash", handle.l2_tx_hash));
            }
            Ok(target.reached(status.phase).then_some(status))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{
        l1_message_sent_topic, IBridgehub, IL1AssetRouter, IL2AssetRouter, IL2NativeTokenVault,
        IERC20,
    };
    use crate::encode::encode_asset_id;
    use crate::errors::ErrorKind;
    use crate::plan::StepKind;
    use crate::testing::{context, log, receipt, MockChain, MockSender};
    use crate::types::{
        address_topic, L1_MESSENGER_ADDRESS, L2_BASE_TOKEN_ADDRESS, L2_NATIVE_TOKEN_VAULT_ADDRESS,
    };
    use alloy_primitives::Bytes;
    use alloy_sol_types::{SolCall, SolValue};

    const BRIDGEHUB: Address = Address::repeat_byte(0xb1);
    const ROUTER: Address = Address::repeat_byte(0xa1);
    const NULLIFIER: Address = Address::repeat_byte(0xc1);
    const TOKEN: Address = Address::repeat_byte(0x70);
    const SENDER: Address = Address::repeat_byte(0x5e);

    fn l1() -> MockChain {
        let l1 = MockChain::new(1);
        l1.respond(BRIDGEHUB, IBridgehub::assetRouterCall::SELECTOR, ROUTER.abi_encode());
        l1.respond(ROUTER, IL1AssetRouter::L1_NULLIFIERCall::SELECTOR, NULLIFIER.abi_encode());
        l1
    }

    fn withdrawals(l1: MockChain, l2: MockChain) -> Withdrawals {
        Withdrawals::new(Arc::new(context(l1, l2, BRIDGEHUB))).with_wait(WaitOptions::new(1, 1_000))
    }

    fn params(token: Address, amount: u64) -> WithdrawalParams {
        WithdrawalParams {
            token,
            amount: U256::from(amount),
            ..Default::default()
        }
    }

    fn withdrawal_receipt(hash: B256) -> TxReceipt {
        let logs = vec![log(
            L1_MESSENGER_ADDRESS,
            vec![l1_message_sent_topic(), address_topic(L2_BASE_TOKEN_ADDRESS), B256::ZERO],
            (Bytes::from(vec![0x6c, 0x09, 0x60, 0xf9]),).abi_encode_params(),
        )];
        receipt(hash, true, logs)
    }

    fn proof() -> LogProof {
        LogProof {
            id: 4,
            proof: vec![B256::repeat_byte(0xee)],
            root: B256::repeat_byte(0xff),
            batch_number: 7,
        }
    }

    #[tokio::test]
    async fn eth_withdrawal_burns_through_base_token() {
        let plan = withdrawals(l1(), MockChain::new(324))
            .prepare(&params(Address::ZERO, 900), SENDER)
            .await
            .unwrap();
        assert_eq!(plan.route, WithdrawalRoute::Eth);
        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.kind, StepKind::L2Withdraw);
        assert_eq!(step.tx.to, L2_BASE_TOKEN_ADDRESS);
        assert_eq!(step.tx.value, U256::from(900u64));
        assert_eq!(step.tx.gas, Some(U256::from(115_000u64)));
    }

    #[tokio::test]
    async fn erc20_withdrawal_approves_vault_and_derives_asset_id() {
        let l2 = MockChain::new(324);
        l2.respond(
            L2_NATIVE_TOKEN_VAULT_ADDRESS,
            IL2NativeTokenVault::assetIdCall::SELECTOR,
            B256::ZERO.abi_encode(),
        );
        l2.respond(TOKEN, IERC20::allowanceCall::SELECTOR, U256::ZERO.abi_encode());
        let plan = withdrawals(l1(), l2.clone()).prepare(&params(TOKEN, 50), SENDER).await.unwrap();

        let kinds: Vec<_> = plan.steps.iter().map(|step| step.kind).collect();
        assert_eq!(kinds, vec![StepKind::Approve, StepKind::L2Withdraw]);
        assert_eq!(plan.summary.approvals_needed[0].spender, L2_NATIVE_TOKEN_VAULT_ADDRESS);
        let expected = encode_asset_id(U256::from(324u64), TOKEN, L2_NATIVE_TOKEN_VAULT_ADDRESS);
        assert_eq!(plan.summary.asset_id, Some(expected));

        let call = IL2AssetRouter::withdrawCall::abi_decode(&plan.steps[1].tx.data).unwrap();
        assert_eq!(call._assetId, expected);
        assert_eq!(plan.steps[1].tx.value, U256::ZERO);
        // only the approval was simulated
        assert_eq!(plan.steps[1].tx.gas, None);
        assert_eq!(l2.estimate_calls(), 1);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let err = withdrawals(l1(), MockChain::new(324))
            .prepare(&params(Address::ZERO, 0), SENDER)
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn phases_advance_to_ready() {
        let l1 = l1();
        let l2 = MockChain::new(324);
        let hash = B256::repeat_byte(0x33);
        let withdrawals = withdrawals(l1.clone(), l2.clone());
        let mut handle = WithdrawalHandle::from_tx(hash);

        let status = withdrawals.status(&mut handle).await.unwrap();
        assert_eq!(status.phase, WithdrawalPhase::L2Pending);
        l2.add_receipt(withdrawal_receipt(hash));
        let status = withdrawals.status(&mut handle).await.unwrap();
        assert_eq!(status.phase, WithdrawalPhase::L2Included);

        l2.set_proof(hash, 0, proof());
        l1.respond(
            NULLIFIER,
            IL1Nullifier::isWithdrawalFinalizedCall::SELECTOR,
            false.abi_encode(),
        );
        let status = withdrawals
            .wait(&mut handle, WithdrawalWaitTarget::Ready, &WaitOptions::new(1, 1_000))
            .await
            .unwrap();
        assert_eq!(status.phase, WithdrawalPhase::ReadyToFinalize);
    }

    #[tokio::test]
    async fn finalize_twice_sends_once() {
        let l1 = l1();
        let l2 = MockChain::new(324);
        let hash = B256::repeat_byte(0x33);
        l2.add_receipt(withdrawal_receipt(hash));
        l2.set_proof(hash, 0, proof());
        l1.respond_seq(
            NULLIFIER,
            IL1Nullifier::isWithdrawalFinalizedCall::SELECTOR,
            vec![false.abi_encode(), true.abi_encode()],
        );
        let withdrawals = withdrawals(l1.clone(), l2);
        let sender = MockSender::new(SENDER, l1.clone());
        let mut handle = WithdrawalHandle::from_tx(hash);

        let first = withdrawals.finalize(&mut handle, &sender).await.unwrap();
        assert!(matches!(first, FinalizeOutcome::Submitted { .. }));
        let second = withdrawals.finalize(&mut handle, &sender).await.unwrap();
        assert_eq!(second, FinalizeOutcome::AlreadyFinalized);
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(handle.last_phase(), Some(WithdrawalPhase::Finalized));

        let call = IL1Nullifier::finalizeDepositCall::abi_decode(&sender.sent()[0].data).unwrap();
        let params = call._finalizeWithdrawalParams;
        assert_eq!(params.l2BatchNumber, U256::from(7u64));
        assert_eq!(params.l2MessageIndex, U256::from(4u64));
        assert_eq!(params.l2Sender, L2_BASE_TOKEN_ADDRESS);
        assert_eq!(params.l2TxNumberInBatch, 2);
        assert_eq!(sender.sent()[0].to, NULLIFIER);
    }

    #[tokio::test]
    async fn lost_finalize_race_is_not_an_error() {
        let l1 = l1();
        let l2 = MockChain::new(324);
        let hash = B256::repeat_byte(0x33);
        l2.add_receipt(withdrawal_receipt(hash));
        l2.set_proof(hash, 0, proof());
        l1.respond_seq(
            NULLIFIER,
            IL1Nullifier::isWithdrawalFinalizedCall::SELECTOR,
            vec![false.abi_encode(), true.abi_encode()],
        );
        let sender = MockSender::new(SENDER, l1.clone());
        sender.fail_at(0);
        let mut handle = WithdrawalHandle::from_tx(hash);
        let outcome = withdrawals(l1, l2).finalize(&mut handle, &sender).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::AlreadyFinalized);
    }

    #[tokio::test]
    async fn finalize_before_proof_is_rejected() {
        let l2 = MockChain::new(324);
        let hash = B256::repeat_byte(0x33);
        l2.add_receipt(withdrawal_receipt(hash));
        let l1 = l1();
        let sender = MockSender::new(SENDER, l1.clone());
        let err = withdrawals(l1, l2)
            .finalize(&mut WithdrawalHandle::from_tx(hash), &sender)
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Validation));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn reverted_withdrawal_ends_wait() {
        let l2 = MockChain::new(324);
        let hash = B256::repeat_byte(0x33);
        l2.add_receipt(receipt(hash, false, Vec::new()));
        let err = withdrawals(l1(), l2)
            .wait(
                &mut WithdrawalHandle::from_tx(hash),
                WithdrawalWaitTarget::Finalized,
                &WaitOptions::new(1, 1_000),
            )
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::SendFailed));
    }
}
