//! Verifying or executing a sent bundle on the destination chain.
//!
//! Relaying needs the source batch to be finalized, the L2 -> L1 message
//! proof for the bundle, and the destination root storage to have imported
//! the source batch root. Each of those is polled for in turn.

use super::{bundle_from_receipt, Interop, InteropHandle, InteropPhase};
use crate::abi::{
    calldata, decode_bytes32, encode_interop_bundle, IInteropHandler, IInteropRootStorage,
    L2Message, MessageInclusionProofSol,
};
use crate::client::{ChainEstimator, LogProof, TxReceipt, TxRequest, TxSender};
use crate::context::read;
use crate::errors::{Result, SdkError};
use crate::gas::{keys, EnsureOptions};
use crate::messages::find_l1_message;
use crate::plan::{PlanStep, StepKind};
use crate::wait::{poll_until, WaitOptions};
use alloy_primitives::{B256, U256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    Verify,
    Execute,
}

impl RelayMode {
    fn satisfied_by(&self, phase: InteropPhase) -> bool {
        match self {
            RelayMode::Verify => phase.rank() >= InteropPhase::Verified.rank(),
            RelayMode::Execute => phase.rank() >= InteropPhase::Executed.rank(),
        }
    }
}

impl std::str::FromStr for RelayMode {
    type Err = SdkError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "verify" => Ok(RelayMode::Verify),
            "execute" => Ok(RelayMode::Execute),
            other => Err(SdkError::validation(format!(
                "invalid relay mode {other} (expected verify or execute)"
            ))),
        }
    }
}

/// A ready-to-send handler transaction plus the proof it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPlan {
    pub mode: RelayMode,
    pub bundle_hash: B256,
    pub source_batch: u64,
    pub message_index: u64,
    pub root: B256,
    pub step: PlanStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RelayOutcome {
    /// The destination already reached the requested phase.
    Skipped { phase: InteropPhase },
    Submitted { tx_hash: B256 },
}

impl Interop {
    /// Gather the proof for `handle` and build the handler call, waiting for
    /// finality and root import as needed. `Ok(None)` when nothing is left to do.
    pub async fn prepare_relay(
        &self,
        handle: &mut InteropHandle,
        mode: RelayMode,
        sender: &dyn TxSender,
        wait: &WaitOptions,
    ) -> Result<Option<RelayPlan>> {
        let phase = self.status(handle).await?.phase;
        match phase {
            InteropPhase::Pending => {
                return Err(SdkError::validation("bundle send is not mined yet")
                    .with_operation("interop.relay")
                    .with_context("txHash", handle.source_tx_hash));
            }
            InteropPhase::Failed => {
                return Err(SdkError::send_failed("bundle send reverted on the source chain")
                    .with_operation("interop.relay")
                    .with_context("txHash", handle.source_tx_hash));
            }
            phase if mode.satisfied_by(phase) => {
                tracing::info!(?phase, ?mode, "destination already past requested phase");
                return Ok(None);
            }
            _ => {}
        }

        let source_tx_hash = handle.source_tx_hash;
        let receipt = self
            .src
            .l2
            .transaction_receipt(source_tx_hash)
            .await?
            .ok_or_else(|| SdkError::rpc(format!("receipt of {source_tx_hash:#x} disappeared")))?;
        let center = self.src.chain.l2.interop_center;
        let sent = bundle_from_receipt(&receipt, center).ok_or_else(|| {
            SdkError::contract("source receipt carries no InteropBundleSent")
                .with_operation("interop.relay")
                .with_context("txHash", source_tx_hash)
        })?;

        self.wait_finalized(&receipt, wait).await?;
        let message = find_l1_message(&receipt, self.src.chain.l2.l1_messenger, &[center])?;
        let proof = poll_until(&format!("log proof of {source_tx_hash:#x}"), wait, || async {
            self.src.l2.log_proof(source_tx_hash, message.index).await
        })
        .await?;
        self.wait_root(&proof, wait).await?;

        let tx_number = receipt
            .l1_batch_tx_index
            .or(receipt.transaction_index)
            .ok_or_else(|| SdkError::contract("receipt has no position in its batch"))?;
        let tx_number = u16::try_from(tx_number)
            .map_err(|_| SdkError::contract(format!("batch tx index {tx_number} out of range")))?;
        let inclusion = MessageInclusionProofSol {
            chainId: self.src.chain_id(),
            l1BatchNumber: U256::from(proof.batch_number),
            l2MessageIndex: U256::from(proof.id),
            message: L2Message {
                txNumberInBatch: tx_number,
                sender: center,
                data: message.message,
            },
            proof: proof.proof.clone(),
        };
        let bundle = encode_interop_bundle(&sent.bundle);
        let data = match mode {
            RelayMode::Verify => calldata(IInteropHandler::verifyBundleCall {
                _bundle: bundle,
                _proof: inclusion,
            }),
            RelayMode::Execute => calldata(IInteropHandler::executeBundleCall {
                _bundle: bundle,
                _proof: inclusion,
            }),
        };

        let mut tx = TxRequest::new(self.dst.chain.l2.interop_handler, data).from(sender.address());
        let quote = self
            .dst
            .planner()
            .ensure(
                "relay",
                keys::INTEROP_RELAY,
                &tx,
                EnsureOptions {
                    estimator: Some(&ChainEstimator(self.dst.l2.as_chain())),
                    overrides: None,
                },
            )
            .await?;
        tx.gas = quote.recommended;

        Ok(Some(RelayPlan {
            mode,
            bundle_hash: sent.bundle_hash,
            source_batch: proof.batch_number,
            message_index: proof.id,
            root: proof.root,
            step: PlanStep {
                key: "relay".into(),
                kind: StepKind::InteropRelay,
                description: format!(
                    "{mode:?} bundle {:#x} on chain {}",
                    sent.bundle_hash, self.dst.chain.chain_id
                ),
                tx,
            },
        }))
    }

    /// Prove and submit the bundle to the destination handler.
    pub async fn relay(
        &self,
        handle: &mut InteropHandle,
        mode: RelayMode,
        sender: &dyn TxSender,
        wait: &WaitOptions,
    ) -> Result<RelayOutcome> {
        let Some(plan) = self.prepare_relay(handle, mode, sender, wait).await? else {
            let phase = handle.last_phase().unwrap_or(InteropPhase::Sent);
            return Ok(RelayOutcome::Skipped { phase });
        };
        let tx_hash = sender
            .send(plan.step.tx)
            .await
            .map_err(|err| err.with_operation("interop.relay"))?;
        tracing::info!(%tx_hash, bundle_hash = %plan.bundle_hash, ?mode, "relay submitted");

        let dst = self.dst.l2.as_chain();
        let receipt = poll_until(&format!("receipt of {tx_hash:#x}"), wait, || async move {
            dst.transaction_receipt(tx_hash).await
        })
        .await?;
        if !receipt.status {
            let message = format!("{mode:?} of bundle {:#x} reverted", plan.bundle_hash);
            return Err(SdkError::send_failed(message)
                .with_operation("interop.relay")
                .with_context("txHash", tx_hash));
        }
        Ok(RelayOutcome::Submitted { tx_hash })
    }

    async fn wait_finalized(&self, receipt: &TxReceipt, wait: &WaitOptions) -> Result<()> {
        let block = receipt
            .block_number
            .ok_or_else(|| SdkError::rpc("source receipt has no block number"))?;
        let src = self.src.l2.as_chain();
        poll_until(&format!("finality of block {block}"), wait, || async move {
            let finalized = src.finalized_block_number().await?;
            Ok(finalized.filter(|finalized| *finalized >= block).map(|_| ()))
        })
        .await
    }

    /// Poll `interopRoots` until the source batch root lands. A different
    /// non-zero root means the proof cannot verify.
    async fn wait_root(&self, proof: &LogProof, wait: &WaitOptions) -> Result<()> {
        let storage = self.dst.chain.l2.interop_root_storage;
        let dst = self.dst.l2.as_chain();
        let source_chain = self.src.chain_id();
        let batch = proof.batch_number;
        let expected = proof.root;
        poll_until(&format!("interop root of batch {batch}"), wait, || async move {
            let data = calldata(IInteropRootStorage::interopRootsCall {
                chainId: source_chain,
                batchNumber: U256::from(batch),
            });
            let raw = read(dst, storage, data, "interopRootStorage.interopRoots").await?;
            let root = decode_bytes32(&raw)?;
            if root == B256::ZERO {
                return Ok(None);
            }
            if root != expected {
                return Err(SdkError::contract(format!(
                    "interop root mismatch for batch {batch}: expected {expected:#x}, got {root:#x}"
                ))
                .with_operation("interop.relay"));
            }
            Ok(Some(()))
        })
        .await
    }
}
