//! Plan shapes shared by deposits, withdrawals and interop bundles.

use crate::abi::{calldata, decode_u256, IERC20};
use crate::client::{ChainClient, ChainEstimator, TxRequest, TxSender};
use crate::errors::{Result, SdkError};
use crate::gas::{EnsureOptions, GasPlanner, GasPolicyOverride};
use crate::wait::{poll_until, WaitOptions};
use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Approve,
    RegisterToken,
    BridgeDirect,
    BridgeTwoBridges,
    L2Withdraw,
    InteropSend,
    Finalize,
    InteropRelay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Unique within one plan.
    pub key: String,
    pub kind: StepKind,
    pub description: String,
    pub tx: TxRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalNeed {
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
}

/// Ordered steps plus the route-specific quote. Approvals always precede the
/// step that consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan<R, Q> {
    pub route: R,
    pub summary: Q,
    pub steps: Vec<PlanStep>,
}

impl<R, Q> Plan<R, Q> {
    pub fn step(&self, kind: StepKind) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.kind == kind)
    }

    pub fn approvals(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps
            .iter()
            .filter(|step| step.kind == StepKind::Approve)
    }
}

/// Steps accumulated while one route builds its plan.
#[derive(Debug, Default)]
pub struct StepList {
    pub steps: Vec<PlanStep>,
    pub approvals: Vec<ApprovalNeed>,
}

impl StepList {
    pub fn push(
        &mut self,
        key: impl Into<String>,
        kind: StepKind,
        description: impl Into<String>,
        tx: TxRequest,
    ) {
        self.steps.push(PlanStep {
            key: key.into(),
            kind,
            description: description.into(),
            tx,
        });
    }

    pub fn needs_approval(&self) -> bool {
        !self.approvals.is_empty()
    }
}

/// Everything `ensure_allowance` needs to size and cost one approval.
pub struct AllowanceCheck<'a> {
    pub client: &'a dyn ChainClient,
    pub owner: Address,
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
    pub policy: &'a str,
    pub overrides: Option<&'a GasPolicyOverride>,
}

pub async fn read_allowance(
    client: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    let data = calldata(IERC20::allowanceCall { owner, spender });
    let raw = client.call(token, data).await.map_err(|err| {
        err.into_contract()
            .with_operation("erc20.allowance")
            .with_resource(format!("{token:#x}"))
    })?;
    decode_u256(&raw).map_err(|err| err.with_resource(format!("{token:#x}")))
}

/// Append an exact-amount `approve` step when the live allowance is short.
/// Returns whether a step was added.
pub async fn ensure_allowance(
    steps: &mut StepList,
    gas: &mut GasPlanner,
    check: AllowanceCheck<'_>,
) -> Result<bool> {
    let current = read_allowance(check.client, check.token, check.owner, check.spender).await?;
    if current >= check.amount {
        tracing::debug!(
            token = %check.token,
            %current,
            required = %check.amount,
            "allowance sufficient"
        );
        return Ok(false);
    }

    let key = format!("approve:{:#x}:{:#x}", check.token, check.spender);
    let data = calldata(IERC20::approveCall {
        spender: check.spender,
        value: check.amount,
    });
    let mut tx = TxRequest::new(check.token, data).from(check.owner);
    let quote = gas
        .ensure(
            &key,
            check.policy,
            &tx,
            EnsureOptions {
                estimator: Some(&ChainEstimator(check.client)),
                overrides: check.overrides,
            },
        )
        .await?;
    tx.gas = quote.recommended;

    steps.approvals.push(ApprovalNeed {
        token: check.token,
        spender: check.spender,
        amount: check.amount,
    });
    steps.push(
        key,
        StepKind::Approve,
        format!("approve {} of {:#x} for {:#x}", check.amount, check.token, check.spender),
        tx,
    );
    Ok(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Deposit,
    Withdrawal,
    Interop,
}

/// Submit `steps` in order, waiting for each receipt before sending the next.
/// Returns `(step key, tx hash)` pairs; a reverted step stops the run.
pub async fn submit_steps(
    steps: &[PlanStep],
    sender: &dyn TxSender,
    client: &dyn ChainClient,
    wait: &WaitOptions,
) -> Result<Vec<(String, B256)>> {
    let mut hashes = Vec::with_capacity(steps.len());
    for step in steps {
        let hash = sender.send(step.tx.clone()).await.map_err(|err| {
            err.with_operation("submit")
                .with_context("step", &step.key)
        })?;
        tracing::info!(step = %step.key, kind = ?step.kind, tx_hash = %hash, "submitted");
        let receipt = poll_until(&format!("receipt of {hash:#x}"), wait, || async move {
            client.transaction_receipt(hash).await
        })
        .await?;
        if !receipt.status {
            return Err(SdkError::send_failed(format!("step {} reverted", step.key))
                .with_operation("submit")
                .with_context("txHash", hash)
                .with_context("submitted", &hashes));
        }
        hashes.push((step.key.clone(), hash));
    }
    Ok(hashes)
}
