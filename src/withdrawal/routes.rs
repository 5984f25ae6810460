use super::{WithdrawalParams, WithdrawalPlan, WithdrawalQuote};
use crate::abi::{calldata, decode_bytes32, IL2AssetRouter, IL2BaseToken, IL2NativeTokenVault};
use crate::client::{ChainEstimator, GasEstimator, TxRequest};
use crate::context::{read, BridgeContext};
use crate::encode::{encode_asset_id, encode_bridge_burn_data};
use crate::errors::{Result, SdkError};
use crate::gas::{keys, EnsureOptions};
use crate::plan::{ensure_allowance, AllowanceCheck, Plan, StepKind, StepList};
use crate::types::is_eth_alias;
use alloy_primitives::{Address, B256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalRoute {
    /// Base token burned through the L2 base token system contract.
    Eth,
    /// Any other token, burned through the L2 asset router.
    Erc20,
}

impl std::fmt::Display for WithdrawalRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalRoute::Eth => f.write_str("eth"),
            WithdrawalRoute::Erc20 => f.write_str("erc20"),
        }
    }
}

pub fn pick_withdrawal_route(token: Address) -> WithdrawalRoute {
    if is_eth_alias(token) {
        WithdrawalRoute::Eth
    } else {
        WithdrawalRoute::Erc20
    }
}

impl WithdrawalRoute {
    pub async fn preflight(&self, _ctx: &BridgeContext, params: &WithdrawalParams) -> Result<()> {
        if params.amount.is_zero() {
            return Err(SdkError::validation("withdrawal amount must be greater than zero")
                .with_operation("withdrawals.preflight"));
        }
        let is_eth = is_eth_alias(params.token);
        if (*self == WithdrawalRoute::Eth) != is_eth {
            return Err(SdkError::validation(format!(
                "route {self} does not apply to token {:#x}",
                params.token
            ))
            .with_operation("withdrawals.preflight"));
        }
        Ok(())
    }

    pub async fn build(
        &self,
        ctx: &BridgeContext,
        params: &WithdrawalParams,
        sender: Address,
    ) -> Result<WithdrawalPlan> {
        let receiver = params.to.unwrap_or(sender);
        let mut gas = ctx.planner();
        let mut steps = StepList::default();
        let l2 = ctx.l2.as_chain();

        let (target, data, value, kind, asset_id) = match self {
            WithdrawalRoute::Eth => {
                let data = calldata(IL2BaseToken::withdrawCall {
                    _l1Receiver: receiver,
                });
                (ctx.chain.l2.base_token_system, data, params.amount, StepKind::L2Withdraw, None)
            }
            WithdrawalRoute::Erc20 => {
                let asset_id = self.asset_id(ctx, params.token).await?;
                ensure_allowance(
                    &mut steps,
                    &mut gas,
                    AllowanceCheck {
                        client: l2,
                        owner: sender,
                        token: params.token,
                        spender: ctx.chain.l2.native_token_vault,
                        amount: params.amount,
                        policy: keys::WITHDRAW_APPROVE,
                        overrides: params.gas_overrides.get(keys::WITHDRAW_APPROVE),
                    },
                )
                .await?;
                let data = calldata(IL2AssetRouter::withdrawCall {
                    _assetId: asset_id,
                    _assetData: encode_bridge_burn_data(params.amount, receiver, params.token),
                });
                (
                    ctx.chain.l2.asset_router,
                    data,
                    alloy_primitives::U256::ZERO,
                    StepKind::L2Withdraw,
                    Some(asset_id),
                )
            }
        };

        let mut tx = TxRequest::new(target, data).from(sender).value(value);
        let chain_estimator = ChainEstimator(l2);
        let estimator: Option<&dyn GasEstimator> = if steps.needs_approval() {
            None
        } else {
            Some(&chain_estimator)
        };
        let quote = gas
            .ensure(
                "withdraw",
                keys::WITHDRAW_L2,
                &tx,
                EnsureOptions {
                    estimator,
                    overrides: params.gas_overrides.get(keys::WITHDRAW_L2),
                },
            )
            .await?;
        tx.gas = quote.recommended;
        let suggested_l2_gas_limit = tx.gas;
        steps.push(
            "withdraw",
            kind,
            format!(
                "withdraw {} of {:#x} to {receiver:#x} via {self}",
                params.amount, params.token
            ),
            tx,
        );

        let summary = WithdrawalQuote {
            route: *self,
            approvals_needed: steps.approvals,
            asset_id,
            suggested_l2_gas_limit,
            gas: gas.snapshot(),
        };
        Ok(Plan {
            route: *self,
            summary,
            steps: steps.steps,
        })
    }

    /// Registered asset id, or the id the vault will assign to an L2-native
    /// token on first bridge.
    async fn asset_id(&self, ctx: &BridgeContext, token: Address) -> Result<B256> {
        let vault = ctx.chain.l2.native_token_vault;
        let data = calldata(IL2NativeTokenVault::assetIdCall { token });
        let raw = read(ctx.l2.as_chain(), vault, data, "ntv.assetId").await?;
        let asset_id = decode_bytes32(&raw)?;
        if asset_id != B256::ZERO {
            return Ok(asset_id);
        }
        tracing::debug!(%token, "token not registered; deriving native asset id");
        Ok(encode_asset_id(ctx.chain_id(), token, vault))
    }
}
