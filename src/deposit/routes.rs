//! Deposit route selection and per-route plan construction.

use super::{DepositParams, DepositPlan, DepositQuote};
use crate::abi::{calldata, decode_u256, IBridgehub};
use crate::client::{ChainEstimator, GasEstimator, L1ToL2Estimator, TxRequest};
use crate::context::{read, BridgeContext};
use crate::encode::encode_deposit_bridge_calldata;
use crate::errors::{Result, SdkError};
use crate::gas::{keys, BaseCostOptions, EnsureOptions};
use crate::plan::{ensure_allowance, AllowanceCheck, Plan, StepKind, StepList};
use crate::types::{is_eth_alias, ETH_ADDRESS_IN_CONTRACTS};
use alloy_primitives::{Address, Bytes, U256};
use serde::Serialize;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DepositRoute {
    #[serde(rename = "eth")]
    Eth,
    #[serde(rename = "erc20-base")]
    Erc20Base,
    #[serde(rename = "erc20-nonbase")]
    Erc20NonBase,
}

impl DepositRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositRoute::Eth => "eth",
            DepositRoute::Erc20Base => "erc20-base",
            DepositRoute::Erc20NonBase => "erc20-nonbase",
        }
    }
}

impl std::fmt::Display for DepositRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ETH aliases always take the `eth` route, whatever the base token. Lookup
/// errors are returned untouched.
pub async fn pick_deposit_route<F, Fut>(
    token: Address,
    base_token_lookup: F,
    chain_id: u64,
) -> Result<DepositRoute>
where
    F: FnOnce(u64) -> Fut,
    Fut: Future<Output = Result<Address>>,
{
    if is_eth_alias(token) {
        return Ok(DepositRoute::Eth);
    }
    let base_token = base_token_lookup(chain_id).await?;
    if base_token == token {
        Ok(DepositRoute::Erc20Base)
    } else {
        Ok(DepositRoute::Erc20NonBase)
    }
}

/// Live facts every route needs before it can price the deposit.
struct Prelude {
    base_token: Address,
    base_is_eth: bool,
    gas_price: U256,
    asset_router: Address,
}

impl DepositRoute {
    pub async fn preflight(&self, ctx: &BridgeContext, params: &DepositParams) -> Result<()> {
        if params.amount.is_zero() {
            return Err(SdkError::validation("deposit amount must be greater than zero")
                .with_operation("deposits.preflight"));
        }
        match self {
            DepositRoute::Eth => {
                if !is_eth_alias(params.token) {
                    return Err(route_mismatch(*self, params.token, "token is not ETH"));
                }
            }
            DepositRoute::Erc20Base | DepositRoute::Erc20NonBase => {
                if is_eth_alias(params.token) {
                    return Err(route_mismatch(*self, params.token, "token is ETH"));
                }
                let base_token = ctx
                    .base_token()
                    .await
                    .map_err(|err| err.into_contract().with_operation("deposits.preflight"))?;
                let is_base = base_token == params.token;
                if *self == DepositRoute::Erc20Base && !is_base {
                    return Err(route_mismatch(
                        *self,
                        params.token,
                        "token is not the chain base token",
                    )
                    .with_context("baseToken", base_token));
                }
                if *self == DepositRoute::Erc20NonBase && is_base {
                    return Err(route_mismatch(
                        *self,
                        params.token,
                        "token is the chain base token",
                    ));
                }
            }
        }
        Ok(())
    }

    pub async fn build(
        &self,
        ctx: &BridgeContext,
        params: &DepositParams,
        sender: Address,
    ) -> Result<DepositPlan> {
        let receiver = params.to.unwrap_or(sender);
        let refund_recipient = params.refund_recipient.unwrap_or(sender);
        let mut gas = ctx.planner();
        let mut steps = StepList::default();

        let (base_token, gas_price, asset_router) =
            futures::try_join!(ctx.base_token(), ctx.l1.gas_price(), ctx.l1_asset_router())?;
        let prelude = Prelude {
            base_token,
            base_is_eth: is_eth_alias(base_token),
            gas_price,
            asset_router,
        };
        let gas_per_pubdata = params
            .gas_per_pubdata
            .unwrap_or_else(|| U256::from(ctx.chain.gas_per_pubdata()));

        let l2_gas_limit = match params.l2_gas_limit {
            Some(limit) => limit,
            None => {
                let l2_tx =
                    self.l2_estimate_request(ctx, receiver, sender, params.amount, &prelude);
                let quote = gas
                    .ensure(
                        "l2-gas-limit",
                        keys::DEPOSIT_L2_GAS_LIMIT,
                        &l2_tx,
                        EnsureOptions {
                            estimator: Some(&L1ToL2Estimator(ctx.l2.as_ref())),
                            overrides: params.gas_overrides.get(keys::DEPOSIT_L2_GAS_LIMIT),
                        },
                    )
                    .await?;
                quote.recommended.ok_or_else(|| {
                    SdkError::config("no L2 gas limit: estimate failed and no fallback configured")
                        .with_operation("deposits.build")
                })?
            }
        };

        let base_cost_call = calldata(IBridgehub::l2TransactionBaseCostCall {
            _chainId: ctx.chain_id(),
            _gasPrice: prelude.gas_price,
            _l2GasLimit: l2_gas_limit,
            _l2GasPerPubdataByteLimit: gas_per_pubdata,
        });
        let raw = read(
            ctx.l1.as_ref(),
            ctx.chain.l1.bridgehub,
            base_cost_call,
            "bridgehub.l2TransactionBaseCost",
        )
        .await?;
        let base_cost = decode_u256(&raw)?;

        // value the bridge call mints on top of the fee, in base token units
        let extras = match (self, prelude.base_is_eth) {
            (DepositRoute::Eth, true) | (DepositRoute::Erc20Base, _) => params.amount,
            _ => U256::ZERO,
        };
        let base_quote = gas.apply_base_cost(
            "base-cost",
            keys::DEPOSIT_BASE_COST,
            base_cost,
            BaseCostOptions {
                operator_tip: params.operator_tip,
                extras: Some(extras),
                overrides: params.gas_overrides.get(keys::DEPOSIT_BASE_COST),
            },
        )?;
        let mint_value = base_quote.recommended;

        let approve = |token: Address, amount: U256| AllowanceCheck {
            client: ctx.l1.as_ref(),
            owner: sender,
            token,
            spender: prelude.asset_router,
            amount,
            policy: keys::APPROVE,
            overrides: params.gas_overrides.get(keys::APPROVE),
        };

        let (kind, data, value) = match (self, prelude.base_is_eth) {
            (DepositRoute::Eth, true) => {
                let request = direct_request(
                    ctx,
                    mint_value,
                    receiver,
                    params.amount,
                    l2_gas_limit,
                    gas_per_pubdata,
                    refund_recipient,
                );
                (StepKind::BridgeDirect, request, mint_value)
            }
            (DepositRoute::Eth, false) => {
                ensure_allowance(&mut steps, &mut gas, approve(prelude.base_token, mint_value))
                    .await?;
                let request = two_bridges_request(
                    ctx,
                    mint_value,
                    l2_gas_limit,
                    gas_per_pubdata,
                    refund_recipient,
                    prelude.asset_router,
                    params.amount,
                    encode_deposit_bridge_calldata(
                        ETH_ADDRESS_IN_CONTRACTS,
                        params.amount,
                        receiver,
                    ),
                );
                (StepKind::BridgeTwoBridges, request, params.amount)
            }
            (DepositRoute::Erc20Base, _) => {
                ensure_allowance(&mut steps, &mut gas, approve(params.token, mint_value)).await?;
                let request = direct_request(
                    ctx,
                    mint_value,
                    receiver,
                    params.amount,
                    l2_gas_limit,
                    gas_per_pubdata,
                    refund_recipient,
                );
                (StepKind::BridgeDirect, request, U256::ZERO)
            }
            (DepositRoute::Erc20NonBase, base_is_eth) => {
                ensure_allowance(&mut steps, &mut gas, approve(params.token, params.amount)).await?;
                let value = if base_is_eth {
                    mint_value
                } else {
                    ensure_allowance(&mut steps, &mut gas, approve(prelude.base_token, mint_value))
                        .await?;
                    U256::ZERO
                };
                let request = two_bridges_request(
                    ctx,
                    mint_value,
                    l2_gas_limit,
                    gas_per_pubdata,
                    refund_recipient,
                    prelude.asset_router,
                    U256::ZERO,
                    encode_deposit_bridge_calldata(params.token, params.amount, receiver),
                );
                (StepKind::BridgeTwoBridges, request, value)
            }
        };

        let mut tx = TxRequest::new(ctx.chain.l1.bridgehub, data)
            .from(sender)
            .value(value);
        // the allowance is not on chain yet, so simulating would revert
        let chain_estimator = ChainEstimator(ctx.l1.as_ref());
        let estimator: Option<&dyn GasEstimator> = if steps.needs_approval() {
            None
        } else {
            Some(&chain_estimator)
        };
        let quote = gas
            .ensure(
                "bridge",
                keys::DEPOSIT_L1,
                &tx,
                EnsureOptions {
                    estimator,
                    overrides: params.gas_overrides.get(keys::DEPOSIT_L1),
                },
            )
            .await?;
        tx.gas = quote.recommended;
        steps.push(
            "bridge",
            kind,
            format!(
                "deposit {} of {:#x} to chain {} via {self}",
                params.amount, params.token, ctx.chain.chain_id
            ),
            tx,
        );

        tracing::debug!(
            route = %self,
            %base_cost,
            %mint_value,
            steps = steps.steps.len(),
            "deposit plan built"
        );
        let summary = DepositQuote {
            route: *self,
            approvals_needed: steps.approvals,
            base_cost,
            operator_tip: params.operator_tip.unwrap_or_default(),
            mint_value,
            suggested_l2_gas_limit: l2_gas_limit,
            gas_per_pubdata,
            l1_gas_price: prelude.gas_price,
            base_token: prelude.base_token,
            gas: gas.snapshot(),
        };
        Ok(Plan {
            route: *self,
            summary,
            steps: steps.steps,
        })
    }

    /// The L2 side of the deposit as `zks_estimateGasL1ToL2` sees it.
    fn l2_estimate_request(
        &self,
        ctx: &BridgeContext,
        receiver: Address,
        sender: Address,
        amount: U256,
        prelude: &Prelude,
    ) -> TxRequest {
        match (self, prelude.base_is_eth) {
            (DepositRoute::Eth, true) | (DepositRoute::Erc20Base, _) => {
                TxRequest::new(receiver, Bytes::new()).from(sender).value(amount)
            }
            _ => TxRequest::new(ctx.chain.l2.asset_router, Bytes::new()).from(sender),
        }
    }
}

fn route_mismatch(route: DepositRoute, token: Address, reason: &str) -> SdkError {
    SdkError::validation(format!("route {route} does not apply: {reason}"))
        .with_operation("deposits.preflight")
        .with_context("token", token)
}

fn direct_request(
    ctx: &BridgeContext,
    mint_value: U256,
    receiver: Address,
    l2_value: U256,
    l2_gas_limit: U256,
    gas_per_pubdata: U256,
    refund_recipient: Address,
) -> Bytes {
    calldata(IBridgehub::requestL2TransactionDirectCall {
        _request: IBridgehub::L2TransactionRequestDirect {
            chainId: ctx.chain_id(),
            mintValue: mint_value,
            l2Contract: receiver,
            l2Value: l2_value,
            l2Calldata: Bytes::new(),
            l2GasLimit: l2_gas_limit,
            l2GasPerPubdataByteLimit: gas_per_pubdata,
            factoryDeps: Vec::new(),
            refundRecipient: refund_recipient,
        },
    })
}

#[allow(clippy::too_many_arguments)]
fn two_bridges_request(
    ctx: &BridgeContext,
    mint_value: U256,
    l2_gas_limit: U256,
    gas_per_pubdata: U256,
    refund_recipient: Address,
    second_bridge: Address,
    second_bridge_value: U256,
    second_bridge_calldata: Bytes,
) -> Bytes {
    calldata(IBridgehub::requestL2TransactionTwoBridgesCall {
        _request: IBridgehub::L2TransactionRequestTwoBridgesOuter {
            chainId: ctx.chain_id(),
            mintValue: mint_value,
            l2Value: U256::ZERO,
            l2GasLimit: l2_gas_limit,
            l2GasPerPubdataByteLimit: gas_per_pubdata,
            refundRecipient: refund_recipient,
            secondBridgeAddress: second_bridge,
            secondBridgeValue: second_bridge_value,
            secondBridgeCalldata: second_bridge_calldata,
        },
    })
}
