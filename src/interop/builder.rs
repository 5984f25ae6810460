//! Bundle items, the native value rule and plan building.

use super::{InteropParams, InteropPlan, InteropQuote};
use crate::abi::{calldata, decode_bytes32, IInteropCenter, IL2NativeTokenVault};
use crate::client::{ChainEstimator, GasEstimator, TxRequest};
use crate::context::{read, BridgeContext};
use crate::encode::{
    encode_asset_id, encode_asset_transfer_calldata, encode_evm_v1_address_only,
    encode_evm_v1_chain_only, encode_evm_v1_with_address, encode_execution_address,
    encode_indirect_call, encode_interop_call_value, encode_unbundler_address,
};
use crate::errors::{Result, SdkError};
use crate::gas::{keys, EnsureOptions};
use crate::plan::{ensure_allowance, AllowanceCheck, Plan, StepKind, StepList};
use crate::types::is_eth_alias;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One call descriptor of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InteropItem {
    NativeTransfer {
        to: Address,
        amount: U256,
    },
    Erc20Transfer {
        token: Address,
        amount: U256,
        to: Address,
    },
    Call {
        to: Address,
        #[serde(default)]
        data: Bytes,
        #[serde(default)]
        value: U256,
    },
}

impl InteropItem {
    /// Native value this item moves to the destination.
    pub fn native_value(&self) -> U256 {
        match self {
            InteropItem::NativeTransfer { amount, .. } => *amount,
            InteropItem::Erc20Transfer { .. } => U256::ZERO,
            InteropItem::Call { value, .. } => *value,
        }
    }
}

/// How the `msg.value` of `sendBundle` is derived from the items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleValuePolicy {
    /// Sum of every native amount and call value.
    #[default]
    SumAlways,
    /// Sum only when both chains share a base token. Native value towards a
    /// chain with a different base token is rejected.
    SameNativeAssetOnly,
}

impl BundleValuePolicy {
    pub fn total_value(&self, items: &[InteropItem], same_native_asset: bool) -> Result<U256> {
        let sum = items
            .iter()
            .map(InteropItem::native_value)
            .fold(U256::ZERO, |acc, value| acc + value);
        match self {
            BundleValuePolicy::SumAlways => Ok(sum),
            BundleValuePolicy::SameNativeAssetOnly if same_native_asset || sum.is_zero() => {
                Ok(if same_native_asset { sum } else { U256::ZERO })
            }
            BundleValuePolicy::SameNativeAssetOnly => Err(SdkError::unsupported(
                "native value cannot be bundled between chains with different base tokens",
            )
            .with_operation("interop.build")
            .with_context("value", sum)),
        }
    }
}

impl std::str::FromStr for BundleValuePolicy {
    type Err = SdkError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "sum-always" => Ok(BundleValuePolicy::SumAlways),
            "same-native-asset-only" => Ok(BundleValuePolicy::SameNativeAssetOnly),
            other => Err(SdkError::config(format!("unknown bundle value policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteropRoute {
    /// Native transfers and plain calls only.
    Direct,
    /// At least one ERC-20 transfer through the asset router.
    Router,
}

impl std::fmt::Display for InteropRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteropRoute::Direct => f.write_str("direct"),
            InteropRoute::Router => f.write_str("router"),
        }
    }
}

pub fn pick_interop_route(items: &[InteropItem]) -> InteropRoute {
    if items
        .iter()
        .any(|item| matches!(item, InteropItem::Erc20Transfer { .. }))
    {
        InteropRoute::Router
    } else {
        InteropRoute::Direct
    }
}

/// ERC-20 totals per token, in first-seen order.
fn token_totals(items: &[InteropItem]) -> Vec<(Address, U256)> {
    let mut totals: Vec<(Address, U256)> = Vec::new();
    for item in items {
        if let InteropItem::Erc20Transfer { token, amount, .. } = item {
            match totals.iter_mut().find(|(seen, _)| seen == token) {
                Some((_, total)) => *total += *amount,
                None => totals.push((*token, *amount)),
            }
        }
    }
    totals
}

impl InteropRoute {
    pub async fn preflight(
        &self,
        src: &BridgeContext,
        dst: &BridgeContext,
        params: &InteropParams,
    ) -> Result<()> {
        let fail = |message: String| {
            Err(SdkError::validation(message).with_operation("interop.preflight"))
        };
        if params.items.is_empty() {
            return fail("bundle has no items".into());
        }
        if src.chain.chain_id == dst.chain.chain_id {
            return fail(format!("source and destination are both chain {}", src.chain.chain_id));
        }
        if *self != pick_interop_route(&params.items) {
            return fail(format!("route {self} does not match the bundle items"));
        }
        for (index, item) in params.items.iter().enumerate() {
            match item {
                InteropItem::NativeTransfer { amount, .. } if amount.is_zero() => {
                    return fail(format!("item {index}: native transfer of zero"));
                }
                InteropItem::Erc20Transfer { amount, .. } if amount.is_zero() => {
                    return fail(format!("item {index}: token transfer of zero"));
                }
                InteropItem::Erc20Transfer { token, .. } if is_eth_alias(*token) => {
                    return fail(format!(
                        "item {index}: {token:#x} is the base token; use a native transfer"
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub async fn build(
        &self,
        src: &BridgeContext,
        dst: &BridgeContext,
        params: &InteropParams,
        sender: Address,
    ) -> Result<InteropPlan> {
        let same_native_asset = match params.value_policy {
            BundleValuePolicy::SumAlways => true,
            BundleValuePolicy::SameNativeAssetOnly => {
                let (src_base, dst_base) = futures::try_join!(src.base_token(), dst.base_token())?;
                src_base == dst_base
            }
        };
        let total_value = params.value_policy.total_value(&params.items, same_native_asset)?;

        let mut gas = src.planner();
        let mut steps = StepList::default();
        let l2 = src.l2.as_chain();
        let vault = src.chain.l2.native_token_vault;

        let totals = token_totals(&params.items);
        let mut asset_ids = BTreeMap::new();
        let mut registrations = Vec::new();
        for (token, _) in &totals {
            let data = calldata(IL2NativeTokenVault::assetIdCall { token: *token });
            let raw = read(l2, vault, data, "ntv.assetId").await?;
            let mut asset_id = decode_bytes32(&raw)?;
            if asset_id == B256::ZERO {
                self.push_registration(&mut steps, &mut gas, src, *token, sender, params).await?;
                registrations.push(*token);
                asset_id = encode_asset_id(src.chain_id(), *token, vault);
            }
            asset_ids.insert(*token, asset_id);
        }
        for (token, total) in &totals {
            ensure_allowance(
                &mut steps,
                &mut gas,
                AllowanceCheck {
                    client: l2,
                    owner: sender,
                    token: *token,
                    spender: vault,
                    amount: *total,
                    policy: keys::INTEROP_APPROVE,
                    overrides: params.gas_overrides.get(keys::INTEROP_APPROVE),
                },
            )
            .await?;
        }

        let starters = params
            .items
            .iter()
            .map(|item| match item {
                InteropItem::NativeTransfer { to, amount } => IInteropCenter::InteropCallStarter {
                    to: encode_evm_v1_address_only(*to),
                    data: Bytes::new(),
                    callAttributes: vec![encode_interop_call_value(*amount)],
                },
                InteropItem::Erc20Transfer { token, amount, to } => {
                    IInteropCenter::InteropCallStarter {
                        to: encode_evm_v1_address_only(dst.chain.l2.asset_router),
                        data: encode_asset_transfer_calldata(
                            asset_ids[token],
                            *amount,
                            *to,
                            *token,
                        ),
                        callAttributes: vec![encode_indirect_call(U256::ZERO)],
                    }
                }
                InteropItem::Call { to, data, value } => IInteropCenter::InteropCallStarter {
                    to: encode_evm_v1_address_only(*to),
                    data: data.clone(),
                    callAttributes: if value.is_zero() {
                        Vec::new()
                    } else {
                        vec![encode_interop_call_value(*value)]
                    },
                },
            })
            .collect();

        let destination = dst.chain_id();
        let mut bundle_attributes = Vec::new();
        if let Some(executor) = params.execution_address {
            let executor = encode_evm_v1_with_address(destination, executor);
            bundle_attributes.push(encode_execution_address(executor));
        }
        if let Some(unbundler) = params.unbundler {
            let unbundler = encode_evm_v1_with_address(destination, unbundler);
            bundle_attributes.push(encode_unbundler_address(unbundler));
        }

        let data = calldata(IInteropCenter::sendBundleCall {
            _destinationChainId: encode_evm_v1_chain_only(destination),
            _callStarters: starters,
            _bundleAttributes: bundle_attributes,
        });
        let mut tx = TxRequest::new(src.chain.l2.interop_center, data)
            .from(sender)
            .value(total_value);
        let chain_estimator = ChainEstimator(l2);
        // registration and approvals have not landed yet
        let estimator: Option<&dyn GasEstimator> = if steps.steps.is_empty() {
            Some(&chain_estimator)
        } else {
            None
        };
        let quote = gas
            .ensure(
                "send",
                keys::INTEROP_SEND,
                &tx,
                EnsureOptions {
                    estimator,
                    overrides: params.gas_overrides.get(keys::INTEROP_SEND),
                },
            )
            .await?;
        tx.gas = quote.recommended;
        let suggested_gas_limit = tx.gas;
        steps.push(
            "send",
            StepKind::InteropSend,
            format!(
                "send bundle of {} call(s) to chain {} with value {total_value}",
                params.items.len(),
                dst.chain.chain_id
            ),
            tx,
        );

        let summary = InteropQuote {
            route: *self,
            approvals_needed: steps.approvals,
            registrations,
            total_value,
            value_policy: params.value_policy,
            source_chain_id: src.chain.chain_id,
            destination_chain_id: dst.chain.chain_id,
            suggested_gas_limit,
            gas: gas.snapshot(),
        };
        Ok(Plan {
            route: *self,
            summary,
            steps: steps.steps,
        })
    }

    async fn push_registration(
        &self,
        steps: &mut StepList,
        gas: &mut crate::gas::GasPlanner,
        src: &BridgeContext,
        token: Address,
        sender: Address,
        params: &InteropParams,
    ) -> Result<()> {
        let key = format!("register:{token:#x}");
        let data = calldata(IL2NativeTokenVault::ensureTokenIsRegisteredCall {
            _nativeToken: token,
        });
        let mut tx = TxRequest::new(src.chain.l2.native_token_vault, data).from(sender);
        let quote = gas
            .ensure(
                &key,
                keys::INTEROP_APPROVE,
                &tx,
                EnsureOptions {
                    estimator: Some(&ChainEstimator(src.l2.as_chain())),
                    overrides: params.gas_overrides.get(keys::INTEROP_APPROVE),
                },
            )
            .await?;
        tx.gas = quote.recommended;
        tracing::info!(%token, "token not registered in the vault; adding registration step");
        steps.push(
            key,
            StepKind::RegisterToken,
            format!("register {token:#x} in the native token vault"),
            tx,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn native(amount: u64) -> InteropItem {
        InteropItem::NativeTransfer {
            to: Address::repeat_byte(1),
            amount: U256::from(amount),
        }
    }

    #[test]
    fn sum_always_adds_transfers_and_call_values() {
        let items = vec![
            native(10),
            InteropItem::Call {
                to: Address::repeat_byte(2),
                data: Bytes::new(),
                value: U256::from(5u64),
            },
            InteropItem::Erc20Transfer {
                token: Address::repeat_byte(3),
                amount: U256::from(1_000u64),
                to: Address::repeat_byte(4),
            },
        ];
        let total = BundleValuePolicy::SumAlways.total_value(&items, false).unwrap();
        assert_eq!(total, U256::from(15u64));
    }

    #[test]
    fn heterogeneous_assets_reject_native_value() {
        let policy = BundleValuePolicy::SameNativeAssetOnly;
        assert_eq!(policy.total_value(&[native(10)], true).unwrap(), U256::from(10u64));
        let err = policy.total_value(&[native(10)], false).unwrap_err();
        assert!(err.is(ErrorKind::Unsupported));
        let call = InteropItem::Call {
            to: Address::repeat_byte(2),
            data: Bytes::from(vec![1]),
            value: U256::ZERO,
        };
        assert_eq!(policy.total_value(&[call], false).unwrap(), U256::ZERO);
    }

    #[test]
    fn token_totals_merge_repeated_tokens() {
        let token = Address::repeat_byte(3);
        let transfer = |amount: u64| InteropItem::Erc20Transfer {
            token,
            amount: U256::from(amount),
            to: Address::repeat_byte(4),
        };
        let totals = token_totals(&[transfer(2), native(1), transfer(3)]);
        assert_eq!(totals, vec![(token, U256::from(5u64))]);
        assert_eq!(pick_interop_route(&[native(1), transfer(1)]), InteropRoute::Router);
        assert_eq!(pick_interop_route(&[native(1)]), InteropRoute::Direct);
    }

    #[test]
    fn items_deserialize_from_tagged_json() {
        let json = r#"[
            {"type": "nativeTransfer", "to": "0x0101010101010101010101010101010101010101", "amount": "0x10"},
            {"type": "call", "to": "0x0202020202020202020202020202020202020202", "data": "0x1234"}
        ]"#;
        let items: Vec<InteropItem> = serde_json::from_str(json).unwrap();
        assert_eq!(items[0].native_value(), U256::from(16u64));
        assert_eq!(items[1].native_value(), U256::ZERO);
    }
}
