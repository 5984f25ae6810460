//! Per-chain context handed to every route: clients, registry entry and the
//! lazily discovered settlement-layer addresses.

use crate::abi::{calldata, decode_address, IBridgehub, IL1AssetRouter};
use crate::client::{ChainClient, RollupClient};
use crate::errors::{Result, SdkError};
use crate::gas::{GasPlanner, GasPolicyStore};
use crate::registry::ChainInfo;
use alloy_primitives::{Address, Bytes, U256};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct BridgeContext {
    pub chain: ChainInfo,
    pub l1: Arc<dyn ChainClient>,
    pub l2: Arc<dyn RollupClient>,
    gas: Arc<GasPolicyStore>,
    asset_router: OnceCell<Address>,
    nullifier: OnceCell<Address>,
    base_token: OnceCell<Address>,
}

impl BridgeContext {
    /// Chain-level gas overrides are folded into the store once here so each
    /// planner starts from the same template.
    pub fn new(
        chain: ChainInfo,
        l1: Arc<dyn ChainClient>,
        l2: Arc<dyn RollupClient>,
        gas: Arc<GasPolicyStore>,
    ) -> Result<Self> {
        let gas = if chain.gas_overrides.is_empty() {
            gas
        } else {
            Arc::new(gas.merged(&chain.gas_overrides)?)
        };
        Ok(Self {
            chain,
            l1,
            l2,
            gas,
            asset_router: OnceCell::new(),
            nullifier: OnceCell::new(),
            base_token: OnceCell::new(),
        })
    }

    pub fn chain_id(&self) -> U256 {
        U256::from(self.chain.chain_id)
    }

    pub fn gas_store(&self) -> Arc<GasPolicyStore> {
        Arc::clone(&self.gas)
    }

    /// A fresh planner; never share one between plans.
    pub fn planner(&self) -> GasPlanner {
        GasPlanner::new(self.gas_store())
    }

    pub async fn base_token(&self) -> Result<Address> {
        if let Some(pinned) = self.chain.base_token {
            return Ok(pinned);
        }
        self.base_token
            .get_or_try_init(|| async {
                let data = calldata(IBridgehub::baseTokenCall {
                    _chainId: self.chain_id(),
                });
                let raw = read(
                    self.l1.as_ref(),
                    self.chain.l1.bridgehub,
                    data,
                    "bridgehub.baseToken",
                )
                .await?;
                decode_address(&raw)
            })
            .await
            .copied()
    }

    pub async fn l1_asset_router(&self) -> Result<Address> {
        if let Some(pinned) = self.chain.l1.asset_router {
            return Ok(pinned);
        }
        self.asset_router
            .get_or_try_init(|| async {
                let data = calldata(IBridgehub::assetRouterCall {});
                let raw = read(
                    self.l1.as_ref(),
                    self.chain.l1.bridgehub,
                    data,
                    "bridgehub.assetRouter",
                )
                .await?;
                let router = decode_address(&raw)?;
                if router == Address::ZERO {
                    return Err(SdkError::config("bridgehub reports no asset router")
                        .with_resource(format!("{:#x}", self.chain.l1.bridgehub)));
                }
                tracing::debug!(%router, "discovered L1 asset router");
                Ok(router)
            })
            .await
            .copied()
    }

    pub async fn l1_nullifier(&self) -> Result<Address> {
        if let Some(pinned) = self.chain.l1.nullifier {
            return Ok(pinned);
        }
        let router = self.l1_asset_router().await?;
        self.nullifier
            .get_or_try_init(|| async {
                let data = calldata(IL1AssetRouter::L1_NULLIFIERCall {});
                let raw = read(self.l1.as_ref(), router, data, "assetRouter.L1_NULLIFIER").await?;
                let nullifier = decode_address(&raw)?;
                tracing::debug!(%nullifier, "discovered L1 nullifier");
                Ok(nullifier)
            })
            .await
            .copied()
    }
}

/// `eth_call` with read failures surfaced as contract errors.
pub async fn read(
    client: &dyn ChainClient,
    to: Address,
    data: Bytes,
    operation: &str,
) -> Result<Bytes> {
    client.call(to, data).await.map_err(|err| {
        err.into_contract()
            .with_operation(operation.to_string())
            .with_resource(format!("{to:#x}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{context, MockChain};
    use alloy_sol_types::{SolCall, SolValue};

    #[tokio::test]
    async fn discovers_router_and_nullifier_once() {
        let l1 = MockChain::new(1);
        let bridgehub = Address::repeat_byte(0xb1);
        let router = Address::repeat_byte(0xa1);
        let nullifier = Address::repeat_byte(0xc1);
        l1.respond(bridgehub, IBridgehub::assetRouterCall::SELECTOR, router.abi_encode());
        l1.respond(router, IL1AssetRouter::L1_NULLIFIERCall::SELECTOR, nullifier.abi_encode());

        let ctx = context(l1.clone(), MockChain::new(324), bridgehub);
        assert_eq!(ctx.l1_nullifier().await.unwrap(), nullifier);
        assert_eq!(ctx.l1_asset_router().await.unwrap(), router);
        assert_eq!(l1.calls_to(bridgehub), 1);
    }

    #[tokio::test]
    async fn failed_read_is_contract_error() {
        let l1 = MockChain::new(1);
        let ctx = context(l1, MockChain::new(324), Address::repeat_byte(0xb1));
        let err = ctx.base_token().await.unwrap_err();
        assert!(err.is(ErrorKind::Contract));
        assert_eq!(err.context.operation.as_deref(), Some("bridgehub.baseToken"));
    }
}
