pub mod chains;
pub mod deposit;
pub mod interop;
pub mod withdraw;

use crate::cli::{SignerArgs, WaitArgs};
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zks_bridge::bundle_index::BundleIndex;
use zks_bridge::config::Config;
use zks_bridge::context::BridgeContext;
use zks_bridge::gas::GasPolicyStore;
use zks_bridge::registry::ChainRegistry;
use zks_bridge::rpc::RpcClient;
use zks_bridge::signer::{load_signer, SignerOptions, WalletSender};
use zks_bridge::wait::WaitOptions;

/// Everything one invocation needs: config, registry, gas templates, the
/// bundle index and the Ctrl-C cancellation token.
pub struct Session {
    pub config: Config,
    pub registry: ChainRegistry,
    pub json: bool,
    gas: Arc<GasPolicyStore>,
    index: Arc<BundleIndex>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(config: Config, json: bool) -> Result<Self> {
        let registry = config.registry()?;
        let gas = Arc::new(GasPolicyStore::defaults().merged(&config.gas)?);
        let index = Arc::new(BundleIndex::new(config.interop.bundle_index_capacity));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling waits");
                token.cancel();
            }
        });
        Ok(Self {
            config,
            registry,
            json,
            gas,
            index,
            cancel,
        })
    }

    pub fn context(&self, chain: &str) -> Result<Arc<BridgeContext>> {
        let info = self.registry.get(chain)?.clone();
        let l1 = RpcClient::new(self.config.settlement_rpc()?)?;
        let l2 = RpcClient::new(self.config.chain_rpc(&info)?)?;
        tracing::debug!(chain = %info.key, chain_id = info.chain_id, "connected chain context");
        Ok(Arc::new(BridgeContext::new(
            info,
            Arc::new(l1),
            Arc::new(l2),
            Arc::clone(&self.gas),
        )?))
    }

    pub fn bundle_index(&self) -> Arc<BundleIndex> {
        Arc::clone(&self.index)
    }

    /// Config defaults, overridden per command, cancelled by Ctrl-C.
    pub fn wait(&self, args: &WaitArgs) -> WaitOptions {
        let base = self.config.wait_options();
        WaitOptions::new(
            args.poll_ms.unwrap_or(base.poll_ms),
            args.timeout_ms.unwrap_or(base.timeout_ms),
        )
        .with_cancel(self.cancel.clone())
    }

    fn signer(&self, args: &SignerArgs) -> Result<Option<PrivateKeySigner>> {
        Ok(load_signer(
            SignerOptions {
                private_key: args.private_key.as_deref(),
                private_key_env: args.private_key_env.as_deref(),
            },
            &self.config.signer_env(),
        )?)
    }

    /// The address plans are built for: `--from`, else the signer's.
    pub fn sender_address(&self, args: &SignerArgs) -> Result<Address> {
        if let Some(from) = args.from {
            return Ok(from);
        }
        self.signer(args)?
            .map(|signer| signer.address())
            .ok_or_else(|| {
                anyhow!(
                    "no sender: pass --from, --private-key or set {}",
                    self.config.signer_env()
                )
            })
    }

    pub async fn l1_sender(&self, args: &SignerArgs, ctx: &BridgeContext) -> Result<WalletSender> {
        let chain_id = ctx.l1.chain_id().await?;
        self.sender(args, chain_id, self.config.settlement_rpc()?)
    }

    pub fn l2_sender(&self, args: &SignerArgs, ctx: &BridgeContext) -> Result<WalletSender> {
        self.sender(args, ctx.chain.chain_id, self.config.chain_rpc(&ctx.chain)?)
    }

    fn sender(&self, args: &SignerArgs, chain_id: u64, rpc: &str) -> Result<WalletSender> {
        let signer = self
            .signer(args)?
            .ok_or_else(|| {
                anyhow!(
                    "sending requires --private-key or {}",
                    self.config.signer_env()
                )
            })?;
        Ok(WalletSender::new(signer, chain_id, rpc)?)
    }

    /// JSON when `--json` is set, otherwise the human rendering.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

pub fn print_steps(steps: &[zks_bridge::plan::PlanStep]) {
    for (index, step) in steps.iter().enumerate() {
        let gas = step
            .tx
            .gas
            .map(|gas| gas.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "  {index}. [{}] {} (to {:#x}, gas {gas})",
            step.key, step.description, step.tx.to
        );
    }
}
