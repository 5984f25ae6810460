//! TOML configuration: RPC endpoints, chain overrides, gas policy overrides,
//! wait defaults, interop options and signer settings.

use crate::bundle_index::DEFAULT_BUNDLE_INDEX_CAPACITY;
use crate::errors::{Result, SdkError};
use crate::gas::GasPolicyOverride;
use crate::interop::{BundleValuePolicy, DEFAULT_LOG_LOOKBACK_BLOCKS};
use crate::registry::{builtin_chains, ChainInfo, ChainRegistry};
use crate::signer::DEFAULT_SIGNER_ENV;
use crate::wait::{WaitConfig, WaitOptions};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    pub settlement: Option<SettlementConfig>,
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
    /// Store-wide gas policy overrides keyed by policy name.
    #[serde(default)]
    pub gas: BTreeMap<String, GasPolicyOverride>,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub interop: InteropConfig,
    pub signer: Option<SignerConfig>,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct SettlementConfig {
    pub rpc: String,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub rpc: String,
    pub chain_id: Option<u64>,
    pub bridgehub: Option<Address>,
    pub l1_asset_router: Option<Address>,
    pub l1_nullifier: Option<Address>,
    pub base_token: Option<Address>,
    #[serde(default)]
    pub allow_fallback_hash_extraction: bool,
    pub gas_per_pubdata: Option<u64>,
    pub interop_center: Option<Address>,
    pub interop_handler: Option<Address>,
    pub interop_root_storage: Option<Address>,
    pub native_token_vault: Option<Address>,
    pub asset_router: Option<Address>,
    /// Chain-level gas policy overrides.
    #[serde(default)]
    pub gas: BTreeMap<String, GasPolicyOverride>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct InteropConfig {
    pub bundle_index_capacity: usize,
    pub value_policy: BundleValuePolicy,
    /// Destination blocks behind the head scanned for handler events.
    pub log_lookback_blocks: u64,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            bundle_index_capacity: DEFAULT_BUNDLE_INDEX_CAPACITY,
            value_policy: BundleValuePolicy::default(),
            log_lookback_blocks: DEFAULT_LOG_LOOKBACK_BLOCKS,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct SignerConfig {
    pub private_key_env: Option<String>,
}

impl Config {
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self {
                path,
                ..Self::default()
            });
        }

        let contents = fs::read_to_string(&path)
            .map_err(|err| {
                SdkError::config(format!("failed to read config {}: {err}", path.display()))
            })?;
        let mut config = Self::parse(&contents)
            .map_err(|err| err.with_resource(path.display().to_string()))?;
        config.path = path;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|err| SdkError::config(format!("failed to parse config: {err}")))
    }

    pub fn signer_env(&self) -> String {
        self.signer
            .as_ref()
            .and_then(|cfg| cfg.private_key_env.clone())
            .unwrap_or_else(|| DEFAULT_SIGNER_ENV.to_string())
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::from(&self.wait)
    }

    pub fn settlement_rpc(&self) -> Result<&str> {
        self.settlement
            .as_ref()
            .map(|settlement| settlement.rpc.as_str())
            .ok_or_else(|| SdkError::config("no [settlement] rpc configured"))
    }

    /// RPC endpoint of a configured chain, by config key or chain id.
    pub fn chain_rpc(&self, chain: &ChainInfo) -> Result<&str> {
        self.chains
            .iter()
            .find(|(key, cfg)| chain.has_key(key) || cfg.chain_id == Some(chain.chain_id))
            .map(|(_, cfg)| cfg.rpc.as_str())
            .ok_or_else(|| SdkError::config(format!("no rpc configured for chain {}", chain.key)))
    }

    /// Built-ins plus the configured chains.
    pub fn registry(&self) -> Result<ChainRegistry> {
        let builtins = builtin_chains();
        let overrides = self
            .chains
            .iter()
            .map(|(key, cfg)| cfg.to_chain_info(key, &builtins))
            .collect::<Result<Vec<_>>>()?;
        Ok(ChainRegistry::with_overrides(overrides))
    }
}

impl ChainConfig {
    /// Start from the built-in entry sharing the key or chain id, then apply
    /// every field set here.
    fn to_chain_info(&self, key: &str, builtins: &[ChainInfo]) -> Result<ChainInfo> {
        let base = builtins
            .iter()
            .find(|chain| chain.has_key(key) || Some(chain.chain_id) == self.chain_id)
            .cloned();
        let mut info = match (base, self.chain_id, self.bridgehub) {
            (Some(mut base), _, _) => {
                base.key = key.to_string();
                base
            }
            (None, Some(chain_id), Some(bridgehub)) => ChainInfo::new(key, chain_id, bridgehub),
            (None, None, _) => {
                return Err(SdkError::config(format!("chain {key}: chainId is required")));
            }
            (None, Some(_), None) => {
                return Err(SdkError::config(format!("chain {key}: bridgehub is required")));
            }
        };
        if let Some(chain_id) = self.chain_id {
            info.chain_id = chain_id;
        }
        if let Some(bridgehub) = self.bridgehub {
            info.l1.bridgehub = bridgehub;
        }
        info.l1.asset_router = self.l1_asset_router.or(info.l1.asset_router);
        info.l1.nullifier = self.l1_nullifier.or(info.l1.nullifier);
        info.base_token = self.base_token.or(info.base_token);
        info.gas_per_pubdata = self.gas_per_pubdata.or(info.gas_per_pubdata);
        info.allow_fallback_hash_extraction |= self.allow_fallback_hash_extraction;
        if let Some(address) = self.interop_center {
            info.l2.interop_center = address;
        }
        if let Some(address) = self.interop_handler {
            info.l2.interop_handler = address;
        }
        if let Some(address) = self.interop_root_storage {
            info.l2.interop_root_storage = address;
        }
        if let Some(address) = self.native_token_vault {
            info.l2.native_token_vault = address;
        }
        if let Some(address) = self.asset_router {
            info.l2.asset_router = address;
        }
        info.gas_overrides.extend(self.gas.clone());
        Ok(info)
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        return dir.join("zks-bridge").join("config.toml");
    }
    PathBuf::from("./config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use alloy_primitives::U256;

    const SAMPLE: &str = r#"
[settlement]
rpc = "http://localhost:8545"

[chains.era]
rpc = "http://localhost:3050"
allowFallbackHashExtraction = true

[chains.era.gas."withdraw.l2"]
bufferBps = 2000

[chains.local]
rpc = "http://localhost:3150"
chainId = 271
bridgehub = "0x00000000000000000000000000000000000000b1"
interopCenter = "0x00000000000000000000000000000000000000c1"

[gas.approve]
fallback = "0x30d40"

[wait]
pollMs = 500

[interop]
bundleIndexCapacity = 16
valuePolicy = "same-native-asset-only"
"#;

    #[test]
    fn parses_every_section() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.settlement_rpc().unwrap(), "http://localhost:8545");
        assert_eq!(config.gas["approve"].fallback, Some(U256::from(200_000u64)));
        let wait = config.wait_options();
        assert_eq!(wait.poll_ms, 500);
        assert_eq!(wait.timeout_ms, crate::wait::DEFAULT_TIMEOUT_MS);
        assert_eq!(config.interop.bundle_index_capacity, 16);
        assert_eq!(config.interop.value_policy, BundleValuePolicy::SameNativeAssetOnly);
        assert_eq!(config.interop.log_lookback_blocks, DEFAULT_LOG_LOOKBACK_BLOCKS);
        assert_eq!(config.signer_env(), "PRIVATE_KEY");
    }

    #[test]
    fn configured_chains_become_registry_overrides() {
        let config = Config::parse(SAMPLE).unwrap();
        let registry = config.registry().unwrap();

        let era = registry.get("era").unwrap();
        assert_eq!(era.chain_id, 324);
        assert!(era.allow_fallback_hash_extraction);
        assert_eq!(era.gas_overrides["withdraw.l2"].buffer_bps, Some(2000));

        let local = registry.get(271).unwrap();
        assert_eq!(local.l1.bridgehub, Address::with_last_byte(0xb1));
        assert_eq!(local.l2.interop_center, Address::with_last_byte(0xc1));
        assert_eq!(config.chain_rpc(local).unwrap(), "http://localhost:3150");
    }

    #[test]
    fn unknown_chain_needs_id_and_bridgehub() {
        let config = Config::parse("[chains.mystery]\nrpc = \"http://x\"\n").unwrap();
        assert!(config.registry().unwrap_err().is(ErrorKind::Config));
        let config = Config::parse("[chains.mystery]\nrpc = \"http://x\"\nchainId = 9\n").unwrap();
        assert!(config.registry().unwrap_err().is(ErrorKind::Config));
    }

    #[test]
    fn missing_file_is_default() {
        let config = Config::load(Some(Path::new("/nonexistent/zks-bridge.toml"))).unwrap();
        assert!(config.chains.is_empty());
        assert!(config.settlement_rpc().is_err());
    }
}
