//! Chain registry: semantic keys and chain ids mapped to contract addresses.

use crate::errors::{Result, SdkError};
use crate::gas::GasPolicyOverride;
use crate::types::{
    L1_MESSENGER_ADDRESS, L2_ASSET_ROUTER_ADDRESS, L2_BASE_TOKEN_ADDRESS,
    L2_INTEROP_CENTER_ADDRESS, L2_INTEROP_HANDLER_ADDRESS, L2_INTEROP_ROOT_STORAGE_ADDRESS,
    L2_NATIVE_TOKEN_VAULT_ADDRESS, REQUIRED_L1_TO_L2_GAS_PER_PUBDATA,
};
use alloy_primitives::{address, Address};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A chain reference as callers write it: numeric id or semantic key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainRef {
    Id(u64),
    Key(String),
}

impl From<u64> for ChainRef {
    fn from(value: u64) -> Self {
        ChainRef::Id(value)
    }
}

impl From<&str> for ChainRef {
    fn from(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| ChainRef::Key(value.to_string()))
    }
}

impl FromStr for ChainRef {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().parse::<u64>() {
            Ok(id) => Ok(ChainRef::Id(id)),
            Err(_) => Ok(ChainRef::Key(value.trim().to_string())),
        }
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainRef::Id(id) => write!(f, "{id}"),
            ChainRef::Key(key) => f.write_str(key),
        }
    }
}

/// Settlement-layer contracts serving one rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementAddresses {
    pub bridgehub: Address,
    /// Read from `bridgehub.assetRouter()` when unset.
    pub asset_router: Option<Address>,
    /// Read from `assetRouter.L1_NULLIFIER()` when unset.
    pub nullifier: Option<Address>,
}

/// System contracts on the rollup itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupAddresses {
    pub base_token_system: Address,
    pub l1_messenger: Address,
    pub asset_router: Address,
    pub native_token_vault: Address,
    pub interop_center: Address,
    pub interop_handler: Address,
    pub interop_root_storage: Address,
}

impl Default for RollupAddresses {
    fn default() -> Self {
        Self {
            base_token_system: L2_BASE_TOKEN_ADDRESS,
            l1_messenger: L1_MESSENGER_ADDRESS,
            asset_router: L2_ASSET_ROUTER_ADDRESS,
            native_token_vault: L2_NATIVE_TOKEN_VAULT_ADDRESS,
            interop_center: L2_INTEROP_CENTER_ADDRESS,
            interop_handler: L2_INTEROP_HANDLER_ADDRESS,
            interop_root_storage: L2_INTEROP_ROOT_STORAGE_ADDRESS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub key: String,
    pub chain_id: u64,
    pub l1: SettlementAddresses,
    pub l2: RollupAddresses,
    /// Pinned base token; otherwise read from `bridgehub.baseToken(chainId)`.
    pub base_token: Option<Address>,
    pub gas_per_pubdata: Option<u64>,
    /// Chain-level gas policy defaults layered under per-call overrides.
    pub gas_overrides: BTreeMap<String, GasPolicyOverride>,
    /// Allow positional canonical-hash extraction from priority request logs.
    pub allow_fallback_hash_extraction: bool,
}

impl ChainInfo {
    pub fn new(key: impl Into<String>, chain_id: u64, bridgehub: Address) -> Self {
        Self {
            key: key.into(),
            chain_id,
            l1: SettlementAddresses {
                bridgehub,
                asset_router: None,
                nullifier: None,
            },
            l2: RollupAddresses::default(),
            base_token: None,
            gas_per_pubdata: None,
            gas_overrides: BTreeMap::new(),
            allow_fallback_hash_extraction: false,
        }
    }

    pub fn gas_per_pubdata(&self) -> u64 {
        self.gas_per_pubdata
            .unwrap_or(REQUIRED_L1_TO_L2_GAS_PER_PUBDATA)
    }

    /// Keys compare ASCII case-insensitively everywhere.
    pub fn has_key(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }

    fn matches(&self, other: &ChainInfo) -> bool {
        self.has_key(&other.key) || self.chain_id == other.chain_id
    }

    fn matches_ref(&self, reference: &ChainRef) -> bool {
        match reference {
            ChainRef::Id(id) => self.chain_id == *id,
            ChainRef::Key(key) => self.has_key(key),
        }
    }
}

pub fn builtin_chains() -> Vec<ChainInfo> {
    vec![
        ChainInfo::new(
            "era",
            324,
            address!("303a465B659cBB0ab36eE643eA362c509EEb5213"),
        ),
        ChainInfo::new(
            "era-sepolia",
            300,
            address!("35A54c8C757806eB6820629bc82d90E056394C92"),
        ),
    ]
}

/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: Vec<ChainInfo>,
}

impl ChainRegistry {
    pub fn builtin() -> Self {
        Self {
            chains: builtin_chains(),
        }
    }

    /// Built-ins merged with `overrides`. An override replaces every entry it
    /// matches by key or chain id, otherwise it is appended.
    pub fn with_overrides(overrides: impl IntoIterator<Item = ChainInfo>) -> Self {
        let mut registry = Self::builtin();
        for entry in overrides {
            registry.merge(entry);
        }
        registry
    }

    fn merge(&mut self, entry: ChainInfo) {
        match self.chains.iter().position(|existing| existing.matches(&entry)) {
            Some(idx) => {
                tracing::debug!(
                    key = %entry.key,
                    chain_id = entry.chain_id,
                    "chain override replaces entry"
                );
                self.chains[idx] = entry;
                // an override may collide with a second entry through the other field
                let merged = self.chains[idx].clone();
                let mut seen = false;
                self.chains.retain(|chain| {
                    if chain.matches(&merged) {
                        let keep = !seen;
                        seen = true;
                        keep
                    } else {
                        true
                    }
                });
            }
            None => self.chains.push(entry),
        }
    }

    pub fn resolve(&self, reference: &ChainRef) -> Result<&ChainInfo> {
        self.chains
            .iter()
            .find(|chain| chain.matches_ref(reference))
            .ok_or_else(|| {
                SdkError::config(format!("unknown chain: {reference}"))
                    .with_operation("registry.resolve")
            })
    }

    pub fn get(&self, reference: impl Into<ChainRef>) -> Result<&ChainInfo> {
        self.resolve(&reference.into())
    }

    pub fn list(&self) -> &[ChainInfo] {
        &self.chains
    }
}
