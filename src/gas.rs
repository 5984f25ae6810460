//! Named gas policies and the per-plan gas planner.
//!
//! A `GasPlanner` belongs to exactly one plan-building call. It records every
//! quote it hands out so the caller can audit the numbers in `snapshot()`.

use crate::client::{GasEstimator, TxRequest};
use crate::errors::{Result, SdkError};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Settlement,
    Rollup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPolicy {
    pub layer: Layer,
    pub buffer_bps: u64,
    pub min: Option<U256>,
    pub fallback: Option<U256>,
    /// Separate buffer used only by `apply_base_cost`.
    pub base_cost_buffer_bps: Option<u64>,
}

impl GasPolicy {
    pub const fn new(layer: Layer, buffer_bps: u64) -> Self {
        Self {
            layer,
            buffer_bps,
            min: None,
            fallback: None,
            base_cost_buffer_bps: None,
        }
    }

    pub fn with_fallback(mut self, fallback: u64) -> Self {
        self.fallback = Some(U256::from(fallback));
        self
    }

    fn merged(&self, overrides: Option<&GasPolicyOverride>) -> GasPolicy {
        let mut policy = self.clone();
        if let Some(overrides) = overrides {
            if let Some(layer) = overrides.layer {
                policy.layer = layer;
            }
            if let Some(bps) = overrides.buffer_bps {
                policy.buffer_bps = bps;
            }
            if overrides.min.is_some() {
                policy.min = overrides.min;
            }
            if overrides.fallback.is_some() {
                policy.fallback = overrides.fallback;
            }
            if overrides.base_cost_buffer_bps.is_some() {
                policy.base_cost_buffer_bps = overrides.base_cost_buffer_bps;
            }
        }
        policy
    }
}

/// Partial policy layered over a named base policy. Never mutates the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPolicyOverride {
    pub layer: Option<Layer>,
    pub buffer_bps: Option<u64>,
    pub min: Option<U256>,
    pub fallback: Option<U256>,
    pub base_cost_buffer_bps: Option<u64>,
}

impl GasPolicyOverride {
    /// `other` wins field by field.
    pub fn layered(&self, other: &GasPolicyOverride) -> GasPolicyOverride {
        GasPolicyOverride {
            layer: other.layer.or(self.layer),
            buffer_bps: other.buffer_bps.or(self.buffer_bps),
            min: other.min.or(self.min),
            fallback: other.fallback.or(self.fallback),
            base_cost_buffer_bps: other.base_cost_buffer_bps.or(self.base_cost_buffer_bps),
        }
    }
}

pub mod keys {
    pub const APPROVE: &str = "approve";
    pub const DEPOSIT_L1: &str = "deposit.l1";
    pub const DEPOSIT_L2_GAS_LIMIT: &str = "deposit.l2-gas-limit";
    pub const DEPOSIT_BASE_COST: &str = "deposit.base-cost";
    pub const WITHDRAW_APPROVE: &str = "withdraw.approve";
    pub const WITHDRAW_L2: &str = "withdraw.l2";
    pub const WITHDRAW_FINALIZE: &str = "withdraw.finalize";
    pub const INTEROP_APPROVE: &str = "interop.approve";
    pub const INTEROP_SEND: &str = "interop.send";
    pub const INTEROP_RELAY: &str = "interop.relay";
}

/// Read-only template store shared between planners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPolicyStore {
    policies: BTreeMap<String, GasPolicy>,
}

impl Default for GasPolicyStore {
    fn default() -> Self {
        Self::defaults()
    }
}

impl GasPolicyStore {
    pub fn defaults() -> Self {
        use Layer::{Rollup, Settlement};
        let policies = [
            (keys::APPROVE, GasPolicy::new(Settlement, 1500).with_fallback(100_000)),
            (keys::DEPOSIT_L1, GasPolicy::new(Settlement, 1500)),
            (
                keys::DEPOSIT_L2_GAS_LIMIT,
                GasPolicy::new(Rollup, 1000).with_fallback(3_000_000),
            ),
            (keys::DEPOSIT_BASE_COST, GasPolicy::new(Settlement, 0)),
            (keys::WITHDRAW_APPROVE, GasPolicy::new(Rollup, 1500).with_fallback(100_000)),
            (keys::WITHDRAW_L2, GasPolicy::new(Rollup, 1500)),
            (keys::WITHDRAW_FINALIZE, GasPolicy::new(Settlement, 1500)),
            (keys::INTEROP_APPROVE, GasPolicy::new(Rollup, 1500).with_fallback(100_000)),
            (keys::INTEROP_SEND, GasPolicy::new(Rollup, 1500)),
            (keys::INTEROP_RELAY, GasPolicy::new(Rollup, 1500)),
        ];
        Self {
            policies: policies
                .into_iter()
                .map(|(key, policy)| (key.to_string(), policy))
                .collect(),
        }
    }

    /// A new store with `overrides` applied; unknown keys are rejected.
    pub fn merged(&self, overrides: &BTreeMap<String, GasPolicyOverride>) -> Result<Self> {
        let mut policies = self.policies.clone();
        for (key, policy_override) in overrides {
            let base = policies.get(key).ok_or_else(|| unknown_policy(key))?;
            let merged = base.merged(Some(policy_override));
            policies.insert(key.clone(), merged);
        }
        Ok(Self { policies })
    }

    pub fn get(&self, key: &str) -> Result<&GasPolicy> {
        self.policies.get(key).ok_or_else(|| unknown_policy(key))
    }
}

fn unknown_policy(key: &str) -> SdkError {
    SdkError::config(format!("unknown gas policy: {key}")).with_resource("gas")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Estimate,
    Fallback,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasQuote {
    pub policy: String,
    pub layer: Layer,
    pub source: QuoteSource,
    pub raw: Option<U256>,
    pub buffer_bps: u64,
    pub recommended: Option<U256>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseCostQuote {
    pub policy: String,
    pub raw: U256,
    pub operator_tip: U256,
    pub extras: U256,
    pub with_tip: U256,
    pub with_extras: U256,
    pub buffered: U256,
    pub recommended: U256,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasSnapshot {
    pub gas_quotes: BTreeMap<String, GasQuote>,
    pub base_costs: BTreeMap<String, BaseCostQuote>,
}

#[derive(Default)]
pub struct EnsureOptions<'a> {
    pub estimator: Option<&'a dyn GasEstimator>,
    pub overrides: Option<&'a GasPolicyOverride>,
}

#[derive(Debug, Clone, Default)]
pub struct BaseCostOptions<'a> {
    pub operator_tip: Option<U256>,
    pub extras: Option<U256>,
    pub overrides: Option<&'a GasPolicyOverride>,
}

pub fn apply_buffer(raw: U256, bps: u64) -> U256 {
    raw * U256::from(BPS_DENOMINATOR + bps) / U256::from(BPS_DENOMINATOR)
}

/// Session state for one plan: `&mut self` keeps it out of concurrent reuse.
#[derive(Debug)]
pub struct GasPlanner {
    store: Arc<GasPolicyStore>,
    gas_quotes: BTreeMap<String, GasQuote>,
    base_costs: BTreeMap<String, BaseCostQuote>,
}

impl GasPlanner {
    pub fn new(store: Arc<GasPolicyStore>) -> Self {
        Self {
            store,
            gas_quotes: BTreeMap::new(),
            base_costs: BTreeMap::new(),
        }
    }

    pub async fn ensure(
        &mut self,
        step_key: &str,
        policy_key: &str,
        tx: &TxRequest,
        options: EnsureOptions<'_>,
    ) -> Result<GasQuote> {
        let policy = self.store.get(policy_key)?.merged(options.overrides);
        let mut diagnostics = Vec::new();
        let mut source = QuoteSource::None;
        let mut raw = None;

        if let Some(estimator) = options.estimator {
            match estimator.estimate(tx).await {
                Ok(estimate) => {
                    raw = Some(estimate);
                    source = QuoteSource::Estimate;
                }
                Err(err) => {
                    tracing::warn!(
                        step = step_key,
                        policy = policy_key,
                        error = %err,
                        "gas estimation failed"
                    );
                    diagnostics.push(format!("estimate failed: {}", err.message));
                }
            }
        }
        if raw.is_none() {
            if let Some(fallback) = policy.fallback {
                diagnostics.push(format!("using fallback {fallback}"));
                raw = Some(fallback);
                source = QuoteSource::Fallback;
            }
        }

        let mut recommended = raw.map(|value| apply_buffer(value, policy.buffer_bps));
        if let Some(min) = policy.min {
            match recommended {
                Some(value) if value < min => {
                    diagnostics.push(format!("raised {value} to minimum {min}"));
                    recommended = Some(min);
                }
                None => {
                    diagnostics.push(format!("no estimate; using minimum {min}"));
                    recommended = Some(min);
                }
                _ => {}
            }
        }

        let quote = GasQuote {
            policy: policy_key.to_string(),
            layer: policy.layer,
            source,
            raw,
            buffer_bps: policy.buffer_bps,
            recommended,
            diagnostics,
        };
        tracing::debug!(step = step_key, ?quote.recommended, ?quote.source, "gas quote");
        self.gas_quotes.insert(step_key.to_string(), quote.clone());
        Ok(quote)
    }

    /// `raw + tip`, then `+ extras`, then the policy's own base-cost buffer,
    /// then the minimum floor.
    pub fn apply_base_cost(
        &mut self,
        ref_key: &str,
        policy_key: &str,
        raw: U256,
        options: BaseCostOptions<'_>,
    ) -> Result<BaseCostQuote> {
        let policy = self.store.get(policy_key)?.merged(options.overrides);
        let operator_tip = options.operator_tip.unwrap_or_default();
        let extras = options.extras.unwrap_or_default();
        let with_tip = raw + operator_tip;
        let with_extras = with_tip + extras;
        let buffered = match policy.base_cost_buffer_bps {
            Some(bps) if bps > 0 => apply_buffer(with_extras, bps),
            _ => with_extras,
        };
        let mut diagnostics = Vec::new();
        let recommended = match policy.min {
            Some(min) if buffered < min => {
                diagnostics.push(format!("raised {buffered} to minimum {min}"));
                min
            }
            _ => buffered,
        };
        let quote = BaseCostQuote {
            policy: policy_key.to_string(),
            raw,
            operator_tip,
            extras,
            with_tip,
            with_extras,
            buffered,
            recommended,
            diagnostics,
        };
        self.base_costs.insert(ref_key.to_string(), quote.clone());
        Ok(quote)
    }

    pub fn snapshot(&self) -> GasSnapshot {
        GasSnapshot {
            gas_quotes: self.gas_quotes.clone(),
            base_costs: self.base_costs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use async_trait::async_trait;

    struct Fixed(Option<u64>);

    #[async_trait]
    impl GasEstimator for Fixed {
        async fn estimate(&self, _tx: &TxRequest) -> Result<U256> {
            self.0
                .map(U256::from)
                .ok_or_else(|| SdkError::rpc("execution reverted"))
        }
    }

    fn planner() -> GasPlanner {
        GasPlanner::new(Arc::new(GasPolicyStore::defaults()))
    }

    #[tokio::test]
    async fn buffer_truncates() {
        let mut planner = planner();
        let estimator = Fixed(Some(120_000));
        let options = EnsureOptions {
            estimator: Some(&estimator),
            overrides: None,
        };
        let quote = planner
            .ensure("primary", keys::DEPOSIT_L1, &TxRequest::default(), options)
            .await
            .unwrap();
        assert_eq!(quote.recommended, Some(U256::from(138_000u64)));
        assert_eq!(quote.source, QuoteSource::Estimate);

        assert_eq!(apply_buffer(U256::from(3u64), 1500), U256::from(3u64));
        assert_eq!(apply_buffer(U256::from(7u64), 1500), U256::from(8u64));
    }

    #[tokio::test]
    async fn failed_estimate_uses_fallback_or_nothing() {
        let mut planner = planner();
        let quote = planner
            .ensure(
                "approve:0",
                keys::APPROVE,
                &TxRequest::default(),
                EnsureOptions {
                    estimator: Some(&Fixed(None)),
                    overrides: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(quote.source, QuoteSource::Fallback);
        assert_eq!(quote.recommended, Some(U256::from(115_000u64)));
        assert_eq!(quote.diagnostics.len(), 2);

        let quote = planner
            .ensure(
                "primary",
                keys::DEPOSIT_L1,
                &TxRequest::default(),
                EnsureOptions {
                    estimator: Some(&Fixed(None)),
                    overrides: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(quote.source, QuoteSource::None);
        assert_eq!(quote.recommended, None);
        assert_eq!(planner.snapshot().gas_quotes.len(), 2);
    }

    #[tokio::test]
    async fn minimum_floor_applies() {
        let mut planner = planner();
        let overrides = GasPolicyOverride {
            min: Some(U256::from(200_000u64)),
            ..Default::default()
        };
        let quote = planner
            .ensure(
                "primary",
                keys::WITHDRAW_L2,
                &TxRequest::default(),
                EnsureOptions {
                    estimator: Some(&Fixed(Some(100_000))),
                    overrides: Some(&overrides),
                },
            )
            .await
            .unwrap();
        assert_eq!(quote.recommended, Some(U256::from(200_000u64)));
        assert!(quote.diagnostics[0].contains("minimum"));
    }

    #[tokio::test]
    async fn unknown_policy_is_config_error() {
        let mut planner = planner();
        let err = planner
            .ensure("x", "nope", &TxRequest::default(), EnsureOptions::default())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Config));
    }

    #[test]
    fn base_cost_composition() {
        let mut planner = planner();
        let quote = planner
            .apply_base_cost(
                "base",
                keys::DEPOSIT_BASE_COST,
                U256::from(2000u64),
                BaseCostOptions {
                    operator_tip: Some(U256::ZERO),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(quote.recommended, U256::from(2000u64));

        let overrides = GasPolicyOverride {
            buffer_bps: Some(5000),
            base_cost_buffer_bps: Some(1000),
            min: Some(U256::from(4000u64)),
            ..Default::default()
        };
        let quote = planner
            .apply_base_cost(
                "base",
                keys::DEPOSIT_BASE_COST,
                U256::from(2000u64),
                BaseCostOptions {
                    operator_tip: Some(U256::from(100u64)),
                    extras: Some(U256::from(900u64)),
                    overrides: Some(&overrides),
                },
            )
            .unwrap();
        assert_eq!(quote.with_tip, U256::from(2100u64));
        assert_eq!(quote.with_extras, U256::from(3000u64));
        // only the base-cost buffer is applied, never the general one
        assert_eq!(quote.buffered, U256::from(3300u64));
        assert_eq!(quote.recommended, U256::from(4000u64));
    }

    #[test]
    fn store_overrides_do_not_mutate_base() {
        let base = GasPolicyStore::defaults();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            keys::APPROVE.to_string(),
            GasPolicyOverride {
                buffer_bps: Some(0),
                ..Default::default()
            },
        );
        let merged = base.merged(&overrides).unwrap();
        assert_eq!(merged.get(keys::APPROVE).unwrap().buffer_bps, 0);
        assert_eq!(base.get(keys::APPROVE).unwrap().buffer_bps, 1500);

        overrides.insert("bogus".to_string(), GasPolicyOverride::default());
        assert!(base.merged(&overrides).is_err());
    }
}
