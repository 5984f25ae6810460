//! Deposit phases and canonical L2 hash extraction.

use crate::abi::{decode_new_priority_request, new_priority_request_topic};
use crate::client::TxReceipt;
use alloy_primitives::{Address, B256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositPhase {
    L1Pending,
    L1Included,
    L1Failed,
    L2Pending,
    L2Executed,
    L2Failed,
    Unknown,
}

impl DepositPhase {
    /// Position in `L1_PENDING -> L1_INCLUDED -> L2_PENDING -> L2_EXECUTED|L2_FAILED`.
    /// `Unknown` has no position.
    pub fn rank(&self) -> Option<u8> {
        match self {
            DepositPhase::L1Pending => Some(0),
            DepositPhase::L1Included | DepositPhase::L1Failed => Some(1),
            DepositPhase::L2Pending => Some(2),
            DepositPhase::L2Executed | DepositPhase::L2Failed => Some(3),
            DepositPhase::Unknown => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositPhase::L1Failed | DepositPhase::L2Executed | DepositPhase::L2Failed
        )
    }

    /// Never report an earlier phase than the one already observed.
    pub fn clamp(self, last: Option<DepositPhase>) -> DepositPhase {
        let Some(last) = last else {
            return self;
        };
        match (self.rank(), last.rank()) {
            (Some(now), Some(before)) if now >= before => self,
            (_, Some(_)) => last,
            (_, None) => self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalHash {
    pub hash: B256,
    pub via_fallback: bool,
}

/// Find the L2 transaction hash of a priority request in a settlement-layer
/// receipt. The structured `NewPriorityRequest` decode always wins; the
/// positional heuristics only run when `allow_fallback` is set.
pub fn extract_l2_tx_hash(
    receipt: &TxReceipt,
    bridgehub: Address,
    allow_fallback: bool,
) -> Option<CanonicalHash> {
    let topic = new_priority_request_topic();
    let requests: Vec<_> = receipt
        .logs
        .iter()
        .filter(|log| log.topic0() == Some(topic))
        .collect();

    for log in &requests {
        match decode_new_priority_request(&log.data) {
            Ok(event) => {
                return Some(CanonicalHash {
                    hash: event.txHash,
                    via_fallback: false,
                })
            }
            Err(err) => tracing::debug!(error = %err, "priority request did not decode"),
        }
    }
    if !allow_fallback {
        return None;
    }

    let from_data = requests
        .iter()
        .find(|log| log.data.len() >= 64)
        .map(|log| B256::from_slice(&log.data[32..64]));
    let from_topic = || {
        receipt
            .logs
            .iter()
            .find(|log| log.address == bridgehub && log.topics.len() >= 3)
            .map(|log| log.topics[2])
    };
    let hash = from_data.or_else(from_topic)?;
    tracing::warn!(
        tx_hash = %receipt.transaction_hash,
        l2_tx_hash = %hash,
        "canonical L2 hash derived positionally; verify this deployment emits NewPriorityRequest"
    );
    Some(CanonicalHash {
        hash,
        via_fallback: true,
    })
}
