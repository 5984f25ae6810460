//! Interop phases, handler status codes and bundle extraction from source
//! receipts.

use crate::abi::{
    bundle_executed_topic, bundle_unbundled_topic, bundle_verified_topic,
    decode_interop_bundle_sent,
    interop_bundle_sent_topic, InteropBundle,
};
use crate::client::{LogEntry, TxReceipt};
use alloy_primitives::{Address, B256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteropPhase {
    Pending,
    Failed,
    Sent,
    Verified,
    Executed,
    Unbundled,
}

impl InteropPhase {
    pub fn rank(&self) -> u8 {
        match self {
            InteropPhase::Pending => 0,
            InteropPhase::Failed | InteropPhase::Sent => 1,
            InteropPhase::Verified => 2,
            InteropPhase::Executed | InteropPhase::Unbundled => 3,
        }
    }

    pub fn clamp(self, last: Option<InteropPhase>) -> InteropPhase {
        match last {
            Some(last) if last.rank() > self.rank() => last,
            _ => self,
        }
    }

    /// Classify destination handler logs already filtered by bundle hash.
    pub fn from_handler_logs(logs: &[LogEntry]) -> InteropPhase {
        let has = |topic: B256| logs.iter().any(|log| log.topic0() == Some(topic));
        if has(bundle_executed_topic()) {
            InteropPhase::Executed
        } else if has(bundle_unbundled_topic()) {
            InteropPhase::Unbundled
        } else if has(bundle_verified_topic()) {
            InteropPhase::Verified
        } else {
            InteropPhase::Sent
        }
    }
}

/// `bundleStatus` as stored by the destination interop handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BundleStatus {
    Unreceived,
    Verified,
    FullyExecuted,
    Unbundled,
    Unknown(u8),
}

impl From<u8> for BundleStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => BundleStatus::Unreceived,
            1 => BundleStatus::Verified,
            2 => BundleStatus::FullyExecuted,
            3 => BundleStatus::Unbundled,
            other => BundleStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallStatus {
    Unprocessed,
    Executed,
    Cancelled,
    Unknown(u8),
}

impl From<u8> for CallStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => CallStatus::Unprocessed,
            1 => CallStatus::Executed,
            2 => CallStatus::Cancelled,
            other => CallStatus::Unknown(other),
        }
    }
}

/// What the source receipt says about a sent bundle.
#[derive(Clone)]
pub struct SentBundle {
    /// Hash of the L2 -> L1 message carrying the bundle; the send id.
    pub send_id: B256,
    pub bundle_hash: B256,
    pub bundle: InteropBundle,
}

pub fn bundle_from_receipt(receipt: &TxReceipt, interop_center: Address) -> Option<SentBundle> {
    let topic = interop_bundle_sent_topic();
    receipt
        .logs
        .iter()
        .filter(|log| log.address == interop_center && log.topic0() == Some(topic))
        .find_map(|log| match decode_interop_bundle_sent(&log.data) {
            Ok((send_id, bundle_hash, bundle)) => Some(SentBundle {
                send_id,
                bundle_hash,
                bundle,
            }),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    tx_hash = %receipt.transaction_hash,
                    "undecodable InteropBundleSent"
                );
                None
            }
        })
}
