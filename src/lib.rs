//! Planning, submission and tracking of zkSync bridge flows: settlement
//! layer deposits, rollup withdrawals and rollup -> rollup interop bundles.
//!
//! Each flow is a resource (`Deposits`, `Withdrawals`, `Interop`) over a
//! `BridgeContext`. Routes build ordered `Plan`s of transaction requests;
//! trackers turn receipts and logs into monotonic phases.

pub mod abi;
pub mod bundle_index;
pub mod client;
pub mod config;
pub mod context;
pub mod deposit;
pub mod encode;
pub mod errors;
pub mod gas;
pub mod interop;
pub mod messages;
pub mod plan;
pub mod registry;
pub mod revert;
pub mod rpc;
pub mod signer;
pub mod types;
pub mod wait;
pub mod withdrawal;

#[cfg(test)]
mod testing;

pub use errors::{ErrorKind, Result, SdkError};
