//! Private-key loading and the wallet-backed `TxSender`.

use crate::client::{TxRequest, TxSender};
use crate::errors::{Result, SdkError};
use crate::revert::revert_from_payload;
use alloy_primitives::{Address, TxKind, B256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

pub const DEFAULT_SIGNER_ENV: &str = "PRIVATE_KEY";

pub struct SignerOptions<'a> {
    pub private_key: Option<&'a str>,
    pub private_key_env: Option<&'a str>,
}

/// `--private-key` wins; otherwise the named environment variable is read.
/// `Ok(None)` when neither yields a key.
pub fn load_signer(
    options: SignerOptions<'_>,
    default_env: &str,
) -> Result<Option<PrivateKeySigner>> {
    if options.private_key.is_some() && options.private_key_env.is_some() {
        return Err(SdkError::config("cannot set both --private-key and --private-key-env"));
    }
    if let Some(key) = options.private_key {
        return load_wallet(key).map(Some);
    }
    let env = options.private_key_env.unwrap_or(default_env);
    match std::env::var(env) {
        Ok(key) => load_wallet(&key).map(Some),
        Err(_) => Ok(None),
    }
}

fn load_wallet(key: &str) -> Result<PrivateKeySigner> {
    key.trim()
        .parse()
        .map_err(|err| SdkError::config(format!("invalid private key: {err}")))
}

/// Signs with a local key and submits through an alloy wallet provider.
pub struct WalletSender {
    address: Address,
    provider: DynProvider,
}

impl WalletSender {
    pub fn new(signer: PrivateKeySigner, chain_id: u64, rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|err| SdkError::config(format!("invalid rpc url {rpc_url}: {err}")))?;
        let signer = signer.with_chain_id(Some(chain_id));
        let address = signer.address();
        let provider = ProviderBuilder::new().wallet(signer).connect_http(url).erased();
        Ok(Self { address, provider })
    }
}

fn to_alloy(tx: TxRequest, from: Address) -> Result<TransactionRequest> {
    let gas = tx
        .gas
        .map(|gas| {
            u64::try_from(gas)
                .map_err(|_| SdkError::validation(format!("gas limit {gas} out of range")))
        })
        .transpose()?;
    Ok(TransactionRequest {
        from: Some(tx.from.unwrap_or(from)),
        to: Some(TxKind::Call(tx.to)),
        input: TransactionInput::new(tx.data),
        value: Some(tx.value),
        gas,
        nonce: tx.nonce,
        max_fee_per_gas: tx.max_fee_per_gas,
        max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
        ..Default::default()
    })
}

#[async_trait]
impl TxSender for WalletSender {
    fn address(&self) -> Address {
        self.address
    }

    async fn send(&self, tx: TxRequest) -> Result<B256> {
        let to = tx.to;
        let request = to_alloy(tx, self.address)?;
        let pending = self.provider.send_transaction(request).await.map_err(|err| {
            let payload = err.as_error_resp().and_then(|resp| serde_json::to_value(resp).ok());
            match payload.as_ref().and_then(revert_from_payload) {
                Some(revert) => revert,
                None => SdkError::send_failed(err.to_string()),
            }
            .with_operation("send")
            .with_resource(format!("{to:#x}"))
        })?;
        Ok(*pending.tx_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[test]
    fn explicit_key_and_conflicting_flags() {
        let signer = load_signer(
            SignerOptions {
                private_key: Some(KEY),
                private_key_env: None,
            },
            DEFAULT_SIGNER_ENV,
        )
        .unwrap();
        assert!(signer.is_some());

        let err = load_signer(
            SignerOptions {
                private_key: Some(KEY),
                private_key_env: Some("X"),
            },
            DEFAULT_SIGNER_ENV,
        )
        .unwrap_err();
        assert!(err.is(crate::errors::ErrorKind::Config));
    }

    #[test]
    fn unset_env_is_not_an_error() {
        let signer = load_signer(
            SignerOptions {
                private_key: None,
                private_key_env: Some("ZKS_BRIDGE_TEST_UNSET_KEY"),
            },
            DEFAULT_SIGNER_ENV,
        )
        .unwrap();
        assert!(signer.is_none());
    }

    #[test]
    fn request_keeps_gas_and_value() {
        let tx = TxRequest {
            gas: Some(U256::from(21_000u64)),
            ..TxRequest::new(Address::repeat_byte(1), Bytes::from_static(&[1, 2]))
        }
        .value(U256::from(5u64));
        let request = to_alloy(tx, Address::repeat_byte(2)).unwrap();
        assert_eq!(request.gas, Some(21_000));
        assert_eq!(request.value, Some(U256::from(5u64)));
        assert_eq!(request.from, Some(Address::repeat_byte(2)));
        assert_eq!(request.to, Some(TxKind::Call(Address::repeat_byte(1))));
    }
}
