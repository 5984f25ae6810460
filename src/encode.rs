//! ERC-7930 interoperable addresses, interop call attributes and asset router
//! payloads.

use crate::abi::calldata;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;

alloy_sol_types::sol! {
    function interopCallValue(uint256 _interopCallValue);
    function indirectCall(uint256 _indirectCallMessageValue);
    function executionAddress(bytes _executionAddress);
    function unbundlerAddress(bytes _unbundlerAddress);
}

/// Version 1, chain type 0x0000 (EVM).
const EVM_V1_HEADER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];
const NEW_ENCODING_VERSION: u8 = 0x01;

/// `header | chainRefLen | chainRef | addrLen | addr`. A missing chain is
/// written as a zero-length reference.
fn interoperable_address(chain_id: Option<U256>, address: Option<Address>) -> Bytes {
    let chain_ref = chain_id.map(chain_reference).unwrap_or_default();
    let address = address.as_ref().map(|address| address.as_slice()).unwrap_or_default();
    let mut out = Vec::with_capacity(EVM_V1_HEADER.len() + 2 + chain_ref.len() + address.len());
    out.extend_from_slice(&EVM_V1_HEADER);
    out.push(chain_ref.len() as u8);
    out.extend_from_slice(&chain_ref);
    out.push(address.len() as u8);
    out.extend_from_slice(address);
    Bytes::from(out)
}

/// Minimal big-endian chain id; zero still takes one byte.
fn chain_reference(chain_id: U256) -> Vec<u8> {
    let bytes = chain_id.to_be_bytes::<32>();
    let first = bytes.iter().position(|byte| *byte != 0).unwrap_or(31);
    bytes[first..].to_vec()
}

pub fn encode_evm_v1_with_address(chain_id: U256, address: Address) -> Bytes {
    interoperable_address(Some(chain_id), Some(address))
}

pub fn encode_evm_v1_chain_only(chain_id: U256) -> Bytes {
    interoperable_address(Some(chain_id), None)
}

pub fn encode_evm_v1_address_only(address: Address) -> Bytes {
    interoperable_address(None, Some(address))
}

pub fn encode_interop_call_value(value: U256) -> Bytes {
    calldata(interopCallValueCall { _interopCallValue: value })
}

pub fn encode_indirect_call(value: U256) -> Bytes {
    calldata(indirectCallCall { _indirectCallMessageValue: value })
}

pub fn encode_execution_address(value: Bytes) -> Bytes {
    calldata(executionAddressCall { _executionAddress: value })
}

pub fn encode_unbundler_address(value: Bytes) -> Bytes {
    calldata(unbundlerAddressCall { _unbundlerAddress: value })
}

/// `keccak256(abi.encode(chainId, nativeTokenVault, token))`
pub fn encode_asset_id(chain_id: U256, token: Address, native_token_vault: Address) -> B256 {
    keccak256((chain_id, native_token_vault, token).abi_encode())
}

/// Second-bridge payload understood by the L1 asset router for deposits:
/// `abi.encode(token, amount, receiver)`.
pub fn encode_deposit_bridge_calldata(token: Address, amount: U256, receiver: Address) -> Bytes {
    Bytes::from((token, amount, receiver).abi_encode())
}

/// Asset router payload for interop token transfers: version byte followed by
/// `abi.encode(assetId, abi.encode(amount, receiver, tokenAddress))`.
pub fn encode_asset_transfer_calldata(
    asset_id: B256,
    amount: U256,
    receiver: Address,
    maybe_token_address: Address,
) -> Bytes {
    let transfer_data = (amount, receiver, maybe_token_address).abi_encode();
    let bridge_data = (asset_id, Bytes::from(transfer_data)).abi_encode_params();
    let mut out = Vec::with_capacity(1 + bridge_data.len());
    out.push(NEW_ENCODING_VERSION);
    out.extend_from_slice(&bridge_data);
    Bytes::from(out)
}

/// Burn payload for `L2AssetRouter.withdraw`: `abi.encode(amount, receiver, token)`.
pub fn encode_bridge_burn_data(amount: U256, receiver: Address, token: Address) -> Bytes {
    Bytes::from((amount, receiver, token).abi_encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::format_hex;
    use alloy_sol_types::SolCall;

    #[test]
    fn interoperable_address_layouts() {
        let address = Address::repeat_byte(0x42);
        let full = encode_evm_v1_with_address(U256::from(260u64), address);
        assert_eq!(&full[..7], &[0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x04]);
        assert_eq!(full[7], 20);
        assert_eq!(&full[8..], address.as_slice());

        assert_eq!(format_hex(&encode_evm_v1_chain_only(U256::from(324u64))), "0x0001000002014400");

        let bare = encode_evm_v1_address_only(address);
        assert_eq!(&bare[..6], &[0x00, 0x01, 0x00, 0x00, 0x00, 20]);
        assert_eq!(bare.len(), 26);
    }

    #[test]
    fn attribute_calldata_starts_with_selector() {
        let data = encode_interop_call_value(U256::from(7u64));
        assert_eq!(&data[..4], interopCallValueCall::SELECTOR.as_slice());
        assert_eq!(U256::from_be_slice(&data[4..36]), U256::from(7u64));
    }

    #[test]
    fn transfer_calldata_is_versioned() {
        let data = encode_asset_transfer_calldata(
            B256::repeat_byte(1),
            U256::from(5u64),
            Address::repeat_byte(2),
            Address::ZERO,
        );
        assert_eq!(data[0], NEW_ENCODING_VERSION);
        assert_eq!(&data[1..33], B256::repeat_byte(1).as_slice());
    }
}
