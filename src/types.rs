use crate::errors::{Result, SdkError};
use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use std::str::FromStr;

/// Placeholder address L1 contracts use for ETH.
pub const ETH_ADDRESS_IN_CONTRACTS: Address = address!("0000000000000000000000000000000000000001");
/// L2 base token system contract (also accepted as an ETH alias).
pub const L2_BASE_TOKEN_ADDRESS: Address = address!("000000000000000000000000000000000000800a");
pub const L1_MESSENGER_ADDRESS: Address = address!("0000000000000000000000000000000000008008");
pub const L2_ASSET_ROUTER_ADDRESS: Address = address!("0000000000000000000000000000000000010003");
pub const L2_NATIVE_TOKEN_VAULT_ADDRESS: Address =
    address!("0000000000000000000000000000000000010004");
pub const L2_INTEROP_ROOT_STORAGE_ADDRESS: Address =
    address!("0000000000000000000000000000000000010008");
pub const L2_INTEROP_HANDLER_ADDRESS: Address =
    address!("000000000000000000000000000000000001000d");
pub const L2_INTEROP_CENTER_ADDRESS: Address =
    address!("0000000000000000000000000000000000010010");

pub const ETH_ALIASES: [Address; 3] = [
    Address::ZERO,
    L2_BASE_TOKEN_ADDRESS,
    ETH_ADDRESS_IN_CONTRACTS,
];

/// Gas per pubdata byte limit required for L1 -> L2 transactions.
pub const REQUIRED_L1_TO_L2_GAS_PER_PUBDATA: u64 = 800;

pub const BUNDLE_IDENTIFIER: u8 = 0x01;

pub fn is_eth_alias(token: Address) -> bool {
    ETH_ALIASES.contains(&token)
}

/// Case and `0x`/`0X` prefix are ignored.
pub fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(&normalize_hex(value))
        .map_err(|err| SdkError::validation(format!("invalid address {value}: {err}")))
}

pub fn parse_b256(value: &str) -> Result<B256> {
    B256::from_str(value.trim())
        .map_err(|err| SdkError::validation(format!("invalid bytes32 {value}: {err}")))
}

pub fn parse_u256(value: &str) -> Result<U256> {
    U256::from_str(value.trim())
        .map_err(|err| SdkError::validation(format!("invalid uint256 {value}: {err}")))
}

/// Lower-case hex without prefix, for comparisons on untrusted strings.
pub fn normalize_hex(value: &str) -> String {
    let trimmed = value.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    raw.to_ascii_lowercase()
}

pub fn format_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn bytes_from_hex(value: &str) -> Result<Bytes> {
    let raw = normalize_hex(value);
    let bytes = hex::decode(&raw)
        .map_err(|err| SdkError::validation(format!("invalid hex {value}: {err}")))?;
    Ok(Bytes::from(bytes))
}

/// First four bytes of the keccak hash of a function or error signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Left-pad an address into a 32-byte log topic.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eth_aliases_are_recognised() {
        assert!(is_eth_alias(Address::ZERO));
        assert!(is_eth_alias(parse_address("0x000000000000000000000000000000000000800A").unwrap()));
        assert!(is_eth_alias(parse_address("0000000000000000000000000000000000000001").unwrap()));
        let other = parse_address("0x0000000000000000000000000000000000000002").unwrap();
        assert!(!is_eth_alias(other));
    }

    #[test]
    fn address_parsing_ignores_case_and_prefix() {
        let lower = parse_address("0xabcdef0000000000000000000000000000000001").unwrap();
        assert_eq!(parse_address("0XABCDEF0000000000000000000000000000000001").unwrap(), lower);
        assert_eq!(parse_address(" AbCdEf0000000000000000000000000000000001 ").unwrap(), lower);
        assert!(parse_address("0x01").is_err());
    }

    #[test]
    fn known_selectors() {
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("Error(string)"), [0x08, 0xc3, 0x79, 0xa0]);
    }

    #[test]
    fn hex_round_trip_accepts_upper_prefix() {
        let bytes = bytes_from_hex("0XDEADBEEF").unwrap();
        assert_eq!(format_hex(&bytes), "0xdeadbeef");
    }
}
