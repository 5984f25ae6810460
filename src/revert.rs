//! Revert data extraction and decoding.
//!
//! Transport errors arrive in many shapes. Each extractor below looks at one
//! known location; they are tried in a fixed order and the first hit wins.

use crate::abi::KNOWN_ERRORS;
use crate::types::{bytes_from_hex, format_hex, selector};
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolValue;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevertSource {
    DirectField,
    NestedError,
    JsonBody,
    NestedInfo,
    MessageText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertData {
    pub bytes: Bytes,
    pub source: RevertSource,
}

type Extractor = fn(&Value) -> Option<Bytes>;

const EXTRACTORS: [(RevertSource, Extractor); 5] = [
    (RevertSource::DirectField, direct_field),
    (RevertSource::NestedError, nested_error),
    (RevertSource::JsonBody, json_body),
    (RevertSource::NestedInfo, nested_info),
    (RevertSource::MessageText, message_text),
];

/// Find revert bytes anywhere we know transports put them.
pub fn extract_revert_data(payload: &Value) -> Option<RevertData> {
    EXTRACTORS.iter().find_map(|(source, extract)| {
        extract(payload).map(|bytes| RevertData {
            bytes,
            source: *source,
        })
    })
}

fn hex_value(value: &Value) -> Option<Bytes> {
    match value {
        Value::String(text) if text.starts_with("0x") && text.len() >= 10 => {
            bytes_from_hex(text).ok()
        }
        Value::Object(map) => map.get("data").and_then(hex_value),
        _ => None,
    }
}

fn direct_field(payload: &Value) -> Option<Bytes> {
    payload.get("data").and_then(hex_value)
}

fn nested_error(payload: &Value) -> Option<Bytes> {
    payload.get("error")?.get("data").and_then(hex_value)
}

fn json_body(payload: &Value) -> Option<Bytes> {
    let body = payload.get("body")?.as_str()?;
    let parsed: Value = serde_json::from_str(body).ok()?;
    nested_error(&parsed).or_else(|| direct_field(&parsed))
}

fn nested_info(payload: &Value) -> Option<Bytes> {
    payload.get("info")?.get("error")?.get("data").and_then(hex_value)
}

fn message_text(payload: &Value) -> Option<Bytes> {
    let message = payload.get("message")?.as_str()?;
    let start = message.find("0x")?;
    let candidate = &message[start..];
    let end = 2 + candidate[2..]
        .bytes()
        .take_while(|byte| byte.is_ascii_hexdigit())
        .count();
    // need at least a selector
    if end < 10 || (end - 2) % 2 != 0 {
        return None;
    }
    bytes_from_hex(&candidate[..end]).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRevert {
    pub selector: Option<String>,
    pub name: Option<String>,
    pub args: Vec<String>,
    pub reason: Option<String>,
    pub data: String,
}

impl DecodedRevert {
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.reason {
            return reason.clone();
        }
        match &self.name {
            Some(name) => format!("{name}({})", self.args.join(", ")),
            None => "EVM call failed".to_string(),
        }
    }
}

struct KnownError {
    name: &'static str,
    params: Option<DynSolType>,
}

fn known_errors() -> &'static HashMap<[u8; 4], KnownError> {
    static TABLE: OnceLock<HashMap<[u8; 4], KnownError>> = OnceLock::new();
    TABLE.get_or_init(|| {
        KNOWN_ERRORS
            .iter()
            .map(|signature| {
                let name = signature.split('(').next().unwrap_or(signature);
                let params = &signature[name.len()..];
                let params = if params == "()" {
                    None
                } else {
                    DynSolType::parse(params).ok()
                };
                (selector(signature), KnownError { name, params })
            })
            .collect()
    })
}

/// Decode revert bytes against `Error(string)`, `Panic(uint256)` and the
/// known-error table. Never fails: unknown data becomes a generic revert.
pub fn decode_revert(data: &[u8]) -> DecodedRevert {
    let mut decoded = DecodedRevert {
        selector: None,
        name: None,
        args: Vec::new(),
        reason: None,
        data: format_hex(data),
    };
    if data.len() < 4 {
        return decoded;
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&data[..4]);
    decoded.selector = Some(format_hex(&sel));
    let body = &data[4..];

    if sel == ERROR_STRING_SELECTOR {
        if let Ok((reason,)) = <(String,)>::abi_decode_params(body) {
            decoded.name = Some("Error".to_string());
            decoded.reason = Some(reason);
        }
        return decoded;
    }
    if sel == PANIC_SELECTOR {
        if let Ok((code,)) = <(U256,)>::abi_decode(body) {
            decoded.name = Some("Panic".to_string());
            decoded.reason = Some(format!("panic({code:#x})"));
        }
        return decoded;
    }
    match known_errors().get(&sel) {
        Some(known) => {
            decoded.name = Some(known.name.to_string());
            if let Some(params) = &known.params {
                match params.abi_decode_params(body) {
                    Ok(DynSolValue::Tuple(values)) => {
                        decoded.args = values.iter().map(render_dyn_value).collect();
                    }
                    Ok(other) => decoded.args = vec![render_dyn_value(&other)],
                    Err(err) => {
                        tracing::debug!(
                            error = %err,
                            name = known.name,
                            "revert args did not decode"
                        );
                    }
                }
            }
        }
        None => {
            tracing::debug!(selector = %format_hex(&sel), "unknown revert selector");
        }
    }
    decoded
}

fn render_dyn_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => format!("{address:#x}"),
        DynSolValue::Bool(flag) => flag.to_string(),
        DynSolValue::Uint(number, _) => number.to_string(),
        DynSolValue::Int(number, _) => number.to_string(),
        DynSolValue::FixedBytes(word, size) => format_hex(&word.as_slice()[..*size]),
        DynSolValue::Bytes(bytes) => format_hex(bytes),
        DynSolValue::String(text) => format!("{text:?}"),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(render_dyn_value).collect();
            format!("[{}]", inner.join(", "))
        }
        other => format!("{other:?}"),
    }
}

/// Turn a transport error payload into an `OnChainRevert` error when revert
/// data can be found in it.
pub fn revert_from_payload(payload: &Value) -> Option<crate::errors::SdkError> {
    let data = extract_revert_data(payload)?;
    let decoded = decode_revert(&data.bytes);
    if decoded.name.is_none() {
        tracing::warn!(source = ?data.source, data = %decoded.data, "revert data not recognised");
    }
    Some(crate::errors::SdkError::reverted(decoded).with_context("revertSource", data.source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use serde_json::json;

    fn encoded_error(signature: &str, args: Vec<u8>) -> String {
        let mut data = selector(signature).to_vec();
        data.extend(args);
        format_hex(&data)
    }

    #[test]
    fn extraction_order_prefers_direct_field() {
        let payload = json!({
            "data": "0x12345678",
            "error": { "data": "0xdeadbeef" },
        });
        let found = extract_revert_data(&payload).expect("revert data");
        assert_eq!(found.source, RevertSource::DirectField);
        assert_eq!(format_hex(&found.bytes), "0x12345678");
    }

    #[test]
    fn extracts_json_body_and_nested_info() {
        let body = json!({ "error": { "code": 3, "data": "0xdeadbeef" } }).to_string();
        let found = extract_revert_data(&json!({ "body": body })).expect("body");
        assert_eq!(found.source, RevertSource::JsonBody);

        let payload = json!({ "info": { "error": { "data": "0xcafebabe" } } });
        let found = extract_revert_data(&payload).expect("info");
        assert_eq!(found.source, RevertSource::NestedInfo);
        assert_eq!(format_hex(&found.bytes), "0xcafebabe");
    }

    #[test]
    fn extracts_from_message_text() {
        let payload = json!({
            "message": "server returned an error response: error code 3: execution reverted, data: \"0x32c2e156\""
        });
        let found = extract_revert_data(&payload).expect("message");
        assert_eq!(found.source, RevertSource::MessageText);
        assert_eq!(format_hex(&found.bytes), "0x32c2e156");
    }

    #[test]
    fn missing_data_is_not_found() {
        assert!(extract_revert_data(&json!({ "message": "nonce too low" })).is_none());
        assert!(extract_revert_data(&json!({ "data": "0x" })).is_none());
    }

    #[test]
    fn decodes_error_string() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(("insufficient allowance".to_string(),).abi_encode_params());
        let decoded = decode_revert(&data);
        assert_eq!(decoded.summary(), "insufficient allowance");
    }

    #[test]
    fn decodes_known_error_with_args() {
        let hash = B256::repeat_byte(0x11);
        let data = encoded_error("BundleAlreadyProcessed(bytes32)", hash.abi_encode());
        let decoded = decode_revert(&bytes_from_hex(&data).unwrap());
        assert_eq!(decoded.name.as_deref(), Some("BundleAlreadyProcessed"));
        assert_eq!(decoded.args, vec![format!("{hash:#x}")]);
    }

    #[test]
    fn unknown_selector_degrades_to_generic() {
        let decoded = decode_revert(&[0xff, 0xee, 0xdd, 0xcc, 0x00]);
        assert_eq!(decoded.summary(), "EVM call failed");
        assert_eq!(decoded.selector.as_deref(), Some("0xffeeddcc"));
    }

    #[test]
    fn payload_becomes_revert_error() {
        let data = encoded_error("MessageNotIncluded()", Vec::new());
        let err = revert_from_payload(&json!({ "error": { "data": data } })).expect("error");
        assert!(err.is(crate::errors::ErrorKind::OnChainRevert));
        assert_eq!(err.message, "MessageNotIncluded()");
    }
}
