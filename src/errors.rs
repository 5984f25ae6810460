//! Error types shared by every route, planner and tracker in the crate.
//!
//! Errors carry a kind, a message and a context bag describing what was being
//! attempted. `SdkError::pretty` renders the whole thing for terminals and logs.

use crate::revert::DecodedRevert;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Hex strings longer than this are elided by the pretty printer.
const MAX_HEX_DISPLAY: usize = 66;

pub type Result<T, E = SdkError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Registry or gas policy misconfiguration
    Config,
    /// Caller input or route precondition violated before anything was sent
    Validation,
    /// A contract read failed or returned an unexpected shape
    Contract,
    /// Transport level failure talking to a node
    Rpc,
    /// A transaction was rejected, dropped or mined with a failure status
    SendFailed,
    /// A call or transaction reverted
    OnChainRevert,
    /// A wait exceeded its deadline
    Timeout,
    /// No strategy exists for the requested combination
    Unsupported,
    /// The abort signal fired inside a wait loop
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Contract => "ContractError",
            ErrorKind::Rpc => "RpcError",
            ErrorKind::SendFailed => "SendFailed",
            ErrorKind::OnChainRevert => "OnChainRevert",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SdkError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: ErrorContext,
    pub revert: Option<DecodedRevert>,
}

impl SdkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::default(),
            revert: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Contract, message)
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rpc, message)
    }

    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SendFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Build a revert error from decoded revert data.
    pub fn reverted(revert: DecodedRevert) -> Self {
        let mut err = Self::new(ErrorKind::OnChainRevert, revert.summary());
        err.revert = Some(revert);
        err
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.context.resource = Some(resource.into());
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.context.extra.insert(key.to_string(), value);
        self
    }

    /// Re-tag a failed read as a contract error. Transport failures and
    /// reverted calls are folded in (the decoded revert stays attached); every
    /// other kind is left alone.
    pub fn into_contract(mut self) -> Self {
        if matches!(self.kind, ErrorKind::Rpc | ErrorKind::OnChainRevert) {
            self.kind = ErrorKind::Contract;
        }
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Render the error with its context on multiple lines.
    pub fn pretty(&self) -> String {
        let mut out = format!("{}: {}", self.kind, elide_hex(&self.message));
        if let Some(operation) = &self.context.operation {
            out.push_str(&format!("\n  operation: {operation}"));
        }
        if let Some(resource) = &self.context.resource {
            out.push_str(&format!("\n  resource:  {resource}"));
        }
        for (key, value) in &self.context.extra {
            out.push_str(&format!("\n  {key}: {}", render_value(value)));
        }
        if let Some(revert) = &self.revert {
            out.push_str(&format!("\n  revert: {}", elide_hex(&revert.summary())));
            if let Some(selector) = &revert.selector {
                out.push_str(&format!("\n  selector: {selector}"));
            }
        }
        out
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => elide_hex(text),
        serde_json::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        serde_json::Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(key, value)| format!("{key}={}", render_value(value)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        other => other.to_string(),
    }
}

/// Shorten long `0x` payloads embedded anywhere in `text`.
pub fn elide_hex(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(256));
    let mut rest = text;
    while let Some(start) = rest.find("0x") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let len = 2 + candidate[2..]
            .bytes()
            .take_while(|byte| byte.is_ascii_hexdigit())
            .count();
        let token = &candidate[..len];
        if len > MAX_HEX_DISPLAY {
            out.push_str(&format!(
                "{}…{} ({} bytes)",
                &token[..10],
                &token[len - 8..],
                (len - 2) / 2
            ));
        } else {
            out.push_str(token);
        }
        rest = &candidate[len..];
    }
    out.push_str(rest);
    out
}
