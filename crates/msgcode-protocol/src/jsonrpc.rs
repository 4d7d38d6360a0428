use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Desktop host request envelope: `{jsonrpc:"2.0", id, method, params}`.
/// Framed one-per-line over the same [`crate::linecodec::LineCodec`] the
/// Session Pool uses for every other `kind` of child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion,
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Desktop host response envelope: `{jsonrpc:"2.0", id, result?, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Always serializes/deserializes as the literal string `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )))
        }
    }
}

/// The closed set of methods the desktop host contract names. Kept as
/// `&'static str` constants rather than an enum since `desktop rpc` passes
/// the method name straight through from the command line.
pub mod desktop_methods {
    pub const PING: &str = "desktop.ping";
    pub const DOCTOR: &str = "desktop.doctor";
    pub const OBSERVE: &str = "desktop.observe";
    pub const FIND: &str = "desktop.find";
    pub const CLICK: &str = "desktop.click";
    pub const TYPE_TEXT: &str = "desktop.typeText";
    pub const HOTKEY: &str = "desktop.hotkey";
    pub const WAIT_UNTIL: &str = "desktop.waitUntil";
    pub const LIST_MODALS: &str = "desktop.listModals";
    pub const DISMISS_MODAL: &str = "desktop.dismissModal";
    pub const ABORT: &str = "desktop.abort";
    pub const CONFIRM_ISSUE: &str = "desktop.confirm.issue";
    pub const HEALTH: &str = "desktop.health";
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcResponse {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips_through_json() {
        let req = JsonRpcRequest::new("1", desktop_methods::PING, None);
        let line = serde_json::to_string(&req).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(back.method, "desktop.ping");
        assert_eq!(back.id, "1");
    }

    #[test]
    fn rejects_wrong_jsonrpc_version() {
        let bad = r#"{"jsonrpc":"1.0","id":"1","method":"desktop.ping"}"#;
        assert!(serde_json::from_str::<JsonRpcRequest>(bad).is_err());
    }

    #[test]
    fn error_response_serializes_without_result() {
        let res = JsonRpcResponse::err("1", -32000, "desktop timed out");
        let value = serde_json::to_value(&res).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32000);
    }
}
