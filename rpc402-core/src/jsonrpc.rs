//! JSON-RPC 2.0 envelopes.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::types::AnyJson;

/// Invalid request envelope.
pub const INVALID_REQUEST: i64 = -32600;
/// Internal error.
pub const INTERNAL_ERROR: i64 = -32603;

/// The literal `"2.0"` protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct JsonRpcV2;

impl Serialize for JsonRpcV2 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcV2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = String::deserialize(deserializer)?;
        match v.as_str() {
            "2.0" => Ok(JsonRpcV2),
            _ => Err(serde::de::Error::custom(format!(
                "Unsupported JSON-RPC version {v}; expected 2.0"
            ))),
        }
    }
}

/// A request identifier; JSON-RPC allows strings and numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(serde_json::Number),
    String(String),
}

impl Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for JsonRpcId {
    fn from(value: u64) -> Self {
        JsonRpcId::Number(value.into())
    }
}

impl From<&str> for JsonRpcId {
    fn from(value: &str) -> Self {
        JsonRpcId::String(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcV2,
    pub id: JsonRpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<AnyJson>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<JsonRpcId>, method: impl Into<String>, params: Option<AnyJson>) -> Self {
        JsonRpcRequest {
            jsonrpc: JsonRpcV2,
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Validate an untyped body as a JSON-RPC 2.0 request.
    ///
    /// Requires `jsonrpc == "2.0"`, a string or number `id`, and a string `method`.
    pub fn from_value(body: AnyJson) -> Option<Self> {
        serde_json::from_value(body).ok()
    }

    /// The `index`th positional parameter, if params is an array.
    pub fn param(&self, index: usize) -> Option<&AnyJson> {
        self.params.as_ref()?.as_array()?.get(index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnyJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcV2,
    /// `null` when the request id could not be determined.
    pub id: Option<JsonRpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnyJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: JsonRpcId, result: AnyJson) -> Self {
        JsonRpcResponse {
            jsonrpc: JsonRpcV2,
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(
        id: Option<JsonRpcId>,
        code: i64,
        message: impl Into<String>,
        data: Option<AnyJson>,
    ) -> Self {
        JsonRpcResponse {
            jsonrpc: JsonRpcV2,
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    /// `{"jsonrpc":"2.0","id":null,"error":{"code":-32600,"message":"Invalid JSON-RPC request"}}`
    pub fn invalid_request() -> Self {
        Self::error(None, INVALID_REQUEST, "Invalid JSON-RPC request", None)
    }

    pub fn internal_error(id: Option<JsonRpcId>) -> Self {
        Self::error(id, INTERNAL_ERROR, "Internal error", None)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
