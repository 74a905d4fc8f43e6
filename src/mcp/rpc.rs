//! JSON-RPC 2.0 envelope types
//!
//! Statically typed request/response structures plus the reserved error codes
//! the dispatcher answers with.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::errors::McpError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(Number),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(JsonRpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    pub fn result(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn from_mcp_error(id: Option<RequestId>, err: &McpError) -> Self {
        Self::error(id, err.to_rpc_error())
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn error_code(&self) -> Option<i32> {
        match &self.payload {
            ResponsePayload::Error(error) => Some(error.code),
            ResponsePayload::Result(_) => None,
        }
    }
}

/// Recommended transport status for an error code.
pub fn http_status_for_code(code: i32) -> u16 {
    match code {
        INVALID_REQUEST | INVALID_PARAMS => 400,
        METHOD_NOT_FOUND => 404,
        _ => 500,
    }
}

/// Best-effort id recovery from a payload that may not decode as a request.
pub fn recover_request_id(payload: &Value) -> Option<RequestId> {
    payload
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}
