//! The central Model Context Protocol dispatcher
//!
//! Decodes JSON-RPC envelopes, routes them through a method table to the
//! handshake and tool handlers, and shapes every outcome into a well-formed
//! response. Nothing raised by a tool crosses this boundary.

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use rust_mcp_sdk::schema::{
    CallToolResult, ContentBlock, Implementation, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerCapabilitiesTools, TextContent,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::errors::McpError;
use crate::mcp::rpc::{
    http_status_for_code, recover_request_id, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};
use crate::registry::ToolRegistry;
use crate::schema::validate_arguments;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";

/// Handshake metadata reported by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: "viincci_rag_server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// What the transport should write back: a status and an optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Option<ReplyBody>,
}

impl Reply {
    fn single(response: JsonRpcResponse) -> Self {
        let status = response.error_code().map_or(200, http_status_for_code);
        Self {
            status,
            body: Some(ReplyBody::Single(response)),
        }
    }

    fn empty() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

type MethodHandler = fn(&Dispatcher, Option<&Value>) -> Result<Value, McpError>;

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    identity: ServerIdentity,
    methods: HashMap<&'static str, MethodHandler>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, identity: ServerIdentity) -> Self {
        let mut methods: HashMap<&'static str, MethodHandler> = HashMap::new();
        methods.insert(METHOD_INITIALIZE, Dispatcher::initialize);
        methods.insert(METHOD_TOOLS_LIST, Dispatcher::tools_list);
        methods.insert(METHOD_TOOLS_CALL, Dispatcher::tools_call);
        methods.insert(METHOD_INITIALIZED, Dispatcher::initialized);

        Self {
            registry,
            identity,
            methods,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Entry point for raw transport bodies, including unparsable ones.
    pub fn handle_body(&self, body: &[u8]) -> Reply {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => self.handle_value(payload),
            Err(err) => {
                warn!(error = %err, "mcp request body is not valid JSON");
                Reply::single(JsonRpcResponse::from_mcp_error(
                    None,
                    &McpError::internal(format!("Parse error: {err}")),
                ))
            }
        }
    }

    /// Handles a decoded body, which may be a single message or a batch.
    pub fn handle_value(&self, payload: Value) -> Reply {
        let batch = match payload {
            Value::Array(batch) => batch,
            single => {
                return match self.dispatch(single) {
                    Some(response) => Reply::single(response),
                    None => Reply::empty(),
                }
            }
        };

        if batch.is_empty() {
            return Reply::single(JsonRpcResponse::from_mcp_error(
                None,
                &McpError::invalid_request("empty batch"),
            ));
        }

        let responses = batch
            .into_iter()
            .filter_map(|item| self.dispatch(item))
            .collect::<Vec<_>>();

        if responses.is_empty() {
            return Reply::empty();
        }

        Reply {
            status: 200,
            body: Some(ReplyBody::Batch(responses)),
        }
    }

    /// Handles one JSON-RPC message. Notifications yield `None`.
    pub fn dispatch(&self, payload: Value) -> Option<JsonRpcResponse> {
        let Some(object) = payload.as_object() else {
            return Some(JsonRpcResponse::from_mcp_error(
                None,
                &McpError::invalid_request("request must be a JSON object"),
            ));
        };
        let is_notification = !object.contains_key("id");
        let recovered_id = recover_request_id(&payload);

        let has_method = object.get("method").is_some_and(Value::is_string);

        let request: JsonRpcRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(err) => {
                let error = if has_method {
                    McpError::invalid_request(err.to_string())
                } else {
                    McpError::internal(format!("request method must be a string: {err}"))
                };
                return Some(JsonRpcResponse::from_mcp_error(recovered_id, &error));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::from_mcp_error(
                request.id,
                &McpError::invalid_request(format!(
                    "unsupported jsonrpc version '{}'",
                    request.jsonrpc
                )),
            ));
        }

        if is_notification {
            self.notify(&request);
            return None;
        }

        Some(self.handle_request(request))
    }

    pub fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let response = match self.route(&request.method, request.params.as_ref()) {
            Ok(result) => JsonRpcResponse::result(request.id, result),
            Err(err) => JsonRpcResponse::from_mcp_error(request.id, &err),
        };
        audit(&request.method, request.params.as_ref(), !response.is_error());
        response
    }

    fn notify(&self, request: &JsonRpcRequest) {
        if !self.methods.contains_key(request.method.as_str()) {
            debug!(method = %request.method, "ignoring unknown notification");
            return;
        }

        let outcome = self.route(&request.method, request.params.as_ref());
        audit(&request.method, request.params.as_ref(), outcome.is_ok());
    }

    fn route(&self, method: &str, params: Option<&Value>) -> Result<Value, McpError> {
        let handler = self
            .methods
            .get(method)
            .ok_or_else(|| McpError::MethodNotFound(method.to_string()))?;
        handler(self, params)
    }

    fn initialize(&self, _params: Option<&Value>) -> Result<Value, McpError> {
        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: self.identity.name.clone(),
                version: self.identity.version.clone(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            protocol_version: self.identity.protocol_version.clone(),
            instructions: None,
            meta: None,
        };

        serde_json::to_value(initialize_result)
            .map_err(|err| McpError::internal(format!("initialize result serialization: {err}")))
    }

    fn tools_list(&self, _params: Option<&Value>) -> Result<Value, McpError> {
        serde_json::to_value(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: self.registry.tools()?,
        })
        .map_err(|err| McpError::internal(format!("tools list result serialization: {err}")))
    }

    fn tools_call(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let raw_params = params
            .filter(|value| !value.is_null())
            .ok_or_else(|| McpError::invalid_params("tools/call requires params"))?;
        let call: CallToolParams = serde_json::from_value(raw_params.clone())
            .map_err(|err| McpError::invalid_params(format!("invalid tools/call params: {err}")))?;

        let tool = self.registry.get(&call.name)?;
        let arguments = call.arguments.unwrap_or_default();

        validate_arguments(tool.input_schema(), &arguments).map_err(|reason| {
            McpError::InvalidArguments {
                tool: call.name.clone(),
                reason,
            }
        })?;

        debug!(tool = %call.name, "invoking tool");
        let text = match panic::catch_unwind(AssertUnwindSafe(|| tool.invoke(&arguments))) {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(tool = %call.name, error = %err, "tool invocation failed");
                return Err(McpError::internal(format!(
                    "tool '{}' failed: {}",
                    call.name,
                    err.message()
                )));
            }
            Err(payload) => {
                let reason = panic_message(&*payload);
                warn!(tool = %call.name, reason = %reason, "tool invocation panicked");
                return Err(McpError::internal(format!(
                    "tool '{}' panicked: {reason}",
                    call.name
                )));
            }
        };

        serde_json::to_value(CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(text, None, None))],
            is_error: None,
            meta: None,
            structured_content: None,
        })
        .map_err(|err| McpError::internal(format!("tool result serialization: {err}")))
    }

    fn initialized(&self, _params: Option<&Value>) -> Result<Value, McpError> {
        info!("client completed initialization");
        Ok(json!({}))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

fn audit(method: &str, params: Option<&Value>, succeeded: bool) {
    info!(
        method = %method,
        params = %redact_audit_params(params),
        outcome = if succeeded { "success" } else { "failure" },
        "mcp action audited"
    );
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|marker| normalized.contains(marker))
}
