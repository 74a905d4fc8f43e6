//! Model Context Protocol (MCP) request handling over JSON-RPC
//!
//! Provides the JSON-RPC envelope types and the method dispatcher that routes requests to the tool registry.

pub mod dispatcher;
pub mod rpc;
