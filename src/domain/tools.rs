//! The `query` tool exposed via Model Context Protocol
//!
//! Answers every prompt with the same fixed marker string.

use serde_json::{Map, Value};

use crate::{
    errors::{RegistryError, ToolError},
    registry::{ToolDescriptor, ToolRegistry},
    schema::single_string_argument,
};

pub const QUERY_TOOL_NAME: &str = "query";
pub const QUERY_RESPONSE: &str = "viincci_rag";

pub fn query_tool() -> ToolDescriptor {
    ToolDescriptor::from_fn(
        QUERY_TOOL_NAME,
        "Responds to any prompt with 'viincci_rag'.",
        single_string_argument("prompt", "Any text input or question"),
        run_query,
    )
}

fn run_query(_arguments: &Map<String, Value>) -> Result<String, ToolError> {
    Ok(QUERY_RESPONSE.to_string())
}

/// Registry populated with every tool this server ships.
pub fn default_registry() -> Result<ToolRegistry, RegistryError> {
    let registry = ToolRegistry::new();
    registry.register(query_tool())?;
    Ok(registry)
}
