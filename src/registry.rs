//! In-memory tool registry
//!
//! Registrations build a fresh immutable snapshot and swap it in, so readers
//! always see either the complete previous tool set or the complete new one.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use rust_mcp_sdk::schema::Tool;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{
    errors::{RegistryError, ToolError},
    schema::check_schema_shape,
};

/// Invocation seam for tool implementations.
pub trait ToolHandler: Send + Sync {
    fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Map<String, Value>) -> Result<String, ToolError> + Send + Sync,
{
    fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        self(arguments)
    }
}

#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(handler),
        }
    }

    pub fn from_fn<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self::new(name, description, input_schema, handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn invoke(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        self.handler.invoke(arguments)
    }

    /// The `{name, description, inputSchema}` entry advertised by `tools/list`.
    pub fn to_tool(&self) -> Result<Tool, RegistryError> {
        serde_json::from_value(json!({
            "name": self.name(),
            "description": self.description(),
            "inputSchema": self.input_schema(),
        }))
        .map_err(|err| RegistryError::InvalidSchema {
            name: self.name().to_string(),
            reason: err.to_string(),
        })
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Snapshot {
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ToolRegistry {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        check_schema_shape(&descriptor.input_schema).map_err(|reason| {
            RegistryError::InvalidSchema {
                name: descriptor.name.clone(),
                reason,
            }
        })?;
        descriptor.to_tool()?;

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }

        let mut tools = guard.tools.clone();
        let mut index = guard.index.clone();
        index.insert(descriptor.name.clone(), tools.len());
        info!(tool = %descriptor.name, "tool registered");
        tools.push(Arc::new(descriptor));

        *guard = Arc::new(Snapshot { tools, index });
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Result<Arc<ToolDescriptor>, RegistryError> {
        let snapshot = self.current();
        snapshot
            .index
            .get(name)
            .map(|&position| Arc::clone(&snapshot.tools[position]))
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))
    }

    /// All tools in registration order.
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.current().tools.clone()
    }

    /// SDK tool entries in registration order.
    pub fn tools(&self) -> Result<Vec<Tool>, RegistryError> {
        self.current()
            .tools
            .iter()
            .map(|tool| tool.to_tool())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Arc<Snapshot> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .list()
            .iter()
            .map(|tool| tool.name.clone())
            .collect::<Vec<_>>();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
