//! Namespaced external-tool registry
//!
//! External integrations (MCP servers and similar) register their tools
//! under an `mcp_<server>_<tool>` naming convention. This resolver is
//! first in the chain so a namespaced name can never be shadowed by a
//! built-in or user tool.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::ToolResolver;

/// Name prefix reserved for externally registered tools
pub const EXTERNAL_PREFIX: &str = "mcp_";

/// An externally provided callable.
#[async_trait]
pub trait ExternalTool: Send + Sync {
    async fn call(&self, arguments: &Value) -> anyhow::Result<Value>;
}

/// Registry of namespaced external tools.
#[derive(Default)]
pub struct NamespacedToolSet {
    tools: HashMap<String, Arc<dyn ExternalTool>>,
}

impl NamespacedToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an external tool. Names outside the namespace are rejected
    /// so the prefix convention stays meaningful.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        tool: Arc<dyn ExternalTool>,
    ) -> anyhow::Result<()> {
        let name = name.into();
        if !name.starts_with(EXTERNAL_PREFIX) {
            anyhow::bail!(
                "external tool '{}' must use the '{}' prefix",
                name,
                EXTERNAL_PREFIX
            );
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolResolver for NamespacedToolSet {
    fn name(&self) -> &'static str {
        "external"
    }

    fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    fn recognizes(&self, tool_name: &str) -> bool {
        self.tools.contains_key(tool_name)
    }

    async fn invoke(&self, tool_name: &str, arguments: &Value) -> anyhow::Result<Value> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow::anyhow!("Tool '{}' not found", tool_name))?;
        tool.call(arguments).await
    }
}
