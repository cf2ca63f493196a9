//! User-defined tool set
//!
//! Tools created at runtime (typically loaded from the session store) and
//! registered as plain callables. Last in the resolver chain: a user tool
//! can never shadow a built-in or external name.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::ToolResolver;

type UserToolFn = dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync;

struct UserTool {
    description: String,
    callable: Arc<UserToolFn>,
}

/// Registry of user-defined tools.
#[derive(Default)]
pub struct UserToolSet {
    tools: HashMap<String, UserTool>,
}

impl UserToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, description: impl Into<String>, f: F)
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.tools.insert(
            name.into(),
            UserTool {
                description: description.into(),
                callable: Arc::new(f),
            },
        );
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.tools.get(name).map(|t| t.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolResolver for UserToolSet {
    fn name(&self) -> &'static str {
        "user"
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
        (tool.callable)(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut set = UserToolSet::new();
        set.register("shout", "uppercase a string", |args| {
            let text = args.get("text").and_then(Value::as_str).unwrap_or("");
            Ok(json!(text.to_uppercase()))
        });

        assert_eq!(set.description("shout"), Some("uppercase a string"));
        let result = set.invoke("shout", &json!({"text": "hey"})).await.unwrap();
        assert_eq!(result, json!("HEY"));
    }

    #[tokio::test]
    async fn test_tool_error_propagates() {
        let mut set = UserToolSet::new();
        set.register("fail", "always fails", |_| anyhow::bail!("nope"));

        let result = set.invoke("fail", &json!({})).await;
        assert!(result.is_err());
    }
}
