//! Built-in tool set
//!
//! Small, dependency-light tools that are always available to the agent.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::protocol::ToolResolver;

pub const CALCULATOR: &str = "calculator";
pub const CURRENT_TIME: &str = "current_time";
pub const TEXT_STATS: &str = "text_stats";

const BUILTIN_TOOLS: &[&str] = &[CALCULATOR, CURRENT_TIME, TEXT_STATS];

/// The always-available tool set.
#[derive(Debug, Clone, Default)]
pub struct BuiltinToolSet;

impl BuiltinToolSet {
    pub fn new() -> Self {
        Self
    }

    /// Tool descriptions for the system prompt
    pub fn descriptions() -> String {
        format!(
            "Built-in tools:\n\
             1. {} - Evaluate a mathematical expression (argument: \"expression\")\n\
             2. {} - Current date and time in UTC\n\
             3. {} - Character/word/line counts for a text (argument: \"text\")",
            CALCULATOR, CURRENT_TIME, TEXT_STATS
        )
    }

    fn calculate(arguments: &Value) -> anyhow::Result<Value> {
        let expression = arguments
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("calculator requires an 'expression' argument"))?;

        let result = meval::eval_str(expression)
            .map_err(|e| anyhow::anyhow!("Cannot evaluate '{}': {}", expression, e))?;

        Ok(json!({ "expression": expression, "result": result }))
    }

    fn current_time() -> Value {
        let now = Utc::now();
        json!({
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
        })
    }

    fn text_stats(arguments: &Value) -> anyhow::Result<Value> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("text_stats requires a 'text' argument"))?;

        Ok(json!({
            "chars": text.chars().count(),
            "words": text.split_whitespace().count(),
            "lines": text.lines().count(),
        }))
    }
}

#[async_trait]
impl ToolResolver for BuiltinToolSet {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn tool_names(&self) -> Vec<String> {
        BUILTIN_TOOLS.iter().map(|t| t.to_string()).collect()
    }

    fn recognizes(&self, tool_name: &str) -> bool {
        BUILTIN_TOOLS.contains(&tool_name)
    }

    async fn invoke(&self, tool_name: &str, arguments: &Value) -> anyhow::Result<Value> {
        match tool_name {
            CALCULATOR => Self::calculate(arguments),
            CURRENT_TIME => Ok(Self::current_time()),
            TEXT_STATS => Self::text_stats(arguments),
            other => anyhow::bail!("Tool '{}' not found", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calculator() {
        let tools = BuiltinToolSet::new();
        let result = tools
            .invoke(CALCULATOR, &json!({"expression": "2 * (3 + 4)"}))
            .await
            .unwrap();
        assert_eq!(result["result"], 14.0);
    }

    #[tokio::test]
    async fn test_calculator_bad_expression() {
        let tools = BuiltinToolSet::new();
        let result = tools
            .invoke(CALCULATOR, &json!({"expression": "2 +* 3"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_text_stats() {
        let tools = BuiltinToolSet::new();
        let result = tools
            .invoke(TEXT_STATS, &json!({"text": "one two\nthree"}))
            .await
            .unwrap();
        assert_eq!(result["words"], 3);
        assert_eq!(result["lines"], 2);
    }

    #[test]
    fn test_recognizes() {
        let tools = BuiltinToolSet::new();
        assert!(tools.recognizes(CALCULATOR));
        assert!(!tools.recognizes("mcp_web_search"));
    }
}
