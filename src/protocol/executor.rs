//! Tool resolution and execution
//!
//! Tool names are resolved against an ordered chain of resolvers; the
//! first resolver that recognizes a name handles it. Calls run strictly
//! sequentially so tool side effects and progress messages stay
//! deterministic; cancellation is cooperative and checked between calls.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::run_status::ToolExecution;

use super::directive::StructuredToolCall;

/// A set of tools that can recognize and invoke names.
///
/// Implementations: the namespaced external registry, the built-in set and
/// the user-defined set, tried in that order.
#[async_trait]
pub trait ToolResolver: Send + Sync {
    /// Resolver label for logs
    fn name(&self) -> &'static str;

    /// Tool names this resolver currently recognizes
    fn tool_names(&self) -> Vec<String>;

    /// Whether this resolver handles the given tool name
    fn recognizes(&self, tool_name: &str) -> bool;

    /// Invoke a recognized tool
    async fn invoke(&self, tool_name: &str, arguments: &Value) -> anyhow::Result<Value>;
}

/// Executes parsed tool calls against the resolver chain.
#[derive(Clone)]
pub struct ToolExecutor {
    resolvers: Vec<Arc<dyn ToolResolver>>,
}

impl ToolExecutor {
    pub fn new(resolvers: Vec<Arc<dyn ToolResolver>>) -> Self {
        Self { resolvers }
    }

    /// Total tools recognized across the chain
    pub fn tool_count(&self) -> usize {
        self.resolvers.iter().map(|r| r.tool_names().len()).sum()
    }

    /// All tool names, chain order
    pub fn tool_names(&self) -> Vec<String> {
        self.resolvers
            .iter()
            .flat_map(|r| r.tool_names())
            .collect()
    }

    /// Execute all calls sequentially, in array order.
    ///
    /// Every call produces a record: unknown tools and per-call failures
    /// become failed executions rather than aborting the run. Remaining
    /// calls are skipped once `cancel` fires.
    pub async fn execute_all(
        &self,
        calls: &[StructuredToolCall],
        cancel: &CancellationToken,
    ) -> Vec<ToolExecution> {
        let mut executions = Vec::with_capacity(calls.len());

        for call in calls {
            if cancel.is_cancelled() {
                tracing::debug!("cancellation observed, skipping remaining tool calls");
                break;
            }

            executions.push(self.execute_one(call).await);
        }

        executions
    }

    async fn execute_one(&self, call: &StructuredToolCall) -> ToolExecution {
        let mut execution = ToolExecution::start(&call.tool_name);

        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.recognizes(&call.tool_name));

        match resolver {
            Some(resolver) => {
                tracing::debug!(
                    tool = %call.tool_name,
                    resolver = resolver.name(),
                    "executing tool"
                );
                match resolver.invoke(&call.tool_name, &call.arguments).await {
                    Ok(result) => execution.complete(render_result(&result)),
                    Err(e) => {
                        tracing::warn!(tool = %call.tool_name, "tool failed: {}", e);
                        execution.fail(e.to_string());
                    }
                }
            }
            None => {
                execution.fail(format!("Tool '{}' not found", call.tool_name));
            }
        }

        execution
    }
}

/// Render a tool result as a human-readable string for the follow-up
/// prompt. Opaque representations must never leak into the conversation.
pub fn render_result(value: &Value) -> String {
    match value {
        Value::Null => "No result returned".to_string(),
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::run_status::ToolExecutionStatus;
    use serde_json::json;

    struct FixedResolver {
        label: &'static str,
        tools: Vec<&'static str>,
        result: Value,
    }

    #[async_trait]
    impl ToolResolver for FixedResolver {
        fn name(&self) -> &'static str {
            self.label
        }

        fn tool_names(&self) -> Vec<String> {
            self.tools.iter().map(|t| t.to_string()).collect()
        }

        fn recognizes(&self, tool_name: &str) -> bool {
            self.tools.contains(&tool_name)
        }

        async fn invoke(&self, _tool_name: &str, _arguments: &Value) -> anyhow::Result<Value> {
            if self.result == json!("boom") {
                anyhow::bail!("exploded");
            }
            Ok(self.result.clone())
        }
    }

    fn call(name: &str) -> StructuredToolCall {
        StructuredToolCall {
            tool_name: name.to_string(),
            arguments: json!({}),
            reasoning: String::new(),
        }
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(vec![
            Arc::new(FixedResolver {
                label: "first",
                tools: vec!["shared", "alpha"],
                result: json!("from first"),
            }),
            Arc::new(FixedResolver {
                label: "second",
                tools: vec!["shared", "beta"],
                result: json!("from second"),
            }),
        ])
    }

    #[tokio::test]
    async fn test_first_resolver_wins() {
        let cancel = CancellationToken::new();
        let executions = executor().execute_all(&[call("shared")], &cancel).await;
        assert_eq!(executions[0].summary, "from first");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failed_record() {
        let cancel = CancellationToken::new();
        let executions = executor().execute_all(&[call("nope")], &cancel).await;
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ToolExecutionStatus::Failed);
        assert_eq!(executions[0].summary, "Tool 'nope' not found");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_run() {
        let failing = ToolExecutor::new(vec![Arc::new(FixedResolver {
            label: "boom",
            tools: vec!["bad"],
            result: json!("boom"),
        })]);
        let executor = ToolExecutor::new(
            failing
                .resolvers
                .iter()
                .cloned()
                .chain(executor().resolvers.iter().cloned())
                .collect(),
        );

        let cancel = CancellationToken::new();
        let executions = executor
            .execute_all(&[call("bad"), call("alpha")], &cancel)
            .await;
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].status, ToolExecutionStatus::Failed);
        assert_eq!(executions[1].status, ToolExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executions = executor()
            .execute_all(&[call("alpha"), call("beta")], &cancel)
            .await;
        assert!(executions.is_empty());
    }

    #[test]
    fn test_render_result_rules() {
        assert_eq!(render_result(&Value::Null), "No result returned");
        assert_eq!(render_result(&json!("plain")), "plain");
        assert_eq!(render_result(&json!(42)), "42");
        assert_eq!(render_result(&json!(true)), "true");
        let rendered = render_result(&json!({"a": 1}));
        assert!(rendered.contains("\"a\": 1"));
    }
}
