//! Integration tests for the structured tool-call protocol: parsing,
//! resolver-chain execution and follow-up prompt construction.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use aura::agent::run_status::ToolExecutionStatus;
use aura::protocol::{self, build_followup_prompt, StructuredToolCall, ToolCallDirective, ToolExecutor};
use aura::tools::{BuiltinToolSet, ExternalTool, NamespacedToolSet, UserToolSet};

fn full_chain() -> ToolExecutor {
    struct Upper;

    #[async_trait::async_trait]
    impl ExternalTool for Upper {
        async fn call(&self, arguments: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
            let text = arguments
                .get("text")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("");
            Ok(json!(text.to_uppercase()))
        }
    }

    let mut external = NamespacedToolSet::new();
    external.register("mcp_text_upper", Arc::new(Upper)).unwrap();

    let mut user = UserToolSet::new();
    user.register("reverse", "reverse a string", |args| {
        let text = args
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        Ok(json!(text.chars().rev().collect::<String>()))
    });

    ToolExecutor::new(vec![
        Arc::new(external),
        Arc::new(BuiltinToolSet::new()),
        Arc::new(user),
    ])
}

fn call(name: &str, arguments: serde_json::Value) -> StructuredToolCall {
    StructuredToolCall {
        tool_name: name.to_string(),
        arguments,
        reasoning: String::new(),
    }
}

#[tokio::test]
async fn executes_across_all_three_resolvers() {
    let executor = full_chain();
    let cancel = CancellationToken::new();

    let calls = vec![
        call("mcp_text_upper", json!({"text": "hey"})),
        call("calculator", json!({"expression": "6*7"})),
        call("reverse", json!({"text": "abc"})),
    ];

    let executions = executor.execute_all(&calls, &cancel).await;

    assert_eq!(executions.len(), 3);
    assert!(executions.iter().all(|e| e.succeeded()));
    assert_eq!(executions[0].summary, "HEY");
    assert!(executions[1].summary.contains("42"));
    assert_eq!(executions[2].summary, "cba");
    // Order matches the request array
    assert_eq!(executions[0].tool_name, "mcp_text_upper");
    assert_eq!(executions[2].tool_name, "reverse");
}

#[tokio::test]
async fn unknown_tool_becomes_visible_failure() {
    let executor = full_chain();
    let cancel = CancellationToken::new();

    let executions = executor
        .execute_all(&[call("no_such_tool", json!({}))], &cancel)
        .await;

    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ToolExecutionStatus::Failed);
    assert_eq!(executions[0].summary, "Tool 'no_such_tool' not found");

    // The failure is fold-back material, not an abort
    let prompt = build_followup_prompt("do something", "", &executions);
    assert!(prompt.contains("❌ no_such_tool"));
}

#[tokio::test]
async fn parse_execute_followup_cycle() {
    let text = "Let me compute.\n```json\n{\"reasoning\":\"math needed\",\"toolCalls\":[{\"toolName\":\"calculator\",\"arguments\":{\"expression\":\"2+2\"}}],\"needsToolExecution\":true}\n```";

    let parsed = protocol::parse(text);
    assert!(parsed.needs_execution);
    assert_eq!(parsed.cleaned_text, "Let me compute.");

    let executor = full_chain();
    let cancel = CancellationToken::new();
    let executions = executor.execute_all(&parsed.tool_calls, &cancel).await;
    assert!(executions[0].succeeded());

    let followup = build_followup_prompt("what is 2+2?", &parsed.reasoning, &executions);
    assert!(followup.contains("what is 2+2?"));
    assert!(followup.contains("math needed"));
    assert!(followup.contains("✅ calculator"));
}

#[test]
fn serialize_parse_roundtrip_equivalence() {
    let cases = vec![
        ToolCallDirective {
            reasoning: String::new(),
            tool_calls: vec![call("ls", json!({}))],
            needs_tool_execution: true,
        },
        ToolCallDirective {
            reasoning: "two calls".to_string(),
            tool_calls: vec![
                call("a", json!({"k": "v", "n": 3})),
                call("b", json!({"nested": {"deep": [1, 2, 3]}})),
            ],
            needs_tool_execution: true,
        },
    ];

    for directive in cases {
        let parsed = protocol::parse(&protocol::serialize(&directive));
        assert_eq!(parsed.tool_calls, directive.tool_calls);
        assert_eq!(parsed.reasoning, directive.reasoning);
        assert!(parsed.needs_execution);
    }
}

#[test]
fn malformed_directive_means_no_tool_use() {
    let cases = [
        "no json at all",
        "```json\nnot json\n```",
        "```json\n[1, 2, 3]\n```",
        "```json\n{\"toolCalls\": \"not an array\"}\n```",
    ];

    for text in cases {
        let parsed = protocol::parse(text);
        assert!(!parsed.needs_execution, "case: {}", text);
        assert!(parsed.tool_calls.is_empty(), "case: {}", text);
    }
}
