//! Follow-up prompt construction
//!
//! After a tool cycle, the results are folded back into the conversation
//! as a deterministic prompt so the model can answer using them.

use crate::agent::run_status::ToolExecution;

/// Build the prompt that folds tool results back to the model.
pub fn build_followup_prompt(
    original_request: &str,
    reasoning: &str,
    executions: &[ToolExecution],
) -> String {
    let mut prompt = String::new();

    prompt.push_str("Original request:\n");
    prompt.push_str(original_request);
    prompt.push_str("\n\n");

    if !reasoning.trim().is_empty() {
        prompt.push_str("Your reasoning was:\n");
        prompt.push_str(reasoning);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Tool results:\n");
    for execution in executions {
        let marker = if execution.succeeded() { "✅" } else { "❌" };
        prompt.push_str(&format!(
            "{} {}:\n{}\n\n",
            marker, execution.tool_name, execution.summary
        ));
    }

    prompt.push_str(
        "Answer the original request using these results. \
         If a tool failed, work with what succeeded or say what is missing. \
         Respond in plain language; do not emit the JSON tool-call block again.",
    );

    prompt
}
