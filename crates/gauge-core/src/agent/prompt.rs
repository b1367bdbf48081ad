//! Prompt assembly for the reasoning loop.

use crate::tools::ToolRegistry;
use crate::transcript::{Role, Transcript};

/// System preamble: the tool catalog plus the action format contract.
pub fn system_prompt(registry: &ToolRegistry) -> String {
    format!(
        "You are an assessment author. Work step by step: think, then either \
         call one tool or give your final answer.\n\n\
         Available tools:\n{}\n\n\
         To call a tool, reply with exactly one JSON object:\n\
         {{\"tool\": \"<name>\", \"args\": {{...}}}}\n\
         Any other reply is treated as your final answer.",
        serde_json::to_string_pretty(&registry.render_catalog()).unwrap_or_else(|_| "[]".into())
    )
}

/// Renders the run so far into one completion prompt. Observations follow
/// their tool call so the model can react to failures.
pub fn turn_prompt(system: &str, transcript: &Transcript) -> String {
    let mut out = String::with_capacity(system.len() + 256);
    out.push_str(system);
    out.push_str("\n\n");
    for msg in &transcript.messages {
        match msg.role {
            Role::User => {
                out.push_str("Goal: ");
                out.push_str(&msg.content);
                out.push('\n');
            }
            Role::Reasoning => {
                out.push_str("Thought: ");
                out.push_str(&msg.content);
                out.push('\n');
            }
            Role::Tool => {
                let tool = msg.tool.as_deref().unwrap_or("tool");
                out.push_str(&format!("Observation from {}: {}\n", tool, msg.content));
            }
            Role::Final => {}
        }
    }
    out.push_str("Thought:");
    out
}
