//! Bounded Thought -> Action -> Observation loop.
//!
//! Each step the model either names a registered tool (invoked under its own
//! timeout, with the observation written back) or produces the terminal
//! answer. Tool failures become observations so the model can correct
//! itself; only model timeout and step exhaustion abort the run.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use super::prompt;
use crate::errors::{codes, Diagnostic};
use crate::providers::llm::LlmClient;
use crate::tools::{ToolContext, ToolName, ToolRegistry};
use crate::transcript::extract::{parse_lenient, ParseOutcome};
use crate::transcript::{ToolCallRecord, Transcript};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_steps: usize,
    pub tool_timeout: Duration,
    pub model_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            tool_timeout: Duration::from_secs(15),
            model_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct LoopOutcome {
    pub transcript: Transcript,
    pub records: Vec<ToolCallRecord>,
    pub terminal: Option<String>,
    pub steps_used: usize,
}

enum StepAction {
    ToolCall { name: String, args: Value },
    Final(String),
}

/// A step is a tool call iff it contains a JSON object with a string "tool"
/// field; anything else is the final answer.
fn parse_step(text: &str) -> StepAction {
    let (payload, outcome) = parse_lenient(text);
    if let (Some(v), ParseOutcome::Full | ParseOutcome::Partial) = (payload, outcome) {
        if let Some(name) = v.get("tool").and_then(|t| t.as_str()) {
            let args = v.get("args").cloned().unwrap_or(Value::Object(Default::default()));
            return StepAction::ToolCall {
                name: name.to_string(),
                args,
            };
        }
    }
    StepAction::Final(text.trim().to_string())
}

pub struct AgentLoop {
    client: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(client: Arc<dyn LlmClient>, registry: ToolRegistry, config: LoopConfig) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    pub async fn run(&self, ctx: &ToolContext, goal: &str) -> anyhow::Result<LoopOutcome> {
        if goal.trim().is_empty() {
            return Err(Diagnostic::new(codes::E_INVALID_INPUT, "empty goal")
                .with_source("agent")
                .into());
        }

        let system = prompt::system_prompt(&self.registry);
        let mut transcript = Transcript::new();
        let mut records: Vec<ToolCallRecord> = Vec::new();
        transcript.push_user(goal);

        for step in 0..self.config.max_steps {
            let turn = prompt::turn_prompt(&system, &transcript);
            let reply = match timeout(self.config.model_timeout, self.client.complete(&turn, None))
                .await
            {
                Ok(Ok(resp)) => resp.text,
                Ok(Err(e)) => {
                    return Err(anyhow::Error::new(
                        Diagnostic::new(codes::E_MODEL_TIMEOUT, format!("model call failed: {}", e))
                            .with_source("agent")
                            .with_context(serde_json::json!({ "step": step })),
                    ));
                }
                Err(_) => {
                    return Err(anyhow::Error::new(
                        Diagnostic::new(
                            codes::E_MODEL_TIMEOUT,
                            format!(
                                "model call exceeded {}s",
                                self.config.model_timeout.as_secs()
                            ),
                        )
                        .with_source("agent")
                        .with_context(serde_json::json!({ "step": step })),
                    ));
                }
            };

            transcript.push_reasoning(reply.clone());

            match parse_step(&reply) {
                StepAction::Final(text) => {
                    tracing::debug!(step, "loop terminated with final answer");
                    transcript.push_final(text.clone());
                    return Ok(LoopOutcome {
                        transcript,
                        records,
                        terminal: Some(text),
                        steps_used: step + 1,
                    });
                }
                StepAction::ToolCall { name, args } => {
                    let args_raw = args.to_string();
                    let (output, success) = self.invoke_tool(ctx, &name, args).await;
                    tracing::debug!(step, tool = %name, success, "tool invoked");
                    records.push(ToolCallRecord {
                        index: records.len(),
                        tool: name.clone(),
                        raw_args: args_raw.clone(),
                        raw_output: output.clone(),
                        success,
                    });
                    transcript.push_tool(name, args_raw, output, success);
                }
            }
        }

        Err(anyhow::Error::new(
            Diagnostic::new(
                codes::E_LOOP_EXHAUSTED,
                format!("no terminal answer after {} steps", self.config.max_steps),
            )
            .with_source("agent")
            .with_fix_step("raise max_steps or simplify the goal"),
        ))
    }

    /// Never errors: every failure mode is folded into the observation text
    /// so the loop can recover.
    async fn invoke_tool(&self, ctx: &ToolContext, name: &str, args: Value) -> (String, bool) {
        let tool_name = match ToolName::from_str(name) {
            Ok(t) => t,
            Err(unknown) => {
                let mut msg = format!("Error: unknown tool '{}'.", name);
                if let Some(hint) = unknown.suggestion() {
                    msg.push_str(&format!(" Did you mean '{}'?", hint));
                }
                msg.push_str(&format!(" Available: {}", self.registry.names().join(", ")));
                return (msg, false);
            }
        };
        let Some(tool) = self.registry.get(tool_name) else {
            return (
                format!("Error: tool '{}' is not registered in this run", name),
                false,
            );
        };

        match timeout(self.config.tool_timeout, tool.invoke(ctx, args)).await {
            Ok(Ok(value)) => (value.to_string(), true),
            Ok(Err(e)) => (format!("Error: {}", e), false),
            Err(_) => (
                format!(
                    "Error: tool '{}' timed out after {}s",
                    name,
                    self.config.tool_timeout.as_secs()
                ),
                false,
            ),
        }
    }
}
