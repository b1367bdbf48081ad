//! Role-tagged message history produced by one reasoning-loop run.

use serde::{Deserialize, Serialize};

pub mod extract;

pub use extract::{extract, ExtractedCall, ExtractionReport, ParseOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Reasoning,
    Tool,
    Final,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    /// Tool name; set for `Role::Tool` messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Raw argument payload the tool was invoked with, as emitted by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_raw: Option<String>,
    /// Whether the invocation succeeded; set for `Role::Tool` messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// One record per tool invocation. Created by the orchestrator per iteration,
/// or reconstructed from a persisted transcript by the extractor. Immutable
/// once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub index: usize,
    pub tool: String,
    pub raw_args: String,
    pub raw_output: String,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub messages: Vec<TranscriptMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(TranscriptMessage {
            role: Role::User,
            content: content.into(),
            tool: None,
            args_raw: None,
            success: None,
        });
    }

    pub fn push_reasoning(&mut self, content: impl Into<String>) {
        self.messages.push(TranscriptMessage {
            role: Role::Reasoning,
            content: content.into(),
            tool: None,
            args_raw: None,
            success: None,
        });
    }

    pub fn push_tool(
        &mut self,
        tool: impl Into<String>,
        args_raw: impl Into<String>,
        output: impl Into<String>,
        success: bool,
    ) {
        self.messages.push(TranscriptMessage {
            role: Role::Tool,
            content: output.into(),
            tool: Some(tool.into()),
            args_raw: Some(args_raw.into()),
            success: Some(success),
        });
    }

    pub fn push_final(&mut self, content: impl Into<String>) {
        self.messages.push(TranscriptMessage {
            role: Role::Final,
            content: content.into(),
            tool: None,
            args_raw: None,
            success: None,
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
