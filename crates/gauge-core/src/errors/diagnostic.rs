use serde::{Deserialize, Serialize};

/// Stable error codes surfaced to callers and logs.
pub mod codes {
    pub const E_INVALID_INPUT: &str = "E_INVALID_INPUT";
    pub const E_MODEL_TIMEOUT: &str = "E_MODEL_TIMEOUT";
    pub const E_LOOP_EXHAUSTED: &str = "E_LOOP_EXHAUSTED";
    pub const E_TOOL_UNKNOWN: &str = "E_TOOL_UNKNOWN";
    pub const E_TOOL_FAILED: &str = "E_TOOL_FAILED";
    pub const E_PARSE_FAILED: &str = "E_PARSE_FAILED";
    pub const E_PERSIST_FAILED: &str = "E_PERSIST_FAILED";
    pub const E_SESSION_STATE: &str = "E_SESSION_STATE";
}

/// Structured, caller-facing error. Carries machine-readable context plus
/// actionable fix steps, so degraded paths stay debuggable without a stack trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: String,
    pub source: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub fix_steps: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: "error".to_string(),
            source: "gauge".to_string(),
            message: message.into(),
            context: serde_json::json!({}),
            fix_steps: vec![],
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_fix_step(mut self, step: impl Into<String>) -> Self {
        self.fix_steps.push(step.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        for step in &self.fix_steps {
            write!(f, "\n  fix: {}", step)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}
