//! The fixed set of operations the reasoning loop may invoke.
//!
//! Tool identifiers are a closed enum: the model picks a name at runtime,
//! and an unknown name is a recoverable observation for the loop, never a
//! crash. The registry is an explicit map built at startup.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::providers::lookup::LookupProviders;
use crate::scorer::AnswerScorer;
use crate::storage::{RetryQueue, Store};
use crate::validator::QualityValidator;

pub mod lookup_keywords;
pub mod lookup_profile;
pub mod save_question;
pub mod score_answer;
pub mod search_templates;
pub mod validate_questions;

pub use lookup_keywords::LookupKeywordsTool;
pub use lookup_profile::LookupProfileTool;
pub use save_question::SaveQuestionTool;
pub use score_answer::ScoreAnswerTool;
pub use search_templates::SearchTemplatesTool;
pub use validate_questions::ValidateQuestionsTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    LookupProfile,
    SearchTemplates,
    LookupKeywords,
    ValidateQuestions,
    SaveQuestion,
    ScoreAnswer,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::LookupProfile,
        ToolName::SearchTemplates,
        ToolName::LookupKeywords,
        ToolName::ValidateQuestions,
        ToolName::SaveQuestion,
        ToolName::ScoreAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::LookupProfile => "lookup_profile",
            ToolName::SearchTemplates => "search_templates",
            ToolName::LookupKeywords => "lookup_keywords",
            ToolName::ValidateQuestions => "validate_questions",
            ToolName::SaveQuestion => "save_question",
            ToolName::ScoreAnswer => "score_answer",
        }
    }
}

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lookup_profile" => Ok(ToolName::LookupProfile),
            "search_templates" => Ok(ToolName::SearchTemplates),
            "lookup_keywords" => Ok(ToolName::LookupKeywords),
            "validate_questions" => Ok(ToolName::ValidateQuestions),
            "save_question" => Ok(ToolName::SaveQuestion),
            "score_answer" => Ok(ToolName::ScoreAnswer),
            _ => Err(UnknownTool(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownTool(pub String);

impl UnknownTool {
    /// Closest registered name, to steer the model's retry.
    pub fn suggestion(&self) -> Option<&'static str> {
        ToolName::ALL
            .iter()
            .map(|t| (t.as_str(), strsim::jaro_winkler(&self.0, t.as_str())))
            .filter(|(_, sim)| *sim > 0.75)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name)
    }
}

/// Shared handles the tools work against. Read-mostly; the retry queue is
/// scoped to the caller that built this context, not process-wide.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Store,
    pub lookups: LookupProviders,
    pub validator: Arc<QualityValidator>,
    pub scorer: Arc<AnswerScorer>,
    /// Round the current generation run writes into.
    pub round: String,
    pub retries: Arc<Mutex<RetryQueue>>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full built-in set, in the order the catalog lists them.
    pub fn with_builtin_tools() -> Self {
        let mut r = Self::new();
        r.register(LookupProfileTool);
        r.register(SearchTemplatesTool);
        r.register(LookupKeywordsTool);
        r.register(ValidateQuestionsTool);
        r.register(SaveQuestionTool);
        r.register(ScoreAnswerTool);
        r
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().map(|t| t.as_str()).collect();
        names.sort();
        names
    }

    /// Tool list rendered into the planner prompt.
    pub fn render_catalog(&self) -> Value {
        let entries: Vec<Value> = ToolName::ALL
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name().as_str(),
                    "description": tool.description(),
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect();
        Value::Array(entries)
    }
}

/// Decode typed tool arguments; malformed input is rejected before any
/// side effect.
pub fn decode_args<T: serde::de::DeserializeOwned>(tool: ToolName, args: Value) -> anyhow::Result<T> {
    serde_json::from_value(args).map_err(|e| {
        crate::errors::Diagnostic::new(
            crate::errors::codes::E_INVALID_INPUT,
            format!("{} arguments: {}", tool.as_str(), e),
        )
        .with_source("tools")
        .into()
    })
}
