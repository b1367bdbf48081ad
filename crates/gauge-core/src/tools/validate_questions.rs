use async_trait::async_trait;
use serde_json::{json, Value};

use super::save_question::parse_candidate;
use super::{decode_args, Tool, ToolContext, ToolName};

pub struct ValidateQuestionsTool;

#[derive(serde::Deserialize)]
struct Args {
    items: Vec<Value>,
}

#[async_trait]
impl Tool for ValidateQuestionsTool {
    fn name(&self) -> ToolName {
        ToolName::ValidateQuestions
    }

    fn description(&self) -> &str {
        "Score a batch of candidate questions against the quality gate without saving them. One result per item, in order."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": { "type": "array", "items": { "type": "object" } }
            },
            "required": ["items"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let args: Args = decode_args(self.name(), args)?;
        // one verdict per input, malformed items included: a bad candidate
        // gets an error entry, it does not sink its siblings
        let mut results = Vec::with_capacity(args.items.len());
        for payload in &args.items {
            match parse_candidate(payload, &ctx.round) {
                Ok(item) => {
                    let verdict = ctx.validator.validate(&item).await;
                    results.push(serde_json::to_value(verdict)?);
                }
                Err(e) => {
                    results.push(json!({ "error": e.to_string() }));
                }
            }
        }
        Ok(json!({ "results": results }))
    }
}
