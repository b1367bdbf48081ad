use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode_args, Tool, ToolContext, ToolName};
use crate::errors::{codes, Diagnostic};
use crate::model::GeneratedItem;

pub struct ScoreAnswerTool;

#[derive(Deserialize)]
struct Args {
    question_id: String,
    answer: String,
}

#[async_trait]
impl Tool for ScoreAnswerTool {
    fn name(&self) -> ToolName {
        ToolName::ScoreAnswer
    }

    fn description(&self) -> &str {
        "Grade a submitted answer against a persisted question; returns score, correctness and explanation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question_id": { "type": "string" },
                "answer": { "type": "string" }
            },
            "required": ["question_id", "answer"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let args: Args = decode_args(self.name(), args)?;
        let row = ctx.store.get_question(&args.question_id)?.ok_or_else(|| {
            anyhow::Error::new(
                Diagnostic::new(
                    codes::E_INVALID_INPUT,
                    format!("question '{}' not found", args.question_id),
                )
                .with_source("tools"),
            )
        })?;
        let item = GeneratedItem::from_row(&row)?;
        let result = ctx.scorer.grade(&item, &args.answer).await;
        Ok(serde_json::to_value(result)?)
    }
}
