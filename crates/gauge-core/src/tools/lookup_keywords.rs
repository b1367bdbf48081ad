use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode_args, Tool, ToolContext, ToolName};

pub struct LookupKeywordsTool;

#[derive(Deserialize)]
struct Args {
    difficulty: u8,
    category: String,
}

#[async_trait]
impl Tool for LookupKeywordsTool {
    fn name(&self) -> ToolName {
        ToolName::LookupKeywords
    }

    fn description(&self) -> &str {
        "Look up grading keywords appropriate for a difficulty level within a category."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "difficulty": { "type": "integer", "minimum": 1, "maximum": 10 },
                "category": { "type": "string" }
            },
            "required": ["difficulty", "category"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let args: Args = decode_args(self.name(), args)?;
        let keywords = ctx
            .lookups
            .keywords
            .keywords_for(args.difficulty, &args.category);
        Ok(json!({ "keywords": keywords }))
    }
}
