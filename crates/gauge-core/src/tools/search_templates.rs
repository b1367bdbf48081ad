use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode_args, Tool, ToolContext, ToolName};

pub struct SearchTemplatesTool;

#[derive(Deserialize)]
struct Args {
    #[serde(default)]
    interests: Vec<String>,
    difficulty: u8,
    #[serde(default)]
    category: String,
}

#[async_trait]
impl Tool for SearchTemplatesTool {
    fn name(&self) -> ToolName {
        ToolName::SearchTemplates
    }

    fn description(&self) -> &str {
        "Search question templates by interests, difficulty and category; returns up to 10 ranked candidates."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "interests": { "type": "array", "items": { "type": "string" } },
                "difficulty": { "type": "integer", "minimum": 1, "maximum": 10 },
                "category": { "type": "string" }
            },
            "required": ["difficulty"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let args: Args = decode_args(self.name(), args)?;
        let hits = ctx
            .lookups
            .templates
            .search(&args.interests, args.difficulty, &args.category);
        let count = hits.len();
        Ok(json!({ "templates": hits, "count": count }))
    }
}
