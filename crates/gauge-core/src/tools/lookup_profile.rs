use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode_args, Tool, ToolContext, ToolName};

pub struct LookupProfileTool;

#[derive(Deserialize)]
struct Args {
    user_id: String,
}

#[async_trait]
impl Tool for LookupProfileTool {
    fn name(&self) -> ToolName {
        ToolName::LookupProfile
    }

    fn description(&self) -> &str {
        "Fetch the user's survey profile: self-assessed level, experience, interests, previous score. Returns safe defaults for unknown users."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "user_id": { "type": "string" } },
            "required": ["user_id"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let args: Args = decode_args(self.name(), args)?;
        let profile = ctx.lookups.profiles.profile_or_default(&args.user_id);
        Ok(serde_json::to_value(profile)?)
    }
}
