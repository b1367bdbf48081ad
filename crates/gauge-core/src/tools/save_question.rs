use async_trait::async_trait;
use serde_json::{json, Value};

use super::{decode_args, Tool, ToolContext, ToolName};
use crate::answer::normalize_for_item;
use crate::errors::{codes, Diagnostic};
use crate::model::{GeneratedItem, ItemType, Recommendation};
use crate::storage::WriteKind;

pub struct SaveQuestionTool;

#[derive(serde::Deserialize)]
struct Args {
    item: Value,
}

/// Builds a typed candidate from a raw item payload. The answer portion goes
/// through the type-aware normalizer so a stray field from the wrong producer
/// shape cannot survive into grading.
pub(crate) fn parse_candidate(payload: &Value, round: &str) -> anyhow::Result<GeneratedItem> {
    let stem = payload
        .get("question")
        .or_else(|| payload.get("stem"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("item payload missing 'question' stem"))?;

    let type_raw = payload
        .get("item_type")
        .or_else(|| payload.get("type"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("item payload missing 'item_type'"))?;
    let item_type = ItemType::parse(type_raw)
        .ok_or_else(|| invalid(&format!("unknown item type '{}'", type_raw)))?;

    let choices = payload
        .get("choices")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .map(|c| {
                    c.as_str()
                        .map(String::from)
                        .ok_or_else(|| invalid("choices must be strings"))
                })
                .collect::<anyhow::Result<Vec<String>>>()
        })
        .transpose()?;

    let answer = normalize_for_item(item_type, payload)?;

    let difficulty = payload
        .get("difficulty")
        .and_then(|v| v.as_u64())
        .unwrap_or(5) as u8;

    let categories = payload
        .get("category")
        .and_then(|v| v.as_str())
        .map(|c| vec![c.to_string()])
        .unwrap_or_default();

    let id = payload
        .get("id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    GeneratedItem::new(id, stem, item_type, choices, answer, difficulty, categories, round)
}

fn invalid(msg: &str) -> anyhow::Error {
    Diagnostic::new(codes::E_INVALID_INPUT, msg)
        .with_source("tools")
        .into()
}

#[async_trait]
impl Tool for SaveQuestionTool {
    fn name(&self) -> ToolName {
        ToolName::SaveQuestion
    }

    fn description(&self) -> &str {
        "Validate one generated question and persist it if it clears the quality gate. Returns the verdict; rejected items are not saved."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item": {
                    "type": "object",
                    "properties": {
                        "question": { "type": "string" },
                        "item_type": { "type": "string", "enum": ["multiple_choice", "true_false", "short_answer"] },
                        "choices": { "type": "array", "items": { "type": "string" } },
                        "correct_answer": { "type": "string" },
                        "keywords": { "type": "array", "items": { "type": "string" } },
                        "explanation": { "type": "string" },
                        "difficulty": { "type": "integer" },
                        "category": { "type": "string" }
                    },
                    "required": ["question", "item_type", "explanation"]
                }
            },
            "required": ["item"]
        })
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
        let args: Args = decode_args(self.name(), args)?;
        let item = parse_candidate(&args.item, &ctx.round)?;
        let verdict = ctx.validator.validate(&item).await;

        if verdict.recommendation == Recommendation::Reject {
            return Ok(json!({
                "saved": false,
                "id": item.id,
                "final_score": verdict.final_score,
                "recommendation": verdict.recommendation,
                "issues": verdict.issues,
            }));
        }

        let needs_revision = verdict.recommendation == Recommendation::Revise;
        if let Err(e) = ctx.store.insert_question(&item, needs_revision) {
            ctx.retries.lock().unwrap().push(
                WriteKind::Question,
                serde_json::to_value(&item).unwrap_or_default(),
                e.to_string(),
            );
            return Err(Diagnostic::new(
                codes::E_PERSIST_FAILED,
                format!("question '{}' not persisted: {}", item.id, e),
            )
            .with_source("tools")
            .with_fix_step("the write was queued; drain the retry queue out of band")
            .into());
        }

        Ok(json!({
            "saved": true,
            "id": item.id,
            "final_score": verdict.final_score,
            "recommendation": verdict.recommendation,
            "issues": verdict.issues,
        }))
    }
}
