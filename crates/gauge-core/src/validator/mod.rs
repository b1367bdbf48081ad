//! Two-stage quality gate for generated items.
//!
//! The rule score is a deterministic structural ceiling; the semantic score
//! is a model judgment that degrades to a neutral 0.5 on failure. Taking the
//! minimum means no structurally broken item can pass on a favorable
//! semantic opinion alone.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::model::{GeneratedItem, ItemType, ValidationResult};
use crate::providers::llm::LlmClient;
use crate::transcript::extract::{parse_lenient, ParseOutcome};

/// Soft stem limit; longer stems cost rule score but are not rejected here.
pub const RULE_MAX_STEM_CHARS: usize = 250;
/// Neutral semantic score used when the judge is unavailable.
pub const DEGRADED_SEMANTIC_SCORE: f64 = 0.5;

const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct QualityValidator {
    client: Option<Arc<dyn LlmClient>>,
    judge_timeout: Duration,
}

impl QualityValidator {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            client,
            judge_timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn with_judge_timeout(mut self, judge_timeout: Duration) -> Self {
        self.judge_timeout = judge_timeout;
        self
    }

    pub async fn validate(&self, item: &GeneratedItem) -> ValidationResult {
        let (rule_score, issues) = rule_score(item);
        let semantic_score = self.semantic_score(item).await;
        ValidationResult::combine(semantic_score, rule_score, issues)
    }

    /// Ordered in, ordered out, one-to-one. One item's judge failure only
    /// degrades that item's own semantic score.
    pub async fn validate_batch(&self, items: &[GeneratedItem]) -> Vec<ValidationResult> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.validate(item).await);
        }
        out
    }

    async fn semantic_score(&self, item: &GeneratedItem) -> f64 {
        let Some(client) = &self.client else {
            // no judge configured: the rule score is the only gate
            return 1.0;
        };
        let prompt = judge_prompt(item);
        let reply = match timeout(self.judge_timeout, client.complete(&prompt, None)).await {
            Ok(Ok(resp)) => resp.text,
            Ok(Err(e)) => {
                tracing::warn!(item = %item.id, error = %e, "semantic judge failed; degrading to neutral");
                return DEGRADED_SEMANTIC_SCORE;
            }
            Err(_) => {
                tracing::warn!(item = %item.id, "semantic judge timed out; degrading to neutral");
                return DEGRADED_SEMANTIC_SCORE;
            }
        };
        parse_judge_score(&reply).unwrap_or_else(|| {
            tracing::warn!(item = %item.id, "judge reply unparseable; degrading to neutral");
            DEGRADED_SEMANTIC_SCORE
        })
    }
}

fn judge_prompt(item: &GeneratedItem) -> String {
    let choices = item
        .choices
        .as_ref()
        .map(|c| format!("\nChoices: {}", c.join(" | ")))
        .unwrap_or_default();
    format!(
        "Rate this {} assessment question for clarity, appropriateness, factual \
         correctness and freedom from bias.\nQuestion: {}{}\nDifficulty: {}/10\n\
         Reply with JSON: {{\"score\": <0.0-1.0>}}",
        item.item_type.as_str(),
        item.stem,
        choices,
        item.difficulty
    )
}

/// Accepts `{"score": 0.9}`, a bare number, or a 0-100 scale.
fn parse_judge_score(reply: &str) -> Option<f64> {
    let (payload, outcome) = parse_lenient(reply);
    let raw = match (payload, outcome) {
        (Some(v), ParseOutcome::Full | ParseOutcome::Partial) => {
            v.get("score").and_then(|s| s.as_f64())
        }
        _ => reply.trim().parse::<f64>().ok(),
    }?;
    let score = if raw > 1.0 { raw / 100.0 } else { raw };
    Some(score.clamp(0.0, 1.0))
}

/// Deterministic structural checks. Each violation deducts from 1.0;
/// the result is clamped to [0, 1].
pub fn rule_score(item: &GeneratedItem) -> (f64, Vec<String>) {
    let mut score = 1.0_f64;
    let mut issues = Vec::new();

    if item.stem.chars().count() > RULE_MAX_STEM_CHARS {
        score -= 0.2;
        issues.push(format!("stem longer than {} chars", RULE_MAX_STEM_CHARS));
    }

    if item.item_type == ItemType::MultipleChoice {
        match &item.choices {
            Some(choices) if (4..=5).contains(&choices.len()) => {}
            Some(choices) => {
                score -= 0.2;
                issues.push(format!(
                    "multiple-choice needs 4-5 choices, found {}",
                    choices.len()
                ));
            }
            None => {
                score -= 0.2;
                issues.push("multiple-choice item has no choices".to_string());
            }
        }

        let correct_present = match (item.answer.correct_answer(), &item.choices) {
            (Some(ans), Some(choices)) => {
                choices.iter().any(|c| c.eq_ignore_ascii_case(ans))
            }
            _ => false,
        };
        if !correct_present {
            score -= 0.3;
            issues.push("correct value is not among the choices".to_string());
        }
    }

    if let Some(choices) = &item.choices {
        let mut seen = std::collections::HashSet::new();
        if choices
            .iter()
            .any(|c| !seen.insert(c.trim().to_ascii_lowercase()))
        {
            score -= 0.15;
            issues.push("duplicate choices".to_string());
        }
    }

    (score.clamp(0.0, 1.0), issues)
}
