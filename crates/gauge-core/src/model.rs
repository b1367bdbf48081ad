use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::NormalizedAnswerSchema;
use crate::errors::{codes, Diagnostic};

/// Hard cap on stem length; longer stems are rejected at construction,
/// not merely penalized by the quality rules.
pub const MAX_STEM_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl ItemType {
    /// Selectable items are graded by exact match; short answers by keywords.
    pub fn is_selectable(&self) -> bool {
        matches!(self, ItemType::MultipleChoice | ItemType::TrueFalse)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multiple_choice" => Some(ItemType::MultipleChoice),
            "true_false" => Some(ItemType::TrueFalse),
            "short_answer" => Some(ItemType::ShortAnswer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::MultipleChoice => "multiple_choice",
            ItemType::TrueFalse => "true_false",
            ItemType::ShortAnswer => "short_answer",
        }
    }
}

/// A generated question candidate. Constructed from extracted agent output,
/// then quality-gated before persistence. Immutable after save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedItem {
    pub id: String,
    pub stem: String,
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    pub answer: NormalizedAnswerSchema,
    pub difficulty: u8,
    #[serde(default)]
    pub categories: Vec<String>,
    pub round: String,
}

impl GeneratedItem {
    /// Validates hard invariants only. Structural quality (choice count,
    /// membership, duplicates) is the validator's job: a candidate may be
    /// constructed in violation of those so it can be scored and rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        stem: impl Into<String>,
        item_type: ItemType,
        choices: Option<Vec<String>>,
        answer: NormalizedAnswerSchema,
        difficulty: u8,
        categories: Vec<String>,
        round: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let stem = stem.into();
        if stem.trim().is_empty() {
            return Err(anyhow::Error::new(
                Diagnostic::new(codes::E_INVALID_INPUT, "item stem must be non-empty")
                    .with_source("model"),
            ));
        }
        if stem.chars().count() > MAX_STEM_CHARS {
            return Err(anyhow::Error::new(
                Diagnostic::new(
                    codes::E_INVALID_INPUT,
                    format!("item stem exceeds {} chars", MAX_STEM_CHARS),
                )
                .with_source("model"),
            ));
        }
        if !(1..=10).contains(&difficulty) {
            return Err(anyhow::Error::new(
                Diagnostic::new(
                    codes::E_INVALID_INPUT,
                    format!("difficulty {} outside 1..=10", difficulty),
                )
                .with_source("model"),
            ));
        }
        Ok(Self {
            id: id.into(),
            stem,
            item_type,
            choices,
            answer,
            difficulty,
            categories,
            round: round.into(),
        })
    }
}

impl GeneratedItem {
    /// Rebuild a typed item from its stored row; the persisted answer payload
    /// goes back through the normalizer.
    pub fn from_row(row: &crate::storage::rows::QuestionRow) -> anyhow::Result<Self> {
        let item_type = ItemType::parse(&row.item_type).ok_or_else(|| {
            anyhow::Error::new(
                Diagnostic::new(
                    codes::E_INVALID_INPUT,
                    format!("unknown item type '{}'", row.item_type),
                )
                .with_source("model"),
            )
        })?;
        let answer = crate::answer::normalize(&row.answer_schema)?;
        Self::new(
            row.id.clone(),
            row.stem.clone(),
            item_type,
            row.choices.clone(),
            answer,
            row.difficulty,
            if row.category.is_empty() {
                vec![]
            } else {
                row.category.split(',').map(String::from).collect()
            },
            row.round.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Pass,
    Revise,
    Reject,
}

impl Recommendation {
    /// Threshold table: >=0.85 pass, [0.70, 0.85) revise, <0.70 reject.
    pub fn from_score(final_score: f64) -> Self {
        if final_score >= 0.85 {
            Recommendation::Pass
        } else if final_score >= 0.70 {
            Recommendation::Revise
        } else {
            Recommendation::Reject
        }
    }
}

/// Two-stage quality verdict for one candidate item. Not persisted;
/// consumed immediately by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub semantic_score: f64,
    pub rule_score: f64,
    pub final_score: f64,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ValidationResult {
    pub fn combine(semantic_score: f64, rule_score: f64, issues: Vec<String>) -> Self {
        let final_score = semantic_score.min(rule_score);
        Self {
            semantic_score,
            rule_score,
            final_score,
            recommendation: Recommendation::from_score(final_score),
            issues,
        }
    }
}

/// Outcome of grading one submitted answer.
///
/// `is_correct` is strictly `score >= 80`; 70..=79 is partial credit and is
/// never surfaced as correct to adaptive-difficulty consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    pub is_correct: bool,
    pub score: f64,
    pub explanation: String,
    #[serde(default)]
    pub keyword_matches: Vec<String>,
    pub graded_at: DateTime<Utc>,
    #[serde(default)]
    pub is_fallback: bool,
}

/// Raw model reply plus provenance, shared by every provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub cached: bool,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::NormalizedAnswerSchema;

    fn schema() -> NormalizedAnswerSchema {
        NormalizedAnswerSchema::exact_match("B", "because", "test").unwrap()
    }

    #[test]
    fn test_item_rejects_empty_stem() {
        let err = GeneratedItem::new(
            "q1",
            "   ",
            ItemType::TrueFalse,
            None,
            schema(),
            5,
            vec![],
            "r1",
        )
        .unwrap_err();
        let diag = crate::errors::try_map_error(&err).unwrap();
        assert_eq!(diag.code, codes::E_INVALID_INPUT);
    }

    #[test]
    fn test_item_rejects_oversized_stem() {
        let stem = "x".repeat(MAX_STEM_CHARS + 1);
        assert!(GeneratedItem::new(
            "q1",
            stem,
            ItemType::ShortAnswer,
            None,
            schema(),
            5,
            vec![],
            "r1"
        )
        .is_err());
    }

    #[test]
    fn test_item_rejects_difficulty_out_of_range() {
        assert!(GeneratedItem::new(
            "q1",
            "ok",
            ItemType::ShortAnswer,
            None,
            schema(),
            11,
            vec![],
            "r1"
        )
        .is_err());
    }

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(Recommendation::from_score(0.85), Recommendation::Pass);
        assert_eq!(Recommendation::from_score(0.92), Recommendation::Pass);
        assert_eq!(Recommendation::from_score(0.70), Recommendation::Revise);
        assert_eq!(Recommendation::from_score(0.849), Recommendation::Revise);
        assert_eq!(Recommendation::from_score(0.699), Recommendation::Reject);
    }

    #[test]
    fn test_final_score_is_min_of_components() {
        let v = ValidationResult::combine(0.9, 0.6, vec!["choice count".into()]);
        assert_eq!(v.final_score, 0.6);
        assert_eq!(v.recommendation, Recommendation::Reject);

        let v = ValidationResult::combine(0.75, 0.95, vec![]);
        assert_eq!(v.final_score, 0.75);
        assert_eq!(v.recommendation, Recommendation::Revise);
    }
}
