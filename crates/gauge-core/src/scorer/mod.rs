//! Grades submitted answers against the normalized schema.
//!
//! Selectable items are deterministic string comparisons; open-ended items
//! combine keyword evidence with a model score. Every path returns a usable
//! `ScoringResult` — model failure degrades to a fallback rather than
//! blocking the user-facing response.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::answer::AnswerKind;
use crate::model::{GeneratedItem, ScoringResult};
use crate::providers::llm::LlmClient;
use crate::storage::Store;
use crate::transcript::extract::{parse_lenient, ParseOutcome};

/// score >= 80 is correct; 70..=79 is partial credit (never correct).
pub const CORRECT_THRESHOLD: f64 = 80.0;
pub const PARTIAL_THRESHOLD: f64 = 70.0;
/// Default score reported when the model is unavailable.
pub const FALLBACK_SCORE: f64 = 50.0;

pub const FALLBACK_EXPLANATION: &str =
    "The grader could not produce a detailed explanation in time. Your answer \
     was recorded; review the question topic and compare with the reference answer.";

const MIN_EXPLANATION_CHARS: usize = 40;
const MAX_EXPLANATION_RETRIES: usize = 2;
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(15);

pub struct AnswerScorer {
    client: Option<Arc<dyn LlmClient>>,
    store: Store,
    model_timeout: Duration,
}

impl AnswerScorer {
    pub fn new(client: Option<Arc<dyn LlmClient>>, store: Store) -> Self {
        Self {
            client,
            store,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_model_timeout(mut self, model_timeout: Duration) -> Self {
        self.model_timeout = model_timeout;
        self
    }

    /// Always returns a result; degraded paths set `is_fallback`.
    pub async fn grade(&self, question: &GeneratedItem, submitted: &str) -> ScoringResult {
        match question.answer.kind() {
            AnswerKind::ExactMatch => self.grade_selectable(question, submitted).await,
            AnswerKind::KeywordMatch => self.grade_open_ended(question, submitted).await,
        }
    }

    /// Case-insensitive exact match; deterministic, no model call for the score.
    async fn grade_selectable(&self, question: &GeneratedItem, submitted: &str) -> ScoringResult {
        let expected = question.answer.correct_answer().unwrap_or_default();
        let is_correct = submitted.trim().eq_ignore_ascii_case(expected.trim());
        let score = if is_correct { 100.0 } else { 0.0 };
        let (explanation, explanation_fell_back) = self.explain(question, is_correct).await;
        ScoringResult {
            is_correct,
            score,
            explanation,
            keyword_matches: vec![],
            graded_at: Utc::now(),
            is_fallback: explanation_fell_back,
        }
    }

    async fn grade_open_ended(&self, question: &GeneratedItem, submitted: &str) -> ScoringResult {
        let keywords = question.answer.keywords().unwrap_or_default();
        let keyword_matches: Vec<String> = keywords
            .iter()
            .filter(|kw| {
                submitted
                    .to_lowercase()
                    .contains(&kw.to_lowercase())
            })
            .cloned()
            .collect();

        let semantic = self
            .semantic_score(question, submitted, &keyword_matches)
            .await;

        match semantic {
            Some(score) => {
                let is_correct = score >= CORRECT_THRESHOLD;
                let (explanation, explanation_fell_back) =
                    self.explain(question, is_correct).await;
                ScoringResult {
                    is_correct,
                    score,
                    explanation,
                    keyword_matches,
                    graded_at: Utc::now(),
                    is_fallback: explanation_fell_back,
                }
            }
            None => ScoringResult {
                is_correct: false,
                score: FALLBACK_SCORE,
                explanation: FALLBACK_EXPLANATION.to_string(),
                keyword_matches,
                graded_at: Utc::now(),
                is_fallback: true,
            },
        }
    }

    async fn semantic_score(
        &self,
        question: &GeneratedItem,
        submitted: &str,
        keyword_matches: &[String],
    ) -> Option<f64> {
        let client = self.client.as_ref()?;
        let prompt = grading_prompt(question, submitted, keyword_matches);
        let reply = match timeout(self.model_timeout, client.complete(&prompt, None)).await {
            Ok(Ok(resp)) => resp.text,
            Ok(Err(e)) => {
                tracing::warn!(question = %question.id, error = %e, "grading model failed; falling back");
                return None;
            }
            Err(_) => {
                tracing::warn!(question = %question.id, "grading model timed out; falling back");
                return None;
            }
        };
        parse_grade(&reply)
    }

    /// One explanation per (question, correctness); subsequent graders reuse
    /// the cached row without another model call.
    async fn explain(&self, question: &GeneratedItem, is_correct: bool) -> (String, bool) {
        match self.store.explain_get(&question.id, is_correct) {
            Ok(Some(cached)) => return (cached, false),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(question = %question.id, error = %e, "explain cache read failed");
            }
        }

        let Some(client) = &self.client else {
            return (FALLBACK_EXPLANATION.to_string(), true);
        };

        let prompt = explanation_prompt(question, is_correct);
        for attempt in 0..=MAX_EXPLANATION_RETRIES {
            let reply = match timeout(self.model_timeout, client.complete(&prompt, None)).await {
                Ok(Ok(resp)) => resp.text.trim().to_string(),
                Ok(Err(e)) => {
                    tracing::warn!(question = %question.id, error = %e, "explanation call failed");
                    return (FALLBACK_EXPLANATION.to_string(), true);
                }
                Err(_) => {
                    tracing::warn!(question = %question.id, "explanation call timed out");
                    return (FALLBACK_EXPLANATION.to_string(), true);
                }
            };

            if explanation_passes_gate(question, &reply) {
                if let Err(e) = self.store.explain_put(&question.id, is_correct, &reply) {
                    tracing::warn!(question = %question.id, error = %e, "explain cache write failed");
                }
                return (reply, false);
            }
            tracing::warn!(
                question = %question.id,
                attempt,
                "explanation failed quality gate; retrying"
            );
        }
        (FALLBACK_EXPLANATION.to_string(), true)
    }
}

fn grading_prompt(question: &GeneratedItem, submitted: &str, keyword_matches: &[String]) -> String {
    let keywords = question
        .answer
        .keywords()
        .map(|k| k.join(", "))
        .unwrap_or_default();
    format!(
        "Grade this short answer on a 0-100 scale.\nQuestion: {}\nExpected key \
         concepts: {}\nConcepts the answer already covers: {}\nSubmitted answer: {}\n\
         Reply with JSON: {{\"score\": <0-100>}}",
        question.stem,
        keywords,
        keyword_matches.join(", "),
        submitted
    )
}

fn explanation_prompt(question: &GeneratedItem, is_correct: bool) -> String {
    let reference = match question.answer.kind() {
        AnswerKind::ExactMatch => format!(
            "Correct answer: {}",
            question.answer.correct_answer().unwrap_or_default()
        ),
        AnswerKind::KeywordMatch => format!(
            "Key concepts: {}",
            question
                .answer
                .keywords()
                .map(|k| k.join(", "))
                .unwrap_or_default()
        ),
    };
    format!(
        "Explain the {} outcome for this assessment question in 2-4 sentences, \
         referencing the expected answer material explicitly.\nQuestion: {}\n{}\n\
         Author's note: {}",
        if is_correct { "correct" } else { "incorrect" },
        question.stem,
        reference,
        question.answer.explanation()
    )
}

/// Gate applied at generation time: long enough, and it references the
/// answer material (the correct answer, or enough of the keywords).
fn explanation_passes_gate(question: &GeneratedItem, explanation: &str) -> bool {
    if explanation.chars().count() < MIN_EXPLANATION_CHARS {
        return false;
    }
    let lower = explanation.to_lowercase();
    match question.answer.kind() {
        AnswerKind::ExactMatch => {
            let ans = question.answer.correct_answer().unwrap_or_default();
            lower.contains(&ans.to_lowercase())
        }
        AnswerKind::KeywordMatch => {
            let keywords = question.answer.keywords().unwrap_or_default();
            let required = keywords.len().min(2);
            let found = keywords
                .iter()
                .filter(|kw| lower.contains(&kw.to_lowercase()))
                .count();
            found >= required
        }
    }
}

/// Accepts `{"score": 88}`, a bare number, or a 0-1 scale.
fn parse_grade(reply: &str) -> Option<f64> {
    let (payload, outcome) = parse_lenient(reply);
    let raw = match (payload, outcome) {
        (Some(v), ParseOutcome::Full | ParseOutcome::Partial) => {
            v.get("score").and_then(|s| s.as_f64())
        }
        _ => reply.trim().parse::<f64>().ok(),
    }?;
    let score = if raw <= 1.0 { raw * 100.0 } else { raw };
    Some(score.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::NormalizedAnswerSchema;
    use crate::model::ItemType;
    use crate::providers::llm::fake::FakeClient;

    fn store() -> Store {
        let s = Store::open_in_memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    fn mcq_question() -> GeneratedItem {
        GeneratedItem::new(
            "q-mcq",
            "Which smart pointer provides shared ownership?",
            ItemType::MultipleChoice,
            Some(vec!["Box".into(), "Rc".into(), "Cell".into(), "RefCell".into()]),
            NormalizedAnswerSchema::exact_match("Rc", "Rc counts references", "test").unwrap(),
            4,
            vec!["rust".into()],
            "r1",
        )
        .unwrap()
    }

    fn open_question() -> GeneratedItem {
        GeneratedItem::new(
            "q-open",
            "Describe how ownership prevents data races.",
            ItemType::ShortAnswer,
            None,
            NormalizedAnswerSchema::keyword_match(
                vec!["ownership".into(), "borrow".into(), "mutable".into()],
                "one mutable reference xor many shared",
                "test",
            )
            .unwrap(),
            6,
            vec!["rust".into()],
            "r1",
        )
        .unwrap()
    }

    const GOOD_EXPLANATION: &str =
        "Rc provides shared ownership by counting references at runtime, unlike Box which is unique.";

    #[tokio::test]
    async fn test_selectable_exact_match_case_insensitive() {
        let client = Arc::new(FakeClient::new(vec![GOOD_EXPLANATION]));
        let scorer = AnswerScorer::new(Some(client), store());
        let result = scorer.grade(&mcq_question(), "  rc ").await;
        assert!(result.is_correct);
        assert_eq!(result.score, 100.0);
        assert!(!result.is_fallback);
    }

    #[tokio::test]
    async fn test_selectable_mismatch_scores_zero() {
        let client = Arc::new(FakeClient::new(vec![GOOD_EXPLANATION]));
        let scorer = AnswerScorer::new(Some(client), store());
        let result = scorer.grade(&mcq_question(), "Box").await;
        assert!(!result.is_correct);
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn test_open_ended_thresholds() {
        for (model_score, expect_correct, expect_score) in [
            (85.0, true, 85.0),
            (80.0, true, 80.0),
            (75.0, false, 75.0),
            (70.0, false, 70.0),
            (60.0, false, 60.0),
        ] {
            let client = Arc::new(FakeClient::new(vec![
                format!(r#"{{"score": {}}}"#, model_score),
                "Ownership and borrow rules allow one mutable alias, preventing races."
                    .to_string(),
            ]));
            let scorer = AnswerScorer::new(Some(client), store());
            let result = scorer
                .grade(&open_question(), "ownership restricts mutable borrows")
                .await;
            assert_eq!(result.is_correct, expect_correct, "score {}", model_score);
            assert_eq!(result.score, expect_score);
            // partial credit (70..80) keeps its score but is not correct
            if (PARTIAL_THRESHOLD..CORRECT_THRESHOLD).contains(&model_score) {
                assert!(!result.is_correct);
                assert!(result.score > 0.0);
            }
        }
    }

    #[tokio::test]
    async fn test_keyword_matches_are_case_insensitive_substrings() {
        let client = Arc::new(FakeClient::new(vec![
            r#"{"score": 90}"#,
            "Ownership and borrow checking forbid a second mutable alias.",
        ]));
        let scorer = AnswerScorer::new(Some(client), store());
        let result = scorer
            .grade(&open_question(), "OWNERSHIP means only one MUTABLE borrow")
            .await;
        assert_eq!(result.keyword_matches.len(), 3); // ownership, borrow (in "borrow"), mutable
    }

    #[tokio::test]
    async fn test_model_timeout_falls_back() {
        let client = Arc::new(
            FakeClient::new(vec![r#"{"score": 95}"#]).with_delay(Duration::from_millis(200)),
        );
        let scorer = AnswerScorer::new(Some(client), store())
            .with_model_timeout(Duration::from_millis(20));
        let result = scorer.grade(&open_question(), "ownership").await;
        assert!(result.is_fallback);
        assert_eq!(result.score, FALLBACK_SCORE);
        assert!(!result.is_correct);
        assert_eq!(result.explanation, FALLBACK_EXPLANATION);
    }

    #[tokio::test]
    async fn test_explanation_cached_per_correctness() {
        let client = Arc::new(FakeClient::new(vec![GOOD_EXPLANATION]));
        let store = store();
        let scorer = AnswerScorer::new(Some(client.clone()), store.clone());

        let first = scorer.grade(&mcq_question(), "Rc").await;
        assert_eq!(first.explanation, GOOD_EXPLANATION);
        let calls_after_first = client.calls_made();

        // same (question, correctness): served from cache, no extra call
        let second = scorer.grade(&mcq_question(), "rc").await;
        assert_eq!(second.explanation, GOOD_EXPLANATION);
        assert_eq!(client.calls_made(), calls_after_first);
    }

    #[tokio::test]
    async fn test_explanation_quality_gate_retries() {
        // first two replies too short, third passes
        let client = Arc::new(FakeClient::new(vec![
            "too short",
            "also short",
            GOOD_EXPLANATION,
        ]));
        let scorer = AnswerScorer::new(Some(client.clone()), store());
        let result = scorer.grade(&mcq_question(), "Rc").await;
        assert_eq!(result.explanation, GOOD_EXPLANATION);
        assert!(!result.is_fallback);
        assert_eq!(client.calls_made(), 3);
    }

    #[tokio::test]
    async fn test_explanation_gate_requires_reference_items() {
        // long enough but never mentions "Rc": fails gate every attempt
        let vague = "This answer concerns smart pointers and how they manage memory in general.";
        let client = Arc::new(FakeClient::new(vec![vague]));
        let scorer = AnswerScorer::new(Some(client), store());
        let result = scorer.grade(&mcq_question(), "Rc").await;
        assert!(result.is_fallback);
        assert_eq!(result.explanation, FALLBACK_EXPLANATION);
    }

    #[test]
    fn test_parse_grade_variants() {
        assert_eq!(parse_grade(r#"{"score": 88}"#), Some(88.0));
        assert_eq!(parse_grade("0.9"), Some(90.0));
        assert_eq!(parse_grade("72"), Some(72.0));
        assert_eq!(parse_grade("140"), Some(100.0));
        assert_eq!(parse_grade("nope"), None);
    }
}
