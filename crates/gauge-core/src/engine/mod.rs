//! Wires the pipeline end to end: orchestrator -> extractor -> store for
//! round generation, and bounded fan-out for grading. Sessions and rounds
//! are independent; everything shared here is a read-mostly handle.

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::agent::AgentLoop;
use crate::config::EngineConfig;
use crate::model::{GeneratedItem, ScoringResult};
use crate::providers::llm::LlmClient;
use crate::providers::lookup::{LookupProviders, UserProfile};
use crate::scorer::AnswerScorer;
use crate::session::RoundId;
use crate::storage::rows::QuestionRow;
use crate::storage::{RetryQueue, Store};
use crate::tools::{ToolContext, ToolRegistry};
use crate::transcript::extract;
use crate::validator::QualityValidator;

pub struct RoundEngine {
    client: Arc<dyn LlmClient>,
    store: Store,
    lookups: LookupProviders,
    config: EngineConfig,
}

/// What one generation run produced, with its degraded-path counters and the
/// caller-scoped retry queue for failed writes.
#[derive(Debug)]
pub struct GenerationReport {
    pub questions: Vec<QuestionRow>,
    pub saved: usize,
    pub rejected: usize,
    pub parse_failures: usize,
    pub steps_used: usize,
    pub terminal: Option<serde_json::Value>,
    pub retries: RetryQueue,
}

/// Per-submission grading outcome; failures are captured alongside
/// successes instead of sinking the batch.
#[derive(Debug)]
pub struct GradeOutcome {
    pub question_id: String,
    pub result: Option<ScoringResult>,
    pub error: Option<String>,
}

impl RoundEngine {
    pub fn new(
        client: Arc<dyn LlmClient>,
        store: Store,
        lookups: LookupProviders,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            store,
            lookups,
            config,
        }
    }

    fn tool_context(&self, round: &RoundId) -> ToolContext {
        let judge_client = if self.config.judge.enabled {
            Some(self.client.clone())
        } else {
            None
        };
        // the judge must give up before the tool's own deadline, so its
        // degraded 0.5 score reaches the loop instead of a tool timeout
        let judge_timeout = std::cmp::max(
            self.config.tool_timeout().saturating_sub(std::time::Duration::from_secs(2)),
            std::time::Duration::from_secs(1),
        );
        ToolContext {
            store: self.store.clone(),
            lookups: self.lookups.clone(),
            validator: Arc::new(
                QualityValidator::new(judge_client).with_judge_timeout(judge_timeout),
            ),
            scorer: Arc::new(
                AnswerScorer::new(Some(self.client.clone()), self.store.clone())
                    .with_model_timeout(self.config.tool_timeout()),
            ),
            round: round.to_string(),
            retries: Arc::new(Mutex::new(RetryQueue::new())),
        }
    }

    /// Drives one generation round. The transcript is re-extracted after the
    /// loop so save failures, rejects and unparseable records are all counted
    /// without aborting the run.
    pub async fn generate_round(
        &self,
        user_id: &str,
        round: &RoundId,
    ) -> anyhow::Result<GenerationReport> {
        let ctx = self.tool_context(round);
        let profile = self.lookups.profiles.profile_or_default(user_id);
        let goal = goal_prompt(&profile, round);

        let agent = AgentLoop::new(
            self.client.clone(),
            ToolRegistry::with_builtin_tools(),
            self.config.loop_config(),
        );
        let outcome = agent.run(&ctx, &goal).await?;

        let report = extract(&outcome.transcript);
        let mut saved = 0usize;
        let mut rejected = 0usize;
        for payload in report.payloads_for("save_question") {
            match payload.get("saved").and_then(|v| v.as_bool()) {
                Some(true) => saved += 1,
                Some(false) => rejected += 1,
                None => {}
            }
        }

        let questions = self.store.questions_for_round(&round.to_string())?;
        let retries = std::mem::take(&mut *ctx.retries.lock().unwrap());
        if !retries.is_empty() {
            tracing::warn!(
                round = %round,
                pending = retries.len(),
                "generation finished with unpersisted writes"
            );
        }

        tracing::info!(
            round = %round,
            saved,
            rejected,
            parse_failures = report.parse_failures,
            steps = outcome.steps_used,
            "round generated"
        );

        Ok(GenerationReport {
            questions,
            saved,
            rejected,
            parse_failures: report.parse_failures,
            steps_used: outcome.steps_used,
            terminal: report.terminal,
            retries,
        })
    }

    /// Grades a batch of submissions in parallel, gathered by index. A slow
    /// or failing grade never blocks or corrupts its siblings.
    pub async fn grade_submissions(
        &self,
        session_id: &str,
        round: &RoundId,
        submissions: &[(String, String)],
    ) -> Vec<GradeOutcome> {
        let ctx = self.tool_context(round);
        let sem = Arc::new(Semaphore::new(self.config.parallel.max(1)));
        let mut handles = Vec::with_capacity(submissions.len());

        for (question_id, answer) in submissions.iter().cloned() {
            let sem = sem.clone();
            let store = self.store.clone();
            let scorer = ctx.scorer.clone();
            let session_id = session_id.to_string();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let row = store
                    .get_question(&question_id)?
                    .ok_or_else(|| anyhow::anyhow!("question '{}' not found", question_id))?;
                let item = GeneratedItem::from_row(&row)?;
                let result = scorer.grade(&item, &answer).await;
                store.set_answer_result(&session_id, &question_id, result.is_correct, result.score)?;
                anyhow::Ok(result)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (h, (question_id, _)) in handles.into_iter().zip(submissions.iter()) {
            let outcome = match h.await {
                Ok(Ok(result)) => GradeOutcome {
                    question_id: question_id.clone(),
                    result: Some(result),
                    error: None,
                },
                Ok(Err(e)) => GradeOutcome {
                    question_id: question_id.clone(),
                    result: None,
                    error: Some(e.to_string()),
                },
                Err(e) => GradeOutcome {
                    question_id: question_id.clone(),
                    result: None,
                    error: Some(format!("task error: {}", e)),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn goal_prompt(profile: &UserProfile, round: &RoundId) -> String {
    let interests = if profile.interests.is_empty() {
        "general programming".to_string()
    } else {
        profile.interests.join(", ")
    };
    let previous = profile
        .previous_score
        .map(|s| format!(" Their previous round scored {:.0}/100.", s))
        .unwrap_or_default();
    format!(
        "Generate 5 assessment questions for round {} of session {}. The user \
         self-rates as {} with {} years of experience; interests: {}.{} Look up \
         the profile and templates first, then save each question with the \
         save_question tool, and finish with a short summary.",
        round.round_number(),
        round.session_id(),
        profile.self_level,
        profile.experience_years,
        interests,
        previous
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::FakeClient;
    use crate::providers::lookup::{InMemoryKeywords, InMemoryProfiles, InMemoryTemplates};

    fn lookups() -> LookupProviders {
        LookupProviders {
            profiles: Arc::new(InMemoryProfiles::new().with_profile(UserProfile {
                user_id: "u1".into(),
                self_level: "intermediate".into(),
                experience_years: 3,
                interests: vec!["rust".into()],
                previous_score: Some(72.0),
            })),
            templates: Arc::new(InMemoryTemplates::default()),
            keywords: Arc::new(InMemoryKeywords::new()),
        }
    }

    fn save_action(id: &str) -> String {
        format!(
            r#"{{"tool": "save_question", "args": {{"item": {{
                "id": "{}",
                "question": "Which collection guarantees ordering by key?",
                "item_type": "multiple_choice",
                "choices": ["HashMap", "BTreeMap", "Vec", "HashSet"],
                "correct_answer": "BTreeMap",
                "explanation": "BTreeMap keeps keys sorted",
                "difficulty": 4,
                "category": "rust"
            }}}}}}"#,
            id
        )
    }

    #[tokio::test]
    async fn test_generate_round_saves_and_reports() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        store.init_schema()?;

        // loop action, judge score, loop action, judge score, terminal
        let client = Arc::new(FakeClient::new(vec![
            save_action("q-a"),
            r#"{"score": 0.9}"#.to_string(),
            save_action("q-b"),
            r#"{"score": 0.9}"#.to_string(),
            "Generated 2 questions.".to_string(),
        ]));

        let engine = RoundEngine::new(client, store.clone(), lookups(), EngineConfig::default());
        let round = RoundId::new("sess_u1", 1)?;
        let report = engine.generate_round("u1", &round).await?;

        assert_eq!(report.saved, 2);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.parse_failures, 0);
        assert_eq!(report.questions.len(), 2);
        assert!(report.retries.is_empty());
        assert_eq!(
            report.terminal,
            Some(serde_json::Value::String("Generated 2 questions.".into()))
        );
        assert!(store.get_question("q-a")?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_round_counts_rejects() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        store.init_schema()?;

        // structurally broken item (2 choices, correct missing) with a low
        // judge score: rejected, not saved
        let bad = r#"{"tool": "save_question", "args": {"item": {
            "question": "Pick one",
            "item_type": "multiple_choice",
            "choices": ["a", "a"],
            "correct_answer": "z",
            "explanation": "none",
            "difficulty": 3
        }}}"#;
        let client = Arc::new(FakeClient::new(vec![
            bad.to_string(),
            r#"{"score": 0.4}"#.to_string(),
            "done".to_string(),
        ]));

        let engine = RoundEngine::new(client, store.clone(), lookups(), EngineConfig::default());
        let round = RoundId::new("sess_u1", 1)?;
        let report = engine.generate_round("u1", &round).await?;

        assert_eq!(report.saved, 0);
        assert_eq!(report.rejected, 1);
        assert!(report.questions.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_grade_submissions_isolates_missing_question() -> anyhow::Result<()> {
        let store = Store::open_in_memory()?;
        store.init_schema()?;

        let answer = crate::answer::NormalizedAnswerSchema::exact_match(
            "BTreeMap",
            "sorted keys",
            "correct_key",
        )?;
        let item = GeneratedItem::new(
            "q1",
            "Which map keeps keys sorted?",
            crate::model::ItemType::MultipleChoice,
            Some(vec!["HashMap".into(), "BTreeMap".into(), "Vec".into(), "HashSet".into()]),
            answer,
            4,
            vec!["rust".into()],
            "sess_u1_1_x",
        )?;
        store.insert_question(&item, false)?;

        // explanation reply reused by the fake client for every call
        let client = Arc::new(FakeClient::new(vec![
            "BTreeMap stores entries sorted by key, so iteration order is deterministic.",
        ]));
        let mut config = EngineConfig::default();
        config.judge.enabled = false;
        let engine = RoundEngine::new(client, store.clone(), lookups(), config);
        let round = RoundId::new("sess_u1", 1)?;

        let outcomes = engine
            .grade_submissions(
                "sess-1",
                &round,
                &[
                    ("q1".to_string(), "btreemap".to_string()),
                    ("ghost".to_string(), "whatever".to_string()),
                ],
            )
            .await;

        assert_eq!(outcomes.len(), 2);
        let ok = &outcomes[0];
        assert!(ok.error.is_none());
        assert!(ok.result.as_ref().unwrap().is_correct);
        let missing = &outcomes[1];
        assert!(missing.result.is_none());
        assert!(missing.error.as_ref().unwrap().contains("not found"));
        Ok(())
    }
}
