//! End-to-end smoke: generate a round through the reasoning loop, submit
//! answers against the session, grade the batch, read results back.

use std::sync::Arc;

use gauge_core::config::EngineConfig;
use gauge_core::engine::RoundEngine;
use gauge_core::providers::llm::fake::FakeClient;
use gauge_core::providers::lookup::{
    InMemoryKeywords, InMemoryProfiles, InMemoryTemplates, LookupProviders, QuestionTemplate,
    UserProfile,
};
use gauge_core::session::{RoundId, SessionTracker, DEFAULT_TIME_LIMIT_MS};
use gauge_core::storage::Store;
use tempfile::tempdir;

fn lookups() -> LookupProviders {
    LookupProviders {
        profiles: Arc::new(InMemoryProfiles::new().with_profile(UserProfile {
            user_id: "u1".into(),
            self_level: "advanced".into(),
            experience_years: 6,
            interests: vec!["rust".into(), "async".into()],
            previous_score: Some(81.0),
        })),
        templates: Arc::new(InMemoryTemplates::new(vec![QuestionTemplate {
            id: "t1".into(),
            stem_pattern: "Explain {topic} in the context of async Rust".into(),
            category: "rust".into(),
            difficulty: 6,
            tags: vec!["async".into()],
        }])),
        keywords: Arc::new(
            InMemoryKeywords::new().with_entry("rust", 6, vec!["poll".into(), "waker".into()]),
        ),
    }
}

#[tokio::test]
async fn test_generate_then_grade_round() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = Store::open(&dir.path().join("gauge.db"))?;
    store.init_schema()?;

    // scripted run: profile lookup, one mcq save (judge scores it), one
    // short-answer save (judge again), terminal summary
    let mcq = r#"{"tool": "save_question", "args": {"item": {
        "id": "q-mcq",
        "question": "Which type drives an async task to completion?",
        "item_type": "multiple_choice",
        "choices": ["Waker", "Executor", "Pin", "Context"],
        "correct_answer": "Executor",
        "explanation": "executors poll futures until they are ready",
        "difficulty": 6,
        "category": "rust"
    }}}"#;
    let open = r#"{"tool": "save_question", "args": {"item": {
        "id": "q-open",
        "question": "Describe what poll returns and why.",
        "item_type": "short_answer",
        "keywords": ["poll", "pending", "ready"],
        "explanation": "poll yields Ready or Pending so the executor can reschedule",
        "difficulty": 6,
        "category": "rust"
    }}}"#;

    let client = Arc::new(FakeClient::new(vec![
        r#"{"tool": "lookup_profile", "args": {"user_id": "u1"}}"#.to_string(),
        mcq.to_string(),
        r#"{"score": 0.92}"#.to_string(),
        open.to_string(),
        r#"{"score": 0.88}"#.to_string(),
        "Saved 2 questions tailored to an advanced async user.".to_string(),
        // grading phase (driven one submission at a time below)
        "Correct: the executor is the component that polls futures until completion.".to_string(),
        r#"{"score": 83}"#.to_string(),
        "Poll returns Ready when done and Pending otherwise, so the executor can park and re-poll."
            .to_string(),
    ]));

    let engine = RoundEngine::new(client, store.clone(), lookups(), EngineConfig::default());
    let round = RoundId::new("sess_u1", 1)?;

    // generation
    let report = engine.generate_round("u1", &round).await?;
    assert_eq!(report.saved, 2);
    assert_eq!(report.rejected, 0);
    assert_eq!(report.parse_failures, 0);
    assert_eq!(report.questions.len(), 2);
    assert!(report.retries.is_empty());

    // session + submissions
    let tracker = SessionTracker::new(store.clone());
    let session = tracker.create(1, DEFAULT_TIME_LIMIT_MS)?;
    tracker.mark_in_progress(&session.id)?;
    tracker.record_answer(&session.id, "q-mcq", "executor", 4_000)?;
    tracker.record_answer(&session.id, "q-open", "poll returns ready or pending", 9_000)?;

    // grading: one submission per call so the scripted replies line up
    let outcomes = engine
        .grade_submissions(
            &session.id,
            &round,
            &[("q-mcq".to_string(), "executor".to_string())],
        )
        .await;
    let mcq_result = outcomes[0].result.as_ref().expect("mcq graded");
    assert!(mcq_result.is_correct);
    assert_eq!(mcq_result.score, 100.0);

    let outcomes = engine
        .grade_submissions(
            &session.id,
            &round,
            &[("q-open".to_string(), "poll returns ready or pending".to_string())],
        )
        .await;
    let open_result = outcomes[0].result.as_ref().expect("open graded");
    assert!(open_result.is_correct); // 83 >= 80
    assert_eq!(open_result.score, 83.0);
    assert!(open_result.keyword_matches.contains(&"poll".to_string()));

    // results written back to the answer rows
    let answers = store.answers_for_session(&session.id)?;
    assert_eq!(answers.len(), 2);
    assert!(answers.iter().all(|a| a.score.is_some()));

    // resume state reflects the graded answers without replaying them
    let state = tracker.resume_state(&session.id)?;
    assert_eq!(state.next_question_index, 2);
    Ok(())
}
