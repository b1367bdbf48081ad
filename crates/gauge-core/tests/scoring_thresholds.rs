use std::sync::Arc;

use gauge_core::answer::NormalizedAnswerSchema;
use gauge_core::model::{GeneratedItem, ItemType};
use gauge_core::providers::llm::fake::FakeClient;
use gauge_core::scorer::{AnswerScorer, CORRECT_THRESHOLD, FALLBACK_SCORE};
use gauge_core::storage::Store;

fn store() -> Store {
    let s = Store::open_in_memory().unwrap();
    s.init_schema().unwrap();
    s
}

fn true_false() -> GeneratedItem {
    GeneratedItem::new(
        "q-tf",
        "A &mut reference allows aliasing. True or false?",
        ItemType::TrueFalse,
        Some(vec!["true".into(), "false".into()]),
        NormalizedAnswerSchema::exact_match("false", "mutable references are exclusive", "test")
            .unwrap(),
        3,
        vec!["rust".into()],
        "r1",
    )
    .unwrap()
}

fn short_answer() -> GeneratedItem {
    GeneratedItem::new(
        "q-sa",
        "What does the Drop trait provide?",
        ItemType::ShortAnswer,
        None,
        NormalizedAnswerSchema::keyword_match(
            vec!["destructor".into(), "cleanup".into()],
            "drop runs custom cleanup when a value leaves scope",
            "test",
        )
        .unwrap(),
        5,
        vec!["rust".into()],
        "r1",
    )
    .unwrap()
}

const EXPLANATION: &str =
    "False: a mutable reference is exclusive, so no other alias may exist while it lives.";

#[tokio::test]
async fn test_selectable_matching_matrix() {
    for (submitted, correct) in [
        ("false", true),
        ("FALSE", true),
        ("  False  ", true),
        ("true", false),
        ("flase", false),
        ("", false),
    ] {
        let scorer = AnswerScorer::new(Some(Arc::new(FakeClient::new(vec![EXPLANATION]))), store());
        let result = scorer.grade(&true_false(), submitted).await;
        assert_eq!(result.is_correct, correct, "submitted: {:?}", submitted);
        assert_eq!(result.score, if correct { 100.0 } else { 0.0 });
    }
}

#[tokio::test]
async fn test_open_ended_model_score_drives_thresholds() {
    let cleanup_explanation =
        "Drop acts as a destructor hook, running cleanup code before the memory is released.";
    for (model_score, expect_correct) in [(95.0, true), (80.0, true), (79.0, false), (74.0, false), (12.0, false)] {
        let scorer = AnswerScorer::new(
            Some(Arc::new(FakeClient::new(vec![
                format!(r#"{{"score": {}}}"#, model_score),
                cleanup_explanation.to_string(),
            ]))),
            store(),
        );
        let result = scorer.grade(&short_answer(), "it runs cleanup like a destructor").await;
        assert_eq!(result.is_correct, expect_correct, "score {}", model_score);
        assert_eq!(result.score, model_score);
        assert_eq!(result.is_correct, result.score >= CORRECT_THRESHOLD);
        // partial credit stays not-correct but keeps its score
        if (70.0..80.0).contains(&model_score) {
            assert!(!result.is_correct);
            assert!(result.score > 0.0);
        }
    }
}

#[tokio::test]
async fn test_open_ended_fallback_on_outage() {
    let scorer = AnswerScorer::new(
        Some(Arc::new(FakeClient::new(vec!["unused"]).failing_after(0))),
        store(),
    );
    let result = scorer.grade(&short_answer(), "destructor-ish cleanup").await;
    assert!(result.is_fallback);
    assert!(!result.is_correct);
    assert_eq!(result.score, FALLBACK_SCORE);
    // keyword evidence still reported on the degraded path
    assert_eq!(result.keyword_matches, vec!["destructor", "cleanup"]);
}

#[tokio::test]
async fn test_explanation_shared_across_graders() {
    let store = store();
    let client = Arc::new(FakeClient::new(vec![EXPLANATION]));
    let scorer = AnswerScorer::new(Some(client.clone()), store.clone());

    scorer.grade(&true_false(), "true").await;
    let calls = client.calls_made();
    // a different submission with the same correctness outcome reuses the
    // cached explanation
    scorer.grade(&true_false(), "maybe").await;
    assert_eq!(client.calls_made(), calls);
}
