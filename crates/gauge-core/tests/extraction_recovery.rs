use gauge_core::answer;
use gauge_core::transcript::{extract, ParseOutcome, Transcript};

#[test]
fn test_one_malformed_record_among_five_still_yields_four_schemas() {
    let mut t = Transcript::new();
    t.push_user("generate");
    for i in 0..5 {
        let output = if i == 2 {
            // truncated beyond salvage
            "####".to_string()
        } else {
            format!(
                r#"{{"keywords": ["topic{}", "concept{}"], "explanation": "covers topic {}"}}"#,
                i, i, i
            )
        };
        t.push_tool("save_question", "{}", output, true);
    }

    let report = extract(&t);
    assert_eq!(report.calls.len(), 5);
    assert_eq!(report.parse_failures, 1);

    let normalized: Vec<_> = report
        .payloads_for("save_question")
        .into_iter()
        .filter_map(|p| answer::normalize(p).ok())
        .collect();
    assert_eq!(normalized.len(), 4);
}

#[test]
fn test_recovery_layers_end_to_end() {
    let mut t = Transcript::new();
    // fenced
    t.push_tool(
        "save_question",
        "{}",
        "```json\n{\"correct_answer\": \"A\", \"explanation\": \"fenced\"}\n```",
        true,
    );
    // double encoded
    t.push_tool(
        "save_question",
        "{}",
        serde_json::to_string(r#"{"correct_answer": "B", "explanation": "escaped"}"#).unwrap(),
        true,
    );
    // commentary around the object
    t.push_tool(
        "save_question",
        "{}",
        r#"Saved! {"correct_answer": "C", "explanation": "wrapped"} All good."#,
        true,
    );
    // truncated: only salvageable field-by-field
    t.push_tool(
        "save_question",
        "{}",
        r#"{"correct_answer": "D", "explanation": "partial", "choices": ["x", "y""#,
        true,
    );

    let report = extract(&t);
    assert_eq!(report.parse_failures, 0);
    assert_eq!(report.calls[0].outcome, ParseOutcome::Full);
    assert_eq!(report.calls[1].outcome, ParseOutcome::Full);
    assert_eq!(report.calls[2].outcome, ParseOutcome::Full);
    assert_eq!(report.calls[3].outcome, ParseOutcome::Partial);

    for (call, expected) in report.calls.iter().zip(["A", "B", "C", "D"]) {
        let schema = answer::normalize(call.payload.as_ref().unwrap()).unwrap();
        assert_eq!(schema.correct_answer(), Some(expected));
    }
}

#[test]
fn test_records_are_attributed_by_call_order() {
    let mut t = Transcript::new();
    t.push_tool("lookup_profile", r#"{"user_id": "u"}"#, r#"{"ok": 1}"#, true);
    t.push_tool("save_question", r#"{"a": 1}"#, r#"{"saved": true}"#, true);
    t.push_tool("save_question", r#"{"a": 2}"#, r#"{"saved": true}"#, false);

    let report = extract(&t);
    assert_eq!(report.calls[0].record.tool, "lookup_profile");
    assert_eq!(report.calls[1].record.index, 1);
    assert_eq!(report.calls[2].record.index, 2);
    assert!(!report.calls[2].record.success);
    assert_eq!(report.calls[2].record.raw_args, r#"{"a": 2}"#);
}
