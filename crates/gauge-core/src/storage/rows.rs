use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRow {
    pub session_id: String,
    pub question_id: String,
    pub user_answer: String,
    pub response_time_ms: u64,
    pub saved_at: String,
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRow {
    pub id: String,
    pub stem: String,
    pub item_type: String,
    pub choices: Option<Vec<String>>,
    /// Raw `to_db_dict` payload; re-normalized on read.
    pub answer_schema: serde_json::Value,
    pub difficulty: u8,
    pub category: String,
    pub round: String,
    pub needs_revision: bool,
}
