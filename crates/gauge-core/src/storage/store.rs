use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::rows::{AnswerRow, QuestionRow};
use crate::model::GeneratedItem;
use crate::session::{Session, SessionStatus};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(super::schema::DDL)?;
        Ok(())
    }

    // sessions

    pub fn create_session(&self, session: &Session) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions(id, status, round, started_at, paused_at, time_limit_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.status.as_str(),
                session.round_number,
                fmt_ts(&session.started_at),
                session.paused_at.as_ref().map(fmt_ts),
                session.time_limit_ms as i64,
            ],
        )?;
        Ok(())
    }

    pub fn update_session(&self, session: &Session) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET status=?1, paused_at=?2 WHERE id=?3",
            params![
                session.status.as_str(),
                session.paused_at.as_ref().map(fmt_ts),
                session.id,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> anyhow::Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, status, round, started_at, paused_at, time_limit_ms
             FROM sessions WHERE id=?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?
        .map(|(id, status, round, started_at, paused_at, limit)| {
            Ok(Session {
                id,
                status: SessionStatus::parse(&status),
                round_number: round,
                started_at: parse_ts(&started_at)?,
                paused_at: paused_at.as_deref().map(parse_ts).transpose()?,
                time_limit_ms: limit as u64,
            })
        })
        .transpose()
    }

    // questions

    pub fn insert_question(&self, item: &GeneratedItem, needs_revision: bool) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO questions(id, stem, item_type, choices_json, answer_schema_json,
                                   difficulty, category, round, needs_revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id,
                item.stem,
                item.item_type.as_str(),
                item.choices
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                serde_json::to_string(&item.answer.to_db_dict())?,
                item.difficulty,
                item.categories.join(","),
                item.round,
                needs_revision as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_question(&self, id: &str) -> anyhow::Result<Option<QuestionRow>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, stem, item_type, choices_json, answer_schema_json,
                    difficulty, category, round, needs_revision
             FROM questions WHERE id=?1",
            params![id],
            row_to_question,
        )
        .optional()?
        .transpose()
    }

    pub fn questions_for_round(&self, round: &str) -> anyhow::Result<Vec<QuestionRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, stem, item_type, choices_json, answer_schema_json,
                    difficulty, category, round, needs_revision
             FROM questions WHERE round=?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![round], row_to_question)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }

    // answers

    /// Idempotent upsert keyed (session, question): resubmission updates.
    pub fn upsert_answer(&self, row: &AnswerRow) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO answers(session_id, question_id, user_answer, response_time_ms,
                                 saved_at, is_correct, score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id, question_id) DO UPDATE SET
                user_answer=excluded.user_answer,
                response_time_ms=excluded.response_time_ms,
                saved_at=excluded.saved_at,
                is_correct=excluded.is_correct,
                score=excluded.score",
            params![
                row.session_id,
                row.question_id,
                row.user_answer,
                row.response_time_ms as i64,
                row.saved_at,
                row.is_correct,
                row.score,
            ],
        )?;
        Ok(())
    }

    pub fn answers_for_session(&self, session_id: &str) -> anyhow::Result<Vec<AnswerRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id, question_id, user_answer, response_time_ms, saved_at,
                    is_correct, score
             FROM answers WHERE session_id=?1 ORDER BY saved_at, question_id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(AnswerRow {
                session_id: row.get(0)?,
                question_id: row.get(1)?,
                user_answer: row.get(2)?,
                response_time_ms: row.get::<_, i64>(3)? as u64,
                saved_at: row.get(4)?,
                is_correct: row.get(5)?,
                score: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn set_answer_result(
        &self,
        session_id: &str,
        question_id: &str,
        is_correct: bool,
        score: f64,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE answers SET is_correct=?1, score=?2 WHERE session_id=?3 AND question_id=?4",
            params![is_correct, score, session_id, question_id],
        )?;
        Ok(())
    }

    // explanation cache, keyed (question_id, is_correct)

    pub fn explain_get(&self, question_id: &str, is_correct: bool) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT explanation FROM explain_cache WHERE question_id=?1 AND is_correct=?2",
                params![question_id, is_correct],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn explain_put(
        &self,
        question_id: &str,
        is_correct: bool,
        explanation: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO explain_cache(question_id, is_correct, explanation, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(question_id, is_correct) DO UPDATE SET
                explanation=excluded.explanation,
                created_at=excluded.created_at",
            params![
                question_id,
                is_correct,
                explanation,
                fmt_ts(&Utc::now())
            ],
        )?;
        Ok(())
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn row_to_question(row: &rusqlite::Row<'_>) -> rusqlite::Result<anyhow::Result<QuestionRow>> {
    let choices_json: Option<String> = row.get(3)?;
    let schema_json: String = row.get(4)?;
    let id: String = row.get(0)?;
    let stem: String = row.get(1)?;
    let item_type: String = row.get(2)?;
    let difficulty: u8 = row.get(5)?;
    let category: String = row.get(6)?;
    let round: String = row.get(7)?;
    let needs_revision: bool = row.get(8)?;
    Ok((|| {
        Ok(QuestionRow {
            id,
            stem,
            item_type,
            choices: choices_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            answer_schema: serde_json::from_str(&schema_json)?,
            difficulty,
            category,
            round,
            needs_revision,
        })
    })())
}
