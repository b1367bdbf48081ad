//! Round lifecycle: generating -> in_progress -> {paused <-> in_progress} -> completed.
//!
//! Transitions are monotonic except resume. Submissions are idempotent
//! upserts; the time limit is enforced on every save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::rows::AnswerRow;
use crate::storage::Store;

pub mod round;

pub use round::RoundId;

/// 20 minutes.
pub const DEFAULT_TIME_LIMIT_MS: u64 = 1_200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Generating,
    InProgress,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Generating => "generating",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "generating" => SessionStatus::Generating,
            "in_progress" => SessionStatus::InProgress,
            "paused" => SessionStatus::Paused,
            "completed" => SessionStatus::Completed,
            // unknown writer; paused is the only recoverable fallback
            _ => SessionStatus::Paused,
        }
    }

    /// Monotonic except paused -> in_progress (resume).
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Generating, InProgress)
                | (InProgress, Paused)
                | (InProgress, Completed)
                | (Paused, InProgress)
                | (Paused, Completed)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("resume requires a paused session, found {0:?}")]
    NotPaused(SessionStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub round_number: u8,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    pub time_limit_ms: u64,
}

impl Session {
    pub fn start(round_number: u8, time_limit_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: SessionStatus::Generating,
            round_number,
            started_at: Utc::now(),
            paused_at: None,
            time_limit_ms,
        }
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        self.time_limit_ms.saturating_sub(self.elapsed_ms(now))
    }

    pub fn time_exceeded(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_ms(now) > self.time_limit_ms
    }

    fn transition(&mut self, next: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Outcome of one autosave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub saved: bool,
    /// The save tripped the time limit; the session is now paused.
    pub time_exceeded: bool,
}

/// Everything needed to continue a paused round without replaying
/// already-answered items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeState {
    pub session: Session,
    pub answers: Vec<AnswerRow>,
    pub next_question_index: usize,
    pub elapsed_ms: u64,
    pub remaining_ms: u64,
}

/// Drives one session's lifecycle against the store. Updates are idempotent
/// upserts, so last-writer-wins is acceptable without in-process locking.
pub struct SessionTracker {
    store: Store,
}

impl SessionTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create(&self, round_number: u8, time_limit_ms: u64) -> anyhow::Result<Session> {
        let session = Session::start(round_number, time_limit_ms);
        self.store.create_session(&session)?;
        Ok(session)
    }

    pub fn mark_in_progress(&self, session_id: &str) -> anyhow::Result<Session> {
        self.apply_transition(session_id, SessionStatus::InProgress)
    }

    pub fn complete(&self, session_id: &str) -> anyhow::Result<Session> {
        self.apply_transition(session_id, SessionStatus::Completed)
    }

    /// Idempotent answer upsert. The time limit is checked regardless of
    /// whether the save itself succeeds; exceeding it pauses the session.
    pub fn record_answer(
        &self,
        session_id: &str,
        question_id: &str,
        user_answer: &str,
        response_time_ms: u64,
    ) -> anyhow::Result<SaveOutcome> {
        let mut session = self.load(session_id)?;
        let now = Utc::now();

        let save_result = self.store.upsert_answer(&AnswerRow {
            session_id: session_id.to_string(),
            question_id: question_id.to_string(),
            user_answer: user_answer.to_string(),
            response_time_ms,
            saved_at: now.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            is_correct: None,
            score: None,
        });

        let time_exceeded = session.time_exceeded(now);
        if time_exceeded && session.status == SessionStatus::InProgress {
            session.transition(SessionStatus::Paused)?;
            session.paused_at = Some(now);
            self.store.update_session(&session)?;
            tracing::warn!(session = %session_id, "time limit exceeded; session paused");
        }

        match save_result {
            Ok(()) => Ok(SaveOutcome {
                saved: true,
                time_exceeded,
            }),
            Err(e) if time_exceeded => {
                // The pause already happened; report the degraded save.
                tracing::warn!(session = %session_id, error = %e, "autosave failed after pause");
                Ok(SaveOutcome {
                    saved: false,
                    time_exceeded,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Valid only from paused; clears paused_at.
    pub fn resume(&self, session_id: &str) -> anyhow::Result<Session> {
        let mut session = self.load(session_id)?;
        if session.status != SessionStatus::Paused {
            return Err(SessionError::NotPaused(session.status).into());
        }
        session.transition(SessionStatus::InProgress)?;
        session.paused_at = None;
        self.store.update_session(&session)?;
        Ok(session)
    }

    pub fn resume_state(&self, session_id: &str) -> anyhow::Result<ResumeState> {
        let session = self.load(session_id)?;
        let answers = self.store.answers_for_session(session_id)?;
        let now = Utc::now();
        Ok(ResumeState {
            next_question_index: answers.len(),
            elapsed_ms: session.elapsed_ms(now),
            remaining_ms: session.remaining_ms(now),
            session,
            answers,
        })
    }

    fn apply_transition(&self, session_id: &str, next: SessionStatus) -> anyhow::Result<Session> {
        let mut session = self.load(session_id)?;
        session.transition(next)?;
        if next != SessionStatus::Paused {
            session.paused_at = None;
        }
        self.store.update_session(&session)?;
        Ok(session)
    }

    fn load(&self, session_id: &str) -> anyhow::Result<Session> {
        self.store
            .get_session(session_id)?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        assert!(Generating.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Paused));
        assert!(Paused.can_transition_to(InProgress));
        assert!(Paused.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Paused.can_transition_to(Generating));
        assert!(!InProgress.can_transition_to(Generating));
    }

    #[test]
    fn test_elapsed_and_remaining() {
        let mut s = Session::start(1, 1_200_000);
        s.started_at = Utc::now() - chrono::Duration::minutes(21);
        let now = Utc::now();
        assert!(s.time_exceeded(now));
        assert_eq!(s.remaining_ms(now), 0);

        s.started_at = Utc::now() - chrono::Duration::minutes(1);
        assert!(!s.time_exceeded(Utc::now()));
    }

    #[test]
    fn test_status_parse_round_trip() {
        for s in [
            SessionStatus::Generating,
            SessionStatus::InProgress,
            SessionStatus::Paused,
            SessionStatus::Completed,
        ] {
            assert_eq!(SessionStatus::parse(s.as_str()), s);
        }
        assert_eq!(SessionStatus::parse("bogus"), SessionStatus::Paused);
    }
}
