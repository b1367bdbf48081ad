//! Caller-scoped queue of failed persistence attempts.
//!
//! Scoped to one request or batch and returned alongside its results —
//! never a process-wide singleton. The caller decides when to drain and
//! re-submit out of band.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Question,
    Answer,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingWrite {
    pub kind: WriteKind,
    pub payload: serde_json::Value,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Default, Clone)]
pub struct RetryQueue {
    items: Vec<PendingWrite>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: WriteKind, payload: serde_json::Value, error: impl Into<String>) {
        let error = error.into();
        tracing::warn!(kind = ?kind, error = %error, "persistence failed; queued for retry");
        self.items.push(PendingWrite {
            kind,
            payload,
            error,
            attempts: 1,
        });
    }

    pub fn peek(&self) -> Option<&PendingWrite> {
        self.items.first()
    }

    /// Removes and returns all pending writes, FIFO.
    pub fn drain(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
