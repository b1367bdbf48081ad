use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{codes, Diagnostic};

/// Identifier for one timed attempt. Wire form is
/// `{session_id}_{round_number}_{timestamp}`; the session id may itself
/// contain underscores, so parsing is anchored on the two rightmost
/// separators (the RFC 3339 timestamp never contains one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundId {
    session_id: String,
    round_number: u8,
    timestamp: DateTime<Utc>,
}

impl RoundId {
    pub fn new(session_id: impl Into<String>, round_number: u8) -> anyhow::Result<Self> {
        Self::with_timestamp(session_id, round_number, Utc::now())
    }

    pub fn with_timestamp(
        session_id: impl Into<String>,
        round_number: u8,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<Self> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(Diagnostic::new(codes::E_INVALID_INPUT, "empty session id")
                .with_source("round")
                .into());
        }
        if !(1..=2).contains(&round_number) {
            return Err(Diagnostic::new(
                codes::E_INVALID_INPUT,
                format!("round number {} outside 1..=2", round_number),
            )
            .with_source("round")
            .into());
        }
        Ok(Self {
            session_id,
            round_number,
            timestamp,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn round_number(&self) -> u8 {
        self.round_number
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.session_id,
            self.round_number,
            self.timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, false)
        )
    }
}

impl FromStr for RoundId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // rightmost two separators split off timestamp and round number;
        // everything left of them is the session id, underscores included
        let mut parts = s.rsplitn(3, '_');
        let ts_part = parts.next();
        let round_part = parts.next();
        let session_part = parts.next();
        let (Some(ts_raw), Some(round_raw), Some(session_id)) =
            (ts_part, round_part, session_part)
        else {
            return Err(Diagnostic::new(
                codes::E_INVALID_INPUT,
                format!("round id '{}' has fewer than 3 segments", s),
            )
            .with_source("round")
            .into());
        };

        let round_number: u8 = round_raw.parse().map_err(|_| {
            Diagnostic::new(
                codes::E_INVALID_INPUT,
                format!("round number '{}' is not an integer", round_raw),
            )
            .with_source("round")
        })?;
        let timestamp = DateTime::parse_from_rfc3339(ts_raw)
            .map_err(|e| {
                Diagnostic::new(
                    codes::E_INVALID_INPUT,
                    format!("round timestamp '{}': {}", ts_raw, e),
                )
                .with_source("round")
            })?
            .with_timezone(&Utc);

        Self::with_timestamp(session_id, round_number, timestamp)
    }
}
