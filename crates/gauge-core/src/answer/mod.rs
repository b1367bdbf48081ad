//! Canonical answer-key representation.
//!
//! Every producer of "what counts as correct" (agent tool payloads, DB rows,
//! legacy item payloads) is funneled through [`normalize`] into one immutable
//! [`NormalizedAnswerSchema`]. Construction is the single validation point:
//! the value is either fully valid or does not exist.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::hash::{Hash, Hasher};

use crate::model::ItemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Open-ended answers, graded by keyword coverage plus model judgment.
    KeywordMatch,
    /// Selectable answers, graded by case-insensitive exact match.
    ExactMatch,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKind::KeywordMatch => "keyword_match",
            AnswerKind::ExactMatch => "exact_match",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("payload carries both keywords and a correct answer; exactly one is allowed")]
    ConflictingFields,

    #[error("field '{field}' has wrong type, expected {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field '{0}' must be non-empty")]
    EmptyValue(&'static str),

    #[error("payload matches no known producer shape")]
    UnknownShape,
}

/// Producer shapes the normalizer understands. Detection is by presence of
/// shape-specific keys; `normalize_as` is the generic path told the shape
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// `{"keywords": [...], "explanation": ...}`
    KeywordList,
    /// `{"correct_answer": ..., "explanation": ...}` (alias `correct_option`)
    CorrectKey,
    /// Output of `to_db_dict` — carries `kind` and provenance fields.
    DbRecord,
}

impl SourceShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceShape::KeywordList => "keyword_list",
            SourceShape::CorrectKey => "correct_key",
            SourceShape::DbRecord => "db_record",
        }
    }

    /// Key-presence detection. A payload carrying both answer fields is
    /// ambiguous and refused here; callers that know the item type use
    /// [`normalize_for_item`] instead.
    pub fn detect(value: &Value) -> Result<Self, NormalizationError> {
        let obj = value.as_object().ok_or(NormalizationError::TypeMismatch {
            field: "payload",
            expected: "object",
        })?;
        if obj.contains_key("kind") && obj.contains_key("source_format") {
            return Ok(SourceShape::DbRecord);
        }
        let has_keywords = obj.contains_key("keywords");
        let has_correct = obj.contains_key("correct_answer") || obj.contains_key("correct_option");
        match (has_keywords, has_correct) {
            (true, true) => Err(NormalizationError::ConflictingFields),
            (true, false) => Ok(SourceShape::KeywordList),
            (false, true) => Ok(SourceShape::CorrectKey),
            (false, false) => Err(NormalizationError::UnknownShape),
        }
    }
}

/// The single canonical answer key. Immutable; fields are private so the
/// exactly-one-of invariant (`keywords` xor `correct_answer`) cannot be
/// broken after construction. Equality and hashing ignore `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct NormalizedAnswerSchema {
    kind: AnswerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correct_answer: Option<String>,
    explanation: String,
    source_format: String,
    created_at: DateTime<Utc>,
}

/// Serde surface for [`NormalizedAnswerSchema`]; deserialization funnels
/// through the validating constructor.
#[derive(Deserialize)]
struct RawSchema {
    kind: AnswerKind,
    #[serde(default)]
    keywords: Option<Vec<String>>,
    #[serde(default)]
    correct_answer: Option<String>,
    explanation: String,
    #[serde(default)]
    source_format: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawSchema> for NormalizedAnswerSchema {
    type Error = NormalizationError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        let source = raw.source_format.unwrap_or_else(|| "db_record".to_string());
        let mut schema = match raw.kind {
            AnswerKind::KeywordMatch => {
                if raw.correct_answer.is_some() {
                    return Err(NormalizationError::ConflictingFields);
                }
                let kws = raw.keywords.ok_or(NormalizationError::MissingField("keywords"))?;
                Self::keyword_match(kws, raw.explanation, source)?
            }
            AnswerKind::ExactMatch => {
                if raw.keywords.is_some() {
                    return Err(NormalizationError::ConflictingFields);
                }
                let ans = raw
                    .correct_answer
                    .ok_or(NormalizationError::MissingField("correct_answer"))?;
                Self::exact_match(ans, raw.explanation, source)?
            }
        };
        if let Some(ts) = raw.created_at {
            schema.created_at = ts;
        }
        Ok(schema)
    }
}

impl PartialEq for NormalizedAnswerSchema {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.keywords == other.keywords
            && self.correct_answer == other.correct_answer
            && self.explanation == other.explanation
            && self.source_format == other.source_format
    }
}

impl Eq for NormalizedAnswerSchema {}

impl Hash for NormalizedAnswerSchema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.keywords.hash(state);
        self.correct_answer.hash(state);
        self.explanation.hash(state);
        self.source_format.hash(state);
    }
}

impl NormalizedAnswerSchema {
    pub fn keyword_match(
        keywords: Vec<String>,
        explanation: impl Into<String>,
        source_format: impl Into<String>,
    ) -> Result<Self, NormalizationError> {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(NormalizationError::EmptyValue("keywords"));
        }
        let explanation = explanation.into();
        if explanation.trim().is_empty() {
            return Err(NormalizationError::EmptyValue("explanation"));
        }
        Ok(Self {
            kind: AnswerKind::KeywordMatch,
            keywords: Some(keywords),
            correct_answer: None,
            explanation,
            source_format: source_format.into(),
            created_at: Utc::now(),
        })
    }

    pub fn exact_match(
        correct_answer: impl Into<String>,
        explanation: impl Into<String>,
        source_format: impl Into<String>,
    ) -> Result<Self, NormalizationError> {
        let correct_answer = correct_answer.into();
        if correct_answer.trim().is_empty() {
            return Err(NormalizationError::EmptyValue("correct_answer"));
        }
        let explanation = explanation.into();
        if explanation.trim().is_empty() {
            return Err(NormalizationError::EmptyValue("explanation"));
        }
        Ok(Self {
            kind: AnswerKind::ExactMatch,
            keywords: None,
            correct_answer: Some(correct_answer),
            explanation,
            source_format: source_format.into(),
            created_at: Utc::now(),
        })
    }

    pub fn kind(&self) -> AnswerKind {
        self.kind
    }

    pub fn keywords(&self) -> Option<&[String]> {
        self.keywords.as_deref()
    }

    pub fn correct_answer(&self) -> Option<&str> {
        self.correct_answer.as_deref()
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn source_format(&self) -> &str {
        &self.source_format
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Full record for persistence, provenance included.
    pub fn to_db_dict(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("kind".into(), Value::String(self.kind.as_str().into()));
        if let Some(kws) = &self.keywords {
            obj.insert(
                "keywords".into(),
                Value::Array(kws.iter().map(|k| Value::String(k.clone())).collect()),
            );
        }
        if let Some(ans) = &self.correct_answer {
            obj.insert("correct_answer".into(), Value::String(ans.clone()));
        }
        obj.insert("explanation".into(), Value::String(self.explanation.clone()));
        obj.insert(
            "source_format".into(),
            Value::String(self.source_format.clone()),
        );
        obj.insert(
            "created_at".into(),
            Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Value::Object(obj)
    }

    /// API-facing shape; internal provenance fields omitted.
    pub fn to_response_dict(&self) -> Value {
        let mut v = self.to_db_dict();
        if let Some(obj) = v.as_object_mut() {
            obj.remove("source_format");
            obj.remove("created_at");
        }
        v
    }
}

/// Detect the producer shape and normalize. Per-shape transformers validate
/// their own required fields before constructing the common target.
pub fn normalize(value: &Value) -> Result<NormalizedAnswerSchema, NormalizationError> {
    let shape = SourceShape::detect(value)?;
    normalize_as(shape, value)
}

/// Generic path: caller names the shape explicitly.
pub fn normalize_as(
    shape: SourceShape,
    value: &Value,
) -> Result<NormalizedAnswerSchema, NormalizationError> {
    match shape {
        SourceShape::KeywordList => from_keyword_list(value),
        SourceShape::CorrectKey => from_correct_key(value),
        SourceShape::DbRecord => from_db_record(value),
    }
}

/// Type-aware path for full item payloads: the item type decides which
/// answer field is read, and the other is dropped. A stray leftover field
/// from the wrong producer shape must not leak into the normalized value —
/// downstream grading branches purely on which field is populated.
pub fn normalize_for_item(
    item_type: ItemType,
    value: &Value,
) -> Result<NormalizedAnswerSchema, NormalizationError> {
    if item_type.is_selectable() {
        from_correct_key(value)
    } else {
        from_keyword_list(value)
    }
}

fn str_field(value: &Value, field: &'static str) -> Result<String, NormalizationError> {
    match value.get(field) {
        None => Err(NormalizationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(NormalizationError::TypeMismatch {
            field,
            expected: "string",
        }),
    }
}

fn explanation_field(value: &Value) -> Result<String, NormalizationError> {
    str_field(value, "explanation")
}

fn from_keyword_list(value: &Value) -> Result<NormalizedAnswerSchema, NormalizationError> {
    let raw = value
        .get("keywords")
        .ok_or(NormalizationError::MissingField("keywords"))?;
    let arr = raw.as_array().ok_or(NormalizationError::TypeMismatch {
        field: "keywords",
        expected: "array of strings",
    })?;
    let mut keywords = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item.as_str().ok_or(NormalizationError::TypeMismatch {
            field: "keywords",
            expected: "array of strings",
        })?;
        keywords.push(s.to_string());
    }
    NormalizedAnswerSchema::keyword_match(
        keywords,
        explanation_field(value)?,
        SourceShape::KeywordList.as_str(),
    )
}

fn from_correct_key(value: &Value) -> Result<NormalizedAnswerSchema, NormalizationError> {
    let answer = match str_field(value, "correct_answer") {
        Ok(s) => s,
        Err(NormalizationError::MissingField(_)) => str_field(value, "correct_option")
            .map_err(|_| NormalizationError::MissingField("correct_answer"))?,
        Err(e) => return Err(e),
    };
    NormalizedAnswerSchema::exact_match(
        answer,
        explanation_field(value)?,
        SourceShape::CorrectKey.as_str(),
    )
}

fn from_db_record(value: &Value) -> Result<NormalizedAnswerSchema, NormalizationError> {
    let raw: RawSchema = serde_json::from_value(value.clone()).map_err(|_| {
        NormalizationError::TypeMismatch {
            field: "db_record",
            expected: "normalized schema object",
        }
    })?;
    NormalizedAnswerSchema::try_from(raw)
}
