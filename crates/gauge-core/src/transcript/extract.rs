//! Pulls structured tool results out of a transcript.
//!
//! Tool output arrives as free text and is frequently not valid JSON: fenced,
//! double-encoded, trailed by commentary, or truncated. Recovery is layered —
//! direct parse, marker stripping, bracket-balance extraction, then field-level
//! salvage — and a record that resists all four fails alone, never the whole
//! extraction.

use serde_json::Value;

use super::{Role, ToolCallRecord, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Payload recovered as complete JSON (possibly after unwrapping).
    Full,
    /// Only some fields salvaged; missing ones fall back to defaults downstream.
    Partial,
    /// Irrecoverable; the record is excluded and counted.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ExtractedCall {
    pub record: ToolCallRecord,
    pub payload: Option<Value>,
    pub outcome: ParseOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub calls: Vec<ExtractedCall>,
    pub terminal: Option<Value>,
    pub parse_failures: usize,
}

impl ExtractionReport {
    /// All successfully parsed payloads for one tool, in call order.
    /// Duplicate tool names are expected (e.g. one save per question).
    pub fn payloads_for(&self, tool: &str) -> Vec<&Value> {
        self.calls
            .iter()
            .filter(|c| c.record.tool == tool)
            .filter_map(|c| c.payload.as_ref())
            .collect()
    }
}

pub fn extract(transcript: &Transcript) -> ExtractionReport {
    let mut report = ExtractionReport::default();
    let mut call_index = 0usize;

    for msg in &transcript.messages {
        match msg.role {
            Role::Tool => {
                let tool = msg.tool.clone().unwrap_or_else(|| "unknown".to_string());
                let record = ToolCallRecord {
                    index: call_index,
                    tool: tool.clone(),
                    raw_args: msg.args_raw.clone().unwrap_or_default(),
                    raw_output: msg.content.clone(),
                    success: msg.success.unwrap_or(false),
                };
                call_index += 1;

                let (payload, outcome) = parse_lenient(&msg.content);
                match outcome {
                    ParseOutcome::Failed => {
                        report.parse_failures += 1;
                        tracing::warn!(
                            tool = %tool,
                            index = record.index,
                            "tool output unparseable; record excluded"
                        );
                    }
                    ParseOutcome::Partial => {
                        tracing::warn!(tool = %tool, index = record.index, "tool output salvaged field-by-field");
                    }
                    ParseOutcome::Full => {}
                }
                report.calls.push(ExtractedCall {
                    record,
                    payload,
                    outcome,
                });
            }
            Role::Final => {
                let (payload, outcome) = parse_lenient(&msg.content);
                report.terminal = match outcome {
                    ParseOutcome::Failed => Some(Value::String(msg.content.clone())),
                    _ => payload,
                };
            }
            Role::User | Role::Reasoning => {}
        }
    }

    report
}

/// Layered JSON recovery. Returns the recovered value and how it was won.
pub fn parse_lenient(raw: &str) -> (Option<Value>, ParseOutcome) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, ParseOutcome::Failed);
    }

    // Layer 1: the happy path.
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        // A bare string is frequently a double-encoded object; unwrap once.
        if let Value::String(inner) = &v {
            if let Ok(inner_v) = serde_json::from_str::<Value>(inner) {
                return (Some(inner_v), ParseOutcome::Full);
            }
        }
        if v.is_object() || v.is_array() {
            return (Some(v), ParseOutcome::Full);
        }
    }

    // Layer 2: strip wrapping markers (code fences, wrapping quotes).
    if let Some(stripped) = strip_markers(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(&stripped) {
            if v.is_object() || v.is_array() {
                return (Some(v), ParseOutcome::Full);
            }
        }
    }

    // Layer 3: bracket-balance extraction out of surrounding commentary.
    if let Some(candidate) = balanced_slice(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(&candidate) {
            return (Some(v), ParseOutcome::Full);
        }
    }

    // Layer 4: best-effort field-level salvage.
    if let Some(v) = salvage_fields(trimmed) {
        return (Some(v), ParseOutcome::Partial);
    }

    (None, ParseOutcome::Failed)
}

fn strip_markers(s: &str) -> Option<String> {
    let mut out = s.trim();

    if let Some(rest) = out.strip_prefix("```json") {
        out = rest;
    } else if let Some(rest) = out.strip_prefix("```") {
        out = rest;
    }
    if let Some(idx) = out.rfind("```") {
        out = &out[..idx];
    }
    let out = out.trim();

    // Whole payload wrapped in quotes with escaped internals.
    if (out.starts_with('"') && out.ends_with('"') && out.len() >= 2)
        || (out.starts_with('\'') && out.ends_with('\'') && out.len() >= 2)
    {
        let inner = &out[1..out.len() - 1];
        let unescaped = inner.replace("\\\"", "\"").replace("\\\\", "\\");
        return Some(unescaped);
    }

    if out == s.trim() {
        None
    } else {
        Some(out.to_string())
    }
}

/// First balanced `{...}` or `[...]` slice, string-aware.
fn balanced_slice(s: &str) -> Option<String> {
    let bytes: Vec<char> = s.chars().collect();
    let start = bytes.iter().position(|&c| c == '{' || c == '[')?;
    let open = bytes[start];
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(bytes[start..=i].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

const SALVAGE_STRING_FIELDS: &[&str] = &[
    "id",
    "question",
    "stem",
    "correct_answer",
    "correct_option",
    "explanation",
    "item_type",
    "category",
];

const SALVAGE_NUMBER_FIELDS: &[&str] = &["difficulty", "score", "semantic_score", "rule_score"];

/// Regex-based last resort: pull individually recognizable fields out of the
/// wreckage and assemble a partial object.
fn salvage_fields(s: &str) -> Option<Value> {
    let mut obj = serde_json::Map::new();

    for field in SALVAGE_STRING_FIELDS {
        let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(field));
        if let Ok(re) = regex::Regex::new(&pattern) {
            if let Some(cap) = re.captures(s) {
                let raw = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
                obj.insert((*field).to_string(), Value::String(unescape(raw)));
            }
        }
    }

    for field in SALVAGE_NUMBER_FIELDS {
        let pattern = format!(r#""{}"\s*:\s*(-?\d+(?:\.\d+)?)"#, regex::escape(field));
        if let Ok(re) = regex::Regex::new(&pattern) {
            if let Some(cap) = re.captures(s) {
                if let Ok(n) = cap[1].parse::<f64>() {
                    if let Some(num) = serde_json::Number::from_f64(n) {
                        obj.insert((*field).to_string(), Value::Number(num));
                    }
                }
            }
        }
    }

    // keywords: ["a", "b", ...]
    if let Ok(re) = regex::Regex::new(r#""keywords"\s*:\s*\[([^\]]*)\]"#) {
        if let Some(cap) = re.captures(s) {
            if let Ok(item_re) = regex::Regex::new(r#""((?:[^"\\]|\\.)*)""#) {
                let items: Vec<Value> = item_re
                    .captures_iter(&cap[1])
                    .map(|c| Value::String(unescape(&c[1])))
                    .collect();
                if !items.is_empty() {
                    obj.insert("keywords".to_string(), Value::Array(items));
                }
            }
        }
    }

    if obj.is_empty() {
        None
    } else {
        Some(Value::Object(obj))
    }
}

fn unescape(s: &str) -> String {
    s.replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\\\", "\\")
}
