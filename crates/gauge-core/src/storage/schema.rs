pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
  id TEXT PRIMARY KEY,
  status TEXT NOT NULL,
  round INTEGER NOT NULL,
  started_at TEXT NOT NULL,
  paused_at TEXT,
  time_limit_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
  id TEXT PRIMARY KEY,
  stem TEXT NOT NULL,
  item_type TEXT NOT NULL,
  choices_json TEXT,
  answer_schema_json TEXT NOT NULL,
  difficulty INTEGER NOT NULL,
  category TEXT NOT NULL,
  round TEXT NOT NULL,
  needs_revision INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS answers (
  session_id TEXT NOT NULL,
  question_id TEXT NOT NULL,
  user_answer TEXT NOT NULL,
  response_time_ms INTEGER NOT NULL,
  saved_at TEXT NOT NULL,
  is_correct INTEGER,
  score REAL,
  PRIMARY KEY (session_id, question_id)
);

CREATE TABLE IF NOT EXISTS explain_cache (
  question_id TEXT NOT NULL,
  is_correct INTEGER NOT NULL,
  explanation TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY (question_id, is_correct)
);
"#;
