use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::agent::LoopConfig;
use crate::session::DEFAULT_TIME_LIMIT_MS;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,
    #[serde(default = "default_model_timeout")]
    pub model_timeout_seconds: u64,
    /// Bounded fan-out for batch grading.
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_time_limit")]
    pub time_limit_ms: u64,
    #[serde(default)]
    pub judge: JudgeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            tool_timeout_seconds: default_tool_timeout(),
            model_timeout_seconds: default_model_timeout(),
            parallel: default_parallel(),
            time_limit_ms: default_time_limit(),
            judge: JudgeSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_steps: self.max_steps,
            tool_timeout: Duration::from_secs(self.tool_timeout_seconds),
            model_timeout: Duration::from_secs(self.model_timeout_seconds),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }
}

fn default_max_steps() -> usize {
    12
}

fn default_tool_timeout() -> u64 {
    15
}

fn default_model_timeout() -> u64 {
    30
}

fn default_parallel() -> usize {
    4
}

fn default_time_limit() -> u64 {
    DEFAULT_TIME_LIMIT_MS
}

fn default_true() -> bool {
    true
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_steps, 12);
        assert_eq!(cfg.tool_timeout_seconds, 15);
        assert_eq!(cfg.time_limit_ms, 1_200_000);
        assert!(cfg.judge.enabled);
    }

    #[test]
    fn test_partial_yaml_applies_defaults() -> anyhow::Result<()> {
        let cfg = EngineConfig::from_yaml_str("max_steps: 6\njudge:\n  enabled: false\n")?;
        assert_eq!(cfg.max_steps, 6);
        assert!(!cfg.judge.enabled);
        // untouched fields keep defaults
        assert_eq!(cfg.parallel, 4);
        assert_eq!(cfg.judge.max_tokens, 512);
        Ok(())
    }

    #[test]
    fn test_yaml_round_trip() -> anyhow::Result<()> {
        let cfg = EngineConfig::default();
        let s = serde_yaml::to_string(&cfg)?;
        let back = EngineConfig::from_yaml_str(&s)?;
        assert_eq!(back, cfg);
        Ok(())
    }
}
