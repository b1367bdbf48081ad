//! Scripted client for tests and offline runs: replies are consumed in
//! order, then the final reply repeats. A `fail_after` cutoff simulates
//! provider outage mid-run.

use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct FakeClient {
    replies: Mutex<Vec<String>>,
    cursor: AtomicUsize,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    fingerprint: String,
}

impl FakeClient {
    pub fn new(replies: Vec<impl Into<String>>) -> Self {
        let replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        // deterministic fingerprint of the script, for cache keying in tests
        let mut hasher = Sha256::new();
        for r in &replies {
            hasher.update(r.as_bytes());
            hasher.update(b"\n");
        }
        let fingerprint = hex::encode(hasher.finalize());
        Self {
            replies: Mutex::new(replies),
            cursor: AtomicUsize::new(0),
            fail_after: None,
            delay: None,
            fingerprint,
        }
    }

    /// Every call after the n-th returns an error.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Sleep before each reply; pair with a short caller timeout to exercise
    /// timeout fallbacks.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls_made(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(
        &self,
        _prompt: &str,
        _context: Option<&[String]>,
    ) -> anyhow::Result<LlmResponse> {
        let n = self.cursor.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if n >= limit {
                anyhow::bail!("fake provider outage (call {})", n);
            }
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let replies = self.replies.lock().unwrap();
        let text = replies
            .get(n.min(replies.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_default();
        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: "fake".to_string(),
            cached: false,
            meta: serde_json::json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn fingerprint(&self) -> Option<String> {
        Some(self.fingerprint.clone())
    }
}
