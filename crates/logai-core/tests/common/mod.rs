#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use logai_core::llm::{ChatMessage, Completion, ReasoningProvider};
use logai_core::log_source::{LogSource, StoredLogSource};
use logai_core::retry::RetryPolicy;
use logai_core::{SharedDb, TriageConfig, TriageEngine, shared};
use logai_storage::{Database, LogWindow};
use logai_test_utils::{TestDb, exception_event};
use logai_types::{LogEvent, TriageError};
use tokio::sync::Notify;

pub const ANALYSIS_JSON: &str = r#"```json
{"explanation": "The order is closed before payment completes",
 "root_cause": "Missing state check in OrderService.place",
 "recommendation": "Reject payments for closed orders",
 "confidence": "HIGH"}
```"#;

pub const PATCH_REPLY: &str = "Here is a fix:
```diff
--- a/src/main/java/com/acme/OrderService.java
+++ b/src/main/java/com/acme/OrderService.java
@@ -42,1 +42,3 @@
-        order.pay();
+        if (!order.isClosed()) {
+            order.pay();
+        }
```";

/// Provider that replays scripted replies and counts calls. When the script
/// runs dry it answers with `ANALYSIS_JSON`.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: std::sync::Mutex<VecDeque<Result<String, TriageError>>>,
    calls: AtomicUsize,
    prompts: std::sync::Mutex<Vec<String>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, TriageError>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Blocks inside `complete` after signalling `entered` until `release`.
    pub fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Default::default()
        }
    }

    pub fn with_replies(self, replies: Vec<Result<String, TriageError>>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into()),
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User turns received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, TriageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().extend(
            messages
                .iter()
                .filter(|m| m.role == "user")
                .map(|m| m.content.clone()),
        );
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        let text = match next {
            Some(reply) => reply?,
            None => ANALYSIS_JSON.to_string(),
        };
        Ok(Completion {
            text,
            model: "scripted".to_string(),
            tokens_used: Some(120),
        })
    }
}

/// Log source that is always down.
#[derive(Default)]
pub struct DownLogSource {
    pub calls: AtomicUsize,
}

#[async_trait]
impl LogSource for DownLogSource {
    async fn fetch(&self, _: &str, _: &LogWindow, _: usize) -> Result<Vec<LogEvent>, TriageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TriageError::UpstreamUnavailable("log store unreachable".to_string()))
    }
}

/// Log source that never answers.
pub struct HangingLogSource;

#[async_trait]
impl LogSource for HangingLogSource {
    async fn fetch(&self, _: &str, _: &LogWindow, _: usize) -> Result<Vec<LogEvent>, TriageError> {
        std::future::pending().await
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

pub fn test_db() -> SharedDb {
    shared(Database::from_connection(TestDb::new().into_connection()).unwrap())
}

pub fn engine_with(
    db: SharedDb,
    config: TriageConfig,
    provider: Arc<dyn ReasoningProvider>,
    source: Option<Arc<dyn LogSource>>,
) -> TriageEngine {
    let source = source.unwrap_or_else(|| Arc::new(StoredLogSource::new(db.clone())));
    TriageEngine::with_retry(db, config, provider, source, fast_retry())
}

pub fn engine(provider: Arc<dyn ReasoningProvider>) -> TriageEngine {
    engine_with(test_db(), TriageConfig::default(), provider, None)
}

/// `n` occurrences of the closed-order error, differing only in the order id.
pub fn closed_order_events(n: i64) -> Vec<LogEvent> {
    (0..n)
        .map(|i| {
            exception_event(
                Utc::now() - ChronoDuration::minutes(10 + i),
                "java.lang.IllegalStateException",
                "com.acme.OrderService.place(OrderService.java:42)",
                &format!("Order {} is closed", 1000 + i),
            )
        })
        .collect()
}

/// `n` occurrences of a null customer in billing.
pub fn billing_events(n: i64) -> Vec<LogEvent> {
    (0..n)
        .map(|i| {
            exception_event(
                Utc::now() - ChronoDuration::minutes(20 + i),
                "java.lang.NullPointerException",
                "com.acme.Billing.charge(Billing.java:7)",
                "customer is null",
            )
        })
        .collect()
}
