//! Analysis Workflow: one reasoning call per request, appended to the
//! cluster's analysis history under a per-cluster lease.

use std::sync::Arc;

use chrono::{Duration, Utc};
use logai_types::{AnalysisResult, Confidence, ErrorCluster, JobKind, NewAnalysis, TriageError};
use serde::Deserialize;
use tracing::{info, warn};

use crate::lease::LeaseGuard;
use crate::llm::{ChatMessage, Completion, ReasoningProvider};
use crate::retry::RetryPolicy;
use crate::{Result, SharedDb};

const STACK_CONTEXT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are a senior engineer triaging production errors. \
Given an error cluster, explain what is happening, identify the most likely root cause \
and recommend a fix. Reply with a single JSON object with the string fields \
\"explanation\", \"root_cause\", \"recommendation\" and \"confidence\" \
(one of \"LOW\", \"MEDIUM\", \"HIGH\").";

pub struct AnalysisWorkflow {
    db: SharedDb,
    provider: Arc<dyn ReasoningProvider>,
    retry: RetryPolicy,
    lease_ttl: Duration,
}

impl AnalysisWorkflow {
    pub fn new(
        db: SharedDb,
        provider: Arc<dyn ReasoningProvider>,
        retry: RetryPolicy,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            db,
            provider,
            retry,
            lease_ttl,
        }
    }

    /// Analyze a cluster and append the result to its history.
    ///
    /// A second call for the same cluster while one is running fails with
    /// `ConcurrencyConflict` instead of spending another reasoning call.
    pub async fn analyze(&self, cluster_id: &str) -> Result<AnalysisResult> {
        let cluster = {
            let db = self.db.lock().await;
            db.clusters()
                .get(cluster_id)?
                .ok_or_else(|| TriageError::not_found("cluster", cluster_id))?
        };
        let lease = LeaseGuard::acquire(&self.db, cluster_id, JobKind::Analysis, self.lease_ttl).await?;
        info!("Analyzing cluster {} (job {})", cluster_id, lease.job().id);

        match self.run(&cluster, &lease).await {
            Ok(result) => {
                // The result is stored; a lost lease row only needs a note.
                if let Err(err) = lease.complete().await {
                    warn!("Analysis {} stored but its job could not be closed: {}", result.id, err);
                }
                info!(
                    "Analysis {} stored for cluster {} ({} confidence)",
                    result.id,
                    cluster_id,
                    result.confidence.as_str()
                );
                Ok(result)
            }
            Err(err) => {
                warn!("Analysis of cluster {} failed: {}", cluster_id, err);
                if let Err(release) = lease.fail(&err.to_string()).await {
                    warn!("Could not record failed analysis job: {}", release);
                }
                Err(err)
            }
        }
    }

    async fn run(&self, cluster: &ErrorCluster, lease: &LeaseGuard) -> Result<AnalysisResult> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(cluster_context(cluster)),
        ];
        let completion = lease
            .bound(
                "analysis request",
                self.retry
                    .run("analysis request", || self.provider.complete(&messages)),
            )
            .await?;
        let analysis = parse_analysis(&cluster.id, &completion);
        let db = self.db.lock().await;
        Ok(db.analyses().insert(&analysis, Utc::now())?)
    }

    pub async fn current(&self, cluster_id: &str) -> Result<Option<AnalysisResult>> {
        let db = self.db.lock().await;
        if db.clusters().get(cluster_id)?.is_none() {
            return Err(TriageError::not_found("cluster", cluster_id));
        }
        Ok(db.analyses().current(cluster_id)?)
    }

    pub async fn history(&self, cluster_id: &str) -> Result<Vec<AnalysisResult>> {
        let db = self.db.lock().await;
        if db.clusters().get(cluster_id)?.is_none() {
            return Err(TriageError::not_found("cluster", cluster_id));
        }
        Ok(db.analyses().history(cluster_id)?)
    }
}

/// Cluster description shared by the analysis and patch prompts.
pub(crate) fn cluster_context(cluster: &ErrorCluster) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Exception: {}\n",
        cluster.exception_class.as_deref().unwrap_or("unknown")
    ));
    if let Some(pattern) = &cluster.message_pattern {
        out.push_str(&format!("Message pattern: {}\n", pattern));
    }
    let location = cluster.primary_location();
    if !location.is_empty() {
        out.push_str(&format!(
            "Location: {}.{} ({}:{})\n",
            location.class.as_deref().unwrap_or("?"),
            location.method.as_deref().unwrap_or("?"),
            location.file.as_deref().unwrap_or("?"),
            location.line.map(|l| l.to_string()).unwrap_or_else(|| "?".into())
        ));
    }
    out.push_str(&format!(
        "Occurrences: {} (severity {}, first seen {}, last seen {})\n",
        cluster.occurrence_count,
        cluster.severity.as_str(),
        cluster.first_seen.to_rfc3339(),
        cluster.last_seen.to_rfc3339()
    ));
    if let Some(sample) = &cluster.sample_message {
        out.push_str(&format!("Sample message: {}\n", sample));
    }
    if let Some(stack) = &cluster.sample_stack_trace {
        let stack: String = stack.chars().take(STACK_CONTEXT_CHARS).collect();
        out.push_str(&format!("Stack trace:\n{}\n", stack));
    }
    out
}

/// Extract a JSON block from model output. Tries fenced ```json ... ```
/// first, then a raw object.
pub(crate) fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let content_start = start + 7;
        if let Some(end) = trimmed[content_start..].find("```") {
            let block = trimmed[content_start..content_start + end].trim();
            if !block.is_empty() {
                return Some(block);
            }
        }
    }
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    // Prose around a bare object.
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

#[derive(Deserialize)]
struct AnalysisReply {
    explanation: Option<String>,
    root_cause: Option<String>,
    recommendation: Option<String>,
    confidence: Option<String>,
}

/// Structured findings from a model reply. A reply that is not the expected
/// JSON is kept as the explanation with UNKNOWN confidence.
pub(crate) fn parse_analysis(cluster_id: &str, completion: &Completion) -> NewAnalysis {
    let reply = extract_json_block(&completion.text)
        .and_then(|block| serde_json::from_str::<AnalysisReply>(block).ok());
    let (explanation, root_cause, recommendation, confidence) = match reply {
        Some(reply) => (
            reply.explanation,
            reply.root_cause,
            reply.recommendation,
            reply
                .confidence
                .as_deref()
                .map(Confidence::from_confidence)
                .unwrap_or(Confidence::Unknown),
        ),
        None => (
            Some(completion.text.trim().to_string()).filter(|t| !t.is_empty()),
            None,
            None,
            Confidence::Unknown,
        ),
    };
    NewAnalysis {
        cluster_id: cluster_id.to_string(),
        explanation,
        root_cause,
        recommendation,
        confidence,
        model_used: Some(completion.model.clone()),
        tokens_used: completion.tokens_used,
        raw_response: Some(completion.text.clone()),
    }
}
