//! Patch Workflow: turn the current analysis of a cluster into a validated
//! unified diff attached to that analysis.

use std::sync::Arc;

use chrono::Duration;
use logai_types::{AnalysisResult, ErrorCluster, JobKind, Patch, TriageError};
use tracing::{debug, info, warn};

use crate::analysis::cluster_context;
use crate::diff::{extract_diff, target_file, validate_unified_diff};
use crate::lease::LeaseGuard;
use crate::llm::{ChatMessage, ReasoningProvider};
use crate::retry::RetryPolicy;
use crate::source::load_source;
use crate::{Result, SharedDb};

const SOURCE_CONTEXT_CHARS: usize = 20_000;
const FALLBACK_FILE_NAME: &str = "fix.patch";

const SYSTEM_PROMPT: &str = "You are a senior engineer writing a minimal fix for a \
production error. Reply with a single unified diff (with ---/+++ headers and @@ hunks) \
inside a ```diff code block. Change only what the fix requires.";

pub struct PatchWorkflow {
    db: SharedDb,
    provider: Arc<dyn ReasoningProvider>,
    retry: RetryPolicy,
    lease_ttl: Duration,
}

impl PatchWorkflow {
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

    /// Generate a patch for the cluster's current analysis.
    ///
    /// Fails with `PreconditionFailed` (persisting nothing) when the cluster
    /// has never been analyzed, and with `InvalidArtifact` when the reply is
    /// not a well-formed unified diff; the analysis itself is left untouched.
    /// Without `source_code` the cluster's file is read from the
    /// application's source paths when one of them has it.
    pub async fn generate_patch(&self, cluster_id: &str, source_code: Option<&str>) -> Result<Patch> {
        let (cluster, analysis, roots) = {
            let db = self.db.lock().await;
            let cluster = db
                .clusters()
                .get(cluster_id)?
                .ok_or_else(|| TriageError::not_found("cluster", cluster_id))?;
            let analysis = db.analyses().current(cluster_id)?.ok_or_else(|| {
                TriageError::PreconditionFailed(format!(
                    "analyze before patching: cluster '{}' has no analysis",
                    cluster_id
                ))
            })?;
            let roots = db
                .applications()
                .get(&cluster.app_id)?
                .map(|app| app.source_paths)
                .unwrap_or_default();
            (cluster, analysis, roots)
        };

        let loaded = match source_code.map(str::trim).filter(|s| !s.is_empty()) {
            Some(_) => None,
            None => load_source(&roots, &cluster).await,
        };
        if let Some((path, _)) = &loaded {
            debug!("Using {} as source context for cluster {}", path.display(), cluster_id);
        }
        let source_code = source_code.or(loaded.as_ref().map(|(_, text)| text.as_str()));

        let lease = LeaseGuard::acquire(&self.db, cluster_id, JobKind::Patch, self.lease_ttl).await?;
        match self.run(&cluster, &analysis, source_code, &lease).await {
            Ok(patch) => {
                if let Err(err) = lease.complete().await {
                    warn!("Patch stored on {} but its job could not be closed: {}", patch.analysis_id, err);
                }
                info!(
                    "Patch for {} attached to analysis {}",
                    patch.patch_file_name, patch.analysis_id
                );
                Ok(patch)
            }
            Err(err) => {
                warn!("Patch generation for cluster {} failed: {}", cluster_id, err);
                if let Err(release) = lease.fail(&err.to_string()).await {
                    warn!("Could not record failed patch job: {}", release);
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        cluster: &ErrorCluster,
        analysis: &AnalysisResult,
        source_code: Option<&str>,
        lease: &LeaseGuard,
    ) -> Result<Patch> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(patch_prompt(cluster, analysis, source_code)),
        ];
        let completion = lease
            .bound(
                "patch request",
                self.retry.run("patch request", || self.provider.complete(&messages)),
            )
            .await?;

        let diff = extract_diff(&completion.text).ok_or_else(|| {
            TriageError::InvalidArtifact("reply does not contain a unified diff".to_string())
        })?;
        validate_unified_diff(&diff)
            .map_err(|v| TriageError::InvalidArtifact(format!("generated patch rejected: {}", v)))?;

        let file_name = target_file(&diff)
            .or_else(|| cluster.primary_file.clone())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

        // Attach to whichever analysis is current now; one may have been
        // appended while the patch was being generated.
        let db = self.db.lock().await;
        let current = db
            .analyses()
            .current(&cluster.id)?
            .map(|a| a.id)
            .unwrap_or_else(|| analysis.id.clone());
        let updated = db.analyses().attach_patch(&current, &diff, &file_name)?;
        Ok(Patch {
            analysis_id: updated.id,
            cluster_id: cluster.id.clone(),
            patch: diff,
            patch_file_name: file_name,
        })
    }
}

fn patch_prompt(cluster: &ErrorCluster, analysis: &AnalysisResult, source_code: Option<&str>) -> String {
    let mut out = cluster_context(cluster);
    out.push_str("\nAnalysis:\n");
    for (label, value) in [
        ("Explanation", &analysis.explanation),
        ("Root cause", &analysis.root_cause),
        ("Recommendation", &analysis.recommendation),
    ] {
        if let Some(value) = value {
            out.push_str(&format!("{}: {}\n", label, value));
        }
    }
    if let Some(source) = source_code.map(str::trim).filter(|s| !s.is_empty()) {
        let source: String = source.chars().take(SOURCE_CONTEXT_CHARS).collect();
        out.push_str(&format!("\nSource code:\n```\n{}\n```\n", source));
    }
    out
}
