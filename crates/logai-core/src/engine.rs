//! `TriageEngine` wires the workflows over one shared database and is the
//! surface the request handlers call.

use std::sync::Arc;

use chrono::{Duration, Utc};
use logai_types::{
    AnalysisResult, AppStats, Application, ClusterStatus, ErrorCluster, LogEvent, Patch, ScanRun,
    StatusChange, TriageError,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analysis::AnalysisWorkflow;
use crate::cluster_store::ClusterStore;
use crate::config::TriageConfig;
use crate::fingerprint::Fingerprinter;
use crate::llm::ReasoningProvider;
use crate::log_source::{LogSource, StoredLogSource};
use crate::patch::PatchWorkflow;
use crate::retry::RetryPolicy;
use crate::scan::{ScanOrchestrator, ScanReport, ScanRequest};
use crate::severity::SeverityScorer;
use crate::{Result, SharedDb};

pub const MAX_RECENT_LOGS: usize = 1000;
pub const DEFAULT_SCAN_HISTORY: usize = 10;

pub struct TriageEngine {
    db: SharedDb,
    config: TriageConfig,
    clusters: ClusterStore,
    scans: ScanOrchestrator,
    analysis: Arc<AnalysisWorkflow>,
    patches: PatchWorkflow,
}

impl TriageEngine {
    /// Engine reading scan input from the ingested log table.
    pub fn new(db: SharedDb, config: TriageConfig, provider: Arc<dyn ReasoningProvider>) -> Self {
        let source = Arc::new(StoredLogSource::new(db.clone()));
        Self::with_log_source(db, config, provider, source)
    }

    pub fn with_log_source(
        db: SharedDb,
        config: TriageConfig,
        provider: Arc<dyn ReasoningProvider>,
        source: Arc<dyn LogSource>,
    ) -> Self {
        Self::with_retry(db, config.clone(), provider, source, RetryPolicy::from_config(&config.retry))
    }

    pub fn with_retry(
        db: SharedDb,
        config: TriageConfig,
        provider: Arc<dyn ReasoningProvider>,
        source: Arc<dyn LogSource>,
        retry: RetryPolicy,
    ) -> Self {
        let lease_ttl = Duration::seconds(config.analysis.lease_ttl_secs as i64);
        let scorer = Arc::new(SeverityScorer::new(config.severity.clone()));
        let clusters = ClusterStore::new(db.clone(), scorer);
        let analysis = Arc::new(AnalysisWorkflow::new(
            db.clone(),
            provider.clone(),
            retry.clone(),
            lease_ttl,
        ));
        let patches = PatchWorkflow::new(db.clone(), provider, retry.clone(), lease_ttl);
        let scans = ScanOrchestrator::new(
            db.clone(),
            source,
            Arc::new(Fingerprinter::new(&config.fingerprint)),
            clusters.clone(),
            analysis.clone(),
            retry,
            config.scan.clone(),
        );
        Self {
            db,
            config,
            clusters,
            scans,
            analysis,
            patches,
        }
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    // ── Workflows ──

    pub async fn scan(&self, request: &ScanRequest, cancel: CancellationToken) -> Result<ScanReport> {
        self.scans.run_scan(request, cancel).await
    }

    pub async fn analyze(&self, cluster_id: &str) -> Result<AnalysisResult> {
        self.analysis.analyze(cluster_id).await
    }

    pub async fn generate_patch(&self, cluster_id: &str, source_code: Option<&str>) -> Result<Patch> {
        self.patches.generate_patch(cluster_id, source_code).await
    }

    // ── Applications ──

    pub async fn create_application(
        &self,
        name: &str,
        description: Option<&str>,
        source_paths: &[String],
    ) -> Result<Application> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TriageError::Validation("application name must not be empty".to_string()));
        }
        check_source_paths(source_paths)?;
        let db = self.db.lock().await;
        let mut app = db.applications().create(name, description, Utc::now())?;
        if !source_paths.is_empty()
            && let Some(updated) = db.applications().set_source_paths(&app.id, source_paths, Utc::now())?
        {
            app = updated;
        }
        info!("Registered application {} ({})", app.name, app.id);
        Ok(app)
    }

    /// Absolute checkout roots; patch requests without code read the
    /// cluster's file from the first root that has it.
    pub async fn set_source_paths(&self, app_id: &str, paths: &[String]) -> Result<Application> {
        check_source_paths(paths)?;
        let db = self.db.lock().await;
        let app = db
            .applications()
            .set_source_paths(app_id, paths, Utc::now())?
            .ok_or_else(|| TriageError::not_found("application", app_id))?;
        info!("Application {} has {} source path(s)", app.id, app.source_paths.len());
        Ok(app)
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        let db = self.db.lock().await;
        Ok(db.applications().list()?)
    }

    pub async fn get_application(&self, app_id: &str) -> Result<Application> {
        let db = self.db.lock().await;
        db.applications()
            .get(app_id)?
            .ok_or_else(|| TriageError::not_found("application", app_id))
    }

    /// Removes the application with its logs, clusters, scans and analyses.
    pub async fn delete_application(&self, app_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        if !db.applications().delete(app_id)? {
            return Err(TriageError::not_found("application", app_id));
        }
        info!("Deleted application {}", app_id);
        Ok(())
    }

    pub async fn app_stats(&self, app_id: &str) -> Result<AppStats> {
        let db = self.db.lock().await;
        if !db.applications().exists(app_id)? {
            return Err(TriageError::not_found("application", app_id));
        }
        Ok(db.applications().stats(app_id)?)
    }

    // ── Logs ──

    pub async fn ingest(&self, app_id: &str, events: &[LogEvent]) -> Result<usize> {
        let db = self.db.lock().await;
        if !db.applications().exists(app_id)? {
            return Err(TriageError::not_found("application", app_id));
        }
        Ok(db.logs().insert_batch(app_id, events, Utc::now())?)
    }

    /// Newest events first; `limit` is clamped to `1..=1000`.
    pub async fn recent_logs(&self, app_id: &str, limit: usize) -> Result<Vec<LogEvent>> {
        let db = self.db.lock().await;
        if !db.applications().exists(app_id)? {
            return Err(TriageError::not_found("application", app_id));
        }
        Ok(db.logs().recent(app_id, limit.clamp(1, MAX_RECENT_LOGS))?)
    }

    // ── Clusters ──

    pub async fn list_clusters(&self, app_id: &str) -> Result<Vec<ErrorCluster>> {
        self.clusters.list(app_id).await
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> Result<ErrorCluster> {
        self.clusters.get(cluster_id).await
    }

    pub async fn set_cluster_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<ErrorCluster> {
        self.clusters.set_status(cluster_id, status).await
    }

    pub async fn status_history(&self, cluster_id: &str) -> Result<Vec<StatusChange>> {
        self.clusters.status_history(cluster_id).await
    }

    // ── History ──

    pub async fn current_analysis(&self, cluster_id: &str) -> Result<Option<AnalysisResult>> {
        self.analysis.current(cluster_id).await
    }

    pub async fn analysis_history(&self, cluster_id: &str) -> Result<Vec<AnalysisResult>> {
        self.analysis.history(cluster_id).await
    }

    pub async fn scan_history(&self, app_id: &str, limit: usize) -> Result<Vec<ScanRun>> {
        self.scans.history(app_id, limit).await
    }

    pub async fn get_scan(&self, scan_id: &str) -> Result<ScanRun> {
        self.scans.get(scan_id).await
    }

    // ── Settings ──

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        Ok(db.settings().get(key)?)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(TriageError::Validation("setting key must not be empty".to_string()));
        }
        let db = self.db.lock().await;
        db.settings().set(key, value)?;
        Ok(())
    }
}

fn check_source_paths(paths: &[String]) -> Result<()> {
    match paths
        .iter()
        .map(|p| p.trim())
        .find(|p| !p.is_empty() && !std::path::Path::new(p).is_absolute())
    {
        Some(bad) => Err(TriageError::Validation(format!("source path must be absolute: {bad}"))),
        None => Ok(()),
    }
}
