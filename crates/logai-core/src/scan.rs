//! Scan Orchestrator: one bounded pass over an application's recent events.
//!
//! Distinct fingerprints are upserted concurrently (bounded by a semaphore);
//! occurrences of one fingerprint are applied in order by a single task. Each
//! upsert commits on its own, so a scan that fails part way leaves the
//! clusters it already counted in place and records the run as FAILED.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use logai_storage::LogWindow;
use logai_types::{LogEvent, ScanCounters, ScanRun, TriageError};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analysis::AnalysisWorkflow;
use crate::cluster_store::ClusterStore;
use crate::config::ScanConfig;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::log_source::LogSource;
use crate::retry::RetryPolicy;
use crate::{Result, SharedDb};

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub app_id: String,
    pub lookback_hours: i64,
    /// Analyze every newly created cluster before returning.
    pub analyze: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub scan: ScanRun,
    /// Distinct clusters that received at least one occurrence.
    pub clusters_found: usize,
    /// Those clusters, in order of first occurrence.
    pub cluster_ids: Vec<String>,
    /// The window held more events than the result-size cap.
    pub truncated: bool,
}

#[derive(Default)]
struct Tally {
    logs_scanned: AtomicI64,
    errors_found: AtomicI64,
    clusters_created: AtomicI64,
    clusters_analyzed: AtomicI64,
}

impl Tally {
    fn counters(&self) -> ScanCounters {
        ScanCounters {
            logs_scanned: self.logs_scanned.load(Ordering::SeqCst),
            errors_found: self.errors_found.load(Ordering::SeqCst),
            clusters_created: self.clusters_created.load(Ordering::SeqCst),
            clusters_analyzed: self.clusters_analyzed.load(Ordering::SeqCst),
        }
    }
}

/// Occurrences of one fingerprint within a scan.
struct Group {
    fingerprint: Fingerprint,
    occurred_at: Vec<DateTime<Utc>>,
}

struct Pass {
    cluster_ids: Vec<String>,
    truncated: bool,
    /// Timestamp of the last event scanned when the cap cut the window short.
    covered_to: Option<DateTime<Utc>>,
}

/// Truncate `events` (oldest first, more than `cap` of them) to at most `cap`
/// and return the timestamp the scan is complete up to. Events sharing the
/// boundary timestamp are all left for the next scan, so resuming strictly
/// after the returned instant loses nothing.
fn cut_at_cap(events: &mut Vec<LogEvent>, cap: usize, window: &LogWindow) -> DateTime<Utc> {
    let boundary = events[cap].timestamp;
    events.truncate(cap);
    let keep = events
        .iter()
        .position(|e| e.timestamp >= boundary)
        .unwrap_or(events.len());
    if keep > 0 {
        events.truncate(keep);
    } else if !events.is_empty() {
        warn!(
            "More than {} events share timestamp {}; the rest at that instant are skipped",
            cap, boundary
        );
    }
    events.last().map(|e| e.timestamp).unwrap_or(window.start)
}

pub struct ScanOrchestrator {
    db: SharedDb,
    source: Arc<dyn LogSource>,
    fingerprinter: Arc<Fingerprinter>,
    clusters: ClusterStore,
    analysis: Arc<AnalysisWorkflow>,
    retry: RetryPolicy,
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(
        db: SharedDb,
        source: Arc<dyn LogSource>,
        fingerprinter: Arc<Fingerprinter>,
        clusters: ClusterStore,
        analysis: Arc<AnalysisWorkflow>,
        retry: RetryPolicy,
        config: ScanConfig,
    ) -> Self {
        Self {
            db,
            source,
            fingerprinter,
            clusters,
            analysis,
            retry,
            config,
        }
    }

    pub async fn run_scan(&self, request: &ScanRequest, cancel: CancellationToken) -> Result<ScanReport> {
        if request.lookback_hours < 1 {
            return Err(TriageError::Validation(format!(
                "lookback_hours must be at least 1, got {}",
                request.lookback_hours
            )));
        }
        if request.lookback_hours > self.config.max_lookback_hours {
            return Err(TriageError::Validation(format!(
                "lookback_hours must be at most {}, got {}",
                self.config.max_lookback_hours, request.lookback_hours
            )));
        }

        let now = Utc::now();
        let (window, run) = {
            let db = self.db.lock().await;
            if !db.applications().exists(&request.app_id)? {
                return Err(TriageError::not_found("application", &request.app_id));
            }
            let start = now - Duration::hours(request.lookback_hours);
            let mut window = LogWindow::closed(start, now);
            if self.config.use_watermark
                && let Some(mark) = db.scans().last_completed_window_end(&request.app_id)?
                && mark >= start
            {
                // Events at the mark were counted by the previous scan.
                window = LogWindow::after(mark.min(now), now);
            }
            let run = db.scans().start(&request.app_id, &window, now)?;
            (window, run)
        };
        info!(
            "Scan {} started for app {} ({}h lookback{})",
            run.id,
            request.app_id,
            request.lookback_hours,
            if request.analyze { ", inline analysis" } else { "" }
        );

        let tally = Arc::new(Tally::default());
        let timeout = StdDuration::from_secs(self.config.timeout_secs);
        let outcome = tokio::select! {
            res = self.execute(&request.app_id, &window, request.analyze, tally.clone()) => res,
            _ = cancel.cancelled() => Err(TriageError::Cancelled("scan cancelled by caller".to_string())),
            _ = tokio::time::sleep(timeout) => Err(TriageError::Cancelled(format!(
                "scan timed out after {}s",
                self.config.timeout_secs
            ))),
        };

        let counters = tally.counters();
        let db = self.db.lock().await;
        let finished = outcome.and_then(|pass| {
            let scan = db
                .scans()
                .complete(&run.id, &counters, pass.covered_to, Utc::now())?;
            Ok((scan, pass))
        });
        match finished {
            Ok((scan, pass)) => {
                info!(
                    "Scan {} completed: {} logs, {} errors, {} clusters ({} new, {} analyzed)",
                    scan.id,
                    counters.logs_scanned,
                    counters.errors_found,
                    pass.cluster_ids.len(),
                    counters.clusters_created,
                    counters.clusters_analyzed
                );
                Ok(ScanReport {
                    scan,
                    clusters_found: pass.cluster_ids.len(),
                    cluster_ids: pass.cluster_ids,
                    truncated: pass.truncated,
                })
            }
            Err(err) => {
                error!("Scan {} failed: {}", run.id, err);
                if let Err(mark) = db.scans().fail(&run.id, &err.to_string(), &counters, Utc::now()) {
                    error!("Could not mark scan {} as failed: {}", run.id, mark);
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        app_id: &str,
        window: &LogWindow,
        analyze: bool,
        tally: Arc<Tally>,
    ) -> Result<Pass> {
        let cap = self.config.max_events;
        let mut events = self
            .retry
            .run("log fetch", || self.source.fetch(app_id, window, cap.saturating_add(1)))
            .await?;
        let truncated = events.len() > cap;
        let mut covered_to = None;
        if truncated {
            warn!(
                "App {} has more than {} events in the scan window; only the oldest {} are scanned",
                app_id, cap, cap
            );
            covered_to = Some(cut_at_cap(&mut events, cap, window));
        }

        tally.logs_scanned.store(events.len() as i64, Ordering::SeqCst);
        tally.errors_found.store(
            events.iter().filter(|e| e.level.is_error()).count() as i64,
            Ordering::SeqCst,
        );

        let groups = self.group(&events);
        let (cluster_ids, created) = self.upsert_groups(app_id, groups, &tally).await?;

        if analyze {
            for cluster_id in &created {
                match self.analysis.analyze(cluster_id).await {
                    Ok(_) => {
                        tally.clusters_analyzed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => warn!("Inline analysis of new cluster {} failed: {}", cluster_id, err),
                }
            }
        }

        Ok(Pass {
            cluster_ids,
            truncated,
            covered_to,
        })
    }

    /// Fingerprint every eligible event, grouping by key in order of first
    /// appearance.
    fn group(&self, events: &[LogEvent]) -> Vec<Group> {
        let mut order: Vec<Group> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for event in events {
            let Some(fingerprint) = self.fingerprinter.fingerprint(event) else {
                continue;
            };
            match index.get(&fingerprint.key) {
                Some(&i) => order[i].occurred_at.push(event.timestamp),
                None => {
                    index.insert(fingerprint.key.clone(), order.len());
                    order.push(Group {
                        fingerprint,
                        occurred_at: vec![event.timestamp],
                    });
                }
            }
        }
        order
    }

    /// Upsert all groups; returns every touched cluster id and the subset
    /// created by this scan, both in group order.
    async fn upsert_groups(
        &self,
        app_id: &str,
        groups: Vec<Group>,
        tally: &Arc<Tally>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let permits = Arc::new(Semaphore::new(self.config.upsert_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (position, group) in groups.into_iter().enumerate() {
            let store = self.clusters.clone();
            let permits = permits.clone();
            let tally = tally.clone();
            let app_id = app_id.to_string();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| TriageError::Cancelled("scan shut down".to_string()))?;
                let mut cluster_id = String::new();
                let mut created = false;
                for occurred_at in group.occurred_at {
                    let outcome = store.upsert(&app_id, &group.fingerprint, occurred_at).await?;
                    if outcome.created {
                        created = true;
                        tally.clusters_created.fetch_add(1, Ordering::SeqCst);
                    }
                    cluster_id = outcome.cluster.id;
                }
                Ok::<_, TriageError>((position, cluster_id, created))
            });
        }

        let mut touched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| TriageError::Storage(format!("upsert task failed: {}", e)))?;
            // Returning early drops the set, aborting the remaining upserts.
            touched.push(result?);
        }
        touched.sort_by_key(|(position, _, _)| *position);

        let created = touched
            .iter()
            .filter(|(_, _, created)| *created)
            .map(|(_, id, _)| id.clone())
            .collect();
        let ids = touched.into_iter().map(|(_, id, _)| id).collect();
        Ok((ids, created))
    }

    pub async fn get(&self, scan_id: &str) -> Result<ScanRun> {
        let db = self.db.lock().await;
        db.scans()
            .get(scan_id)?
            .ok_or_else(|| TriageError::not_found("scan", scan_id))
    }

    pub async fn history(&self, app_id: &str, limit: usize) -> Result<Vec<ScanRun>> {
        let db = self.db.lock().await;
        if !db.applications().exists(app_id)? {
            return Err(TriageError::not_found("application", app_id));
        }
        Ok(db.scans().history(app_id, limit)?)
    }
}
