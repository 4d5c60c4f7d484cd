//! Cluster Store Adapter: the async face of the cluster table.
//!
//! Counting an occurrence is delegated to [`ClustersDao::upsert`], which bumps
//! `occurrence_count` atomically inside an IMMEDIATE transaction. That is the
//! single place concurrent scans synchronize; nothing here reads a count and
//! writes it back.
//!
//! [`ClustersDao::upsert`]: logai_storage::ClustersDao::upsert

use std::sync::Arc;

use chrono::{DateTime, Utc};
use logai_storage::UpsertPolicy;
use logai_types::{ClusterStatus, ErrorCluster, Severity, StatusChange, TriageError, UpsertOutcome};
use tracing::{debug, info};

use crate::fingerprint::Fingerprint;
use crate::severity::SeverityScorer;
use crate::{Result, SharedDb, status};

/// Scoring and re-open rules evaluated inside the upsert transaction.
struct OccurrencePolicy<'a> {
    scorer: &'a SeverityScorer,
    now: DateTime<Utc>,
}

impl UpsertPolicy for OccurrencePolicy<'_> {
    fn severity(&self, cluster: &ErrorCluster) -> Severity {
        self.scorer.score(cluster, self.now)
    }

    fn status_on_occurrence(&self, current: ClusterStatus) -> Option<ClusterStatus> {
        status::status_after_occurrence(current)
    }
}

#[derive(Clone)]
pub struct ClusterStore {
    db: SharedDb,
    scorer: Arc<SeverityScorer>,
}

impl ClusterStore {
    pub fn new(db: SharedDb, scorer: Arc<SeverityScorer>) -> Self {
        Self { db, scorer }
    }

    pub async fn upsert(
        &self,
        app_id: &str,
        fingerprint: &Fingerprint,
        occurred_at: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let policy = OccurrencePolicy {
            scorer: &self.scorer,
            now,
        };
        let outcome = {
            let db = self.db.lock().await;
            db.clusters().upsert(
                app_id,
                &fingerprint.key,
                &fingerprint.candidate,
                occurred_at,
                now,
                &policy,
            )?
        };

        if outcome.created {
            info!(
                "New cluster {} for app {} ({})",
                outcome.cluster.id,
                app_id,
                outcome.cluster.exception_class.as_deref().unwrap_or("unknown")
            );
        } else if outcome.reopened {
            info!(
                "Cluster {} reopened after a new occurrence (count {})",
                outcome.cluster.id, outcome.cluster.occurrence_count
            );
        } else {
            debug!(
                "Cluster {} now at {} occurrences",
                outcome.cluster.id, outcome.cluster.occurrence_count
            );
        }
        Ok(outcome)
    }

    pub async fn get(&self, cluster_id: &str) -> Result<ErrorCluster> {
        let db = self.db.lock().await;
        db.clusters()
            .get(cluster_id)?
            .ok_or_else(|| TriageError::not_found("cluster", cluster_id))
    }

    pub async fn list(&self, app_id: &str) -> Result<Vec<ErrorCluster>> {
        let db = self.db.lock().await;
        if !db.applications().exists(app_id)? {
            return Err(TriageError::not_found("application", app_id));
        }
        Ok(db.clusters().list_by_app(app_id)?)
    }

    /// Operator status change, recorded in the status history.
    pub async fn set_status(&self, cluster_id: &str, to: ClusterStatus) -> Result<ErrorCluster> {
        let db = self.db.lock().await;
        let current = db
            .clusters()
            .get(cluster_id)?
            .ok_or_else(|| TriageError::not_found("cluster", cluster_id))?;
        let Some(next) = status::operator_transition(current.status, to) else {
            return Ok(current);
        };
        let (cluster, _) = db.clusters().set_status(cluster_id, next, Utc::now())?;
        info!(
            "Cluster {} moved {} -> {} by operator",
            cluster_id,
            current.status.as_str(),
            next.as_str()
        );
        Ok(cluster)
    }

    pub async fn status_history(&self, cluster_id: &str) -> Result<Vec<StatusChange>> {
        let db = self.db.lock().await;
        if db.clusters().get(cluster_id)?.is_none() {
            return Err(TriageError::not_found("cluster", cluster_id));
        }
        Ok(db.clusters().status_history(cluster_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeverityConfig;
    use logai_storage::Database;
    use logai_test_utils::TestDb;
    use logai_types::ClusterCandidate;
    use tokio::sync::Mutex;

    fn fingerprint(key: &str, class: &str) -> Fingerprint {
        Fingerprint {
            key: key.to_string(),
            candidate: ClusterCandidate {
                exception_class: Some(class.to_string()),
                ..Default::default()
            },
        }
    }

    fn scorer() -> Arc<SeverityScorer> {
        Arc::new(SeverityScorer::new(SeverityConfig::default()))
    }

    async fn setup(test_db: &TestDb) -> (ClusterStore, String) {
        let db = Database::from_connection(test_db.open()).unwrap();
        let app = db.applications().create("svc", None, Utc::now()).unwrap();
        let store = ClusterStore::new(Arc::new(Mutex::new(db)), scorer());
        (store, app.id)
    }

    #[tokio::test]
    async fn concurrent_upserts_lose_no_updates() {
        let test_db = TestDb::new();
        let (store, app) = setup(&test_db).await;
        // A second store on its own connection competes for the same row.
        let other = ClusterStore::new(
            Arc::new(Mutex::new(Database::from_connection(test_db.open()).unwrap())),
            scorer(),
        );

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = if i % 2 == 0 { store.clone() } else { other.clone() };
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(&app, &fingerprint("fp", "java.lang.IllegalStateException"), Utc::now())
                    .await
                    .unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        let clusters = store.list(&app).await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].occurrence_count, 50);
        assert_eq!(clusters[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn reopen_rule_on_upsert_path() {
        let test_db = TestDb::new();
        let (store, app) = setup(&test_db).await;
        let resolved = store
            .upsert(&app, &fingerprint("r", "E"), Utc::now())
            .await
            .unwrap()
            .cluster;
        let ignored = store
            .upsert(&app, &fingerprint("i", "E"), Utc::now())
            .await
            .unwrap()
            .cluster;
        store.set_status(&resolved.id, ClusterStatus::Resolved).await.unwrap();
        store.set_status(&ignored.id, ClusterStatus::Ignored).await.unwrap();

        let again = store.upsert(&app, &fingerprint("r", "E"), Utc::now()).await.unwrap();
        assert!(again.reopened);
        assert_eq!(again.cluster.status, ClusterStatus::Open);

        let still = store.upsert(&app, &fingerprint("i", "E"), Utc::now()).await.unwrap();
        assert!(!still.reopened);
        assert_eq!(still.cluster.status, ClusterStatus::Ignored);
        assert_eq!(still.cluster.occurrence_count, 2);

        let history = store.status_history(&resolved.id).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let test_db = TestDb::new();
        let (store, _) = setup(&test_db).await;
        assert!(matches!(
            store.get("missing").await,
            Err(TriageError::NotFound { .. })
        ));
        assert!(matches!(
            store.set_status("missing", ClusterStatus::Resolved).await,
            Err(TriageError::NotFound { .. })
        ));
        assert!(matches!(
            store.list("no-app").await,
            Err(TriageError::NotFound { .. })
        ));
    }
}
