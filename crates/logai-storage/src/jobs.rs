use chrono::{DateTime, Duration, Utc};
use logai_types::{JobKind, JobStatus, TriageJob};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::codec::{encode_ts, enum_col, opt_ts_col, ts_col};
use crate::error::{Result, StorageError};

pub struct JobsDao<'a> {
    pub(crate) conn: &'a Connection,
}

const JOB_COLUMNS: &str =
    "id, cluster_id, kind, status, error, started_at, lease_expires_at, finished_at";

pub(crate) const LEASE_EXPIRED: &str = "lease expired before the job finished";

fn map_job(row: &Row<'_>) -> rusqlite::Result<TriageJob> {
    Ok(TriageJob {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        kind: enum_col(row, 2, "job kind", JobKind::from_kind)?,
        status: enum_col(row, 3, "job status", JobStatus::from_status)?,
        error: row.get(4)?,
        started_at: ts_col(row, 5)?,
        lease_expires_at: ts_col(row, 6)?,
        finished_at: opt_ts_col(row, 7)?,
    })
}

impl JobsDao<'_> {
    /// Take the lease for `(cluster_id, kind)` by inserting a running job.
    ///
    /// A running job whose lease has expired is failed first, so a crashed
    /// holder blocks others for at most `ttl`.
    pub fn acquire(
        &self,
        cluster_id: &str,
        kind: JobKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<TriageJob> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let now_ts = encode_ts(&now);

        let holder = tx
            .query_row(
                &format!(
                    "SELECT {} FROM triage_jobs WHERE cluster_id = ?1 AND kind = ?2 AND status = ?3",
                    JOB_COLUMNS
                ),
                params![cluster_id, kind.as_str(), JobStatus::Running.as_str()],
                map_job,
            )
            .optional()?;

        if let Some(holder) = holder {
            if holder.lease_expires_at > now {
                return Err(StorageError::LeaseHeld {
                    cluster_id: cluster_id.to_string(),
                    kind: kind.as_str().to_string(),
                    holder: holder.id,
                });
            }
            tx.execute(
                "UPDATE triage_jobs SET status = ?2, error = ?3, finished_at = ?4 WHERE id = ?1",
                params![holder.id, JobStatus::Failed.as_str(), LEASE_EXPIRED, now_ts],
            )?;
        }

        let id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO triage_jobs (id, cluster_id, kind, status, started_at, lease_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                cluster_id,
                kind.as_str(),
                JobStatus::Running.as_str(),
                now_ts,
                encode_ts(&(now + ttl))
            ],
        )?;
        let job = tx.query_row(
            &format!("SELECT {} FROM triage_jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            map_job,
        )?;
        tx.commit()?;
        Ok(job)
    }

    pub fn complete(&self, id: &str, now: DateTime<Utc>) -> Result<TriageJob> {
        self.finish(id, JobStatus::Completed, None, now)
    }

    pub fn fail(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<TriageJob> {
        self.finish(id, JobStatus::Failed, Some(error), now)
    }

    fn finish(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TriageJob> {
        let rows = self.conn.execute(
            "UPDATE triage_jobs SET status = ?2, error = ?3, finished_at = ?4
             WHERE id = ?1 AND status = ?5",
            params![
                id,
                status.as_str(),
                error,
                encode_ts(&now),
                JobStatus::Running.as_str()
            ],
        )?;
        let job = self.get(id)?.ok_or_else(|| StorageError::NotFound {
            entity: "job",
            id: id.to_string(),
        })?;
        if rows == 0 {
            return Err(StorageError::InvalidTransition {
                entity: "job",
                id: id.to_string(),
                from: job.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Result<Option<TriageJob>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM triage_jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                map_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Jobs for a cluster, newest first.
    pub fn list_for_cluster(&self, cluster_id: &str) -> Result<Vec<TriageJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM triage_jobs WHERE cluster_id = ?1 ORDER BY started_at DESC, rowid DESC",
            JOB_COLUMNS
        ))?;
        let rows = stmt.query_map(params![cluster_id], map_job)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, UpsertPolicy};
    use logai_test_utils::TestDb;
    use logai_types::{ClusterCandidate, ClusterStatus, ErrorCluster, Severity};

    struct Flat;

    impl UpsertPolicy for Flat {
        fn severity(&self, _cluster: &ErrorCluster) -> Severity {
            Severity::Low
        }

        fn status_on_occurrence(&self, _current: ClusterStatus) -> Option<ClusterStatus> {
            None
        }
    }

    fn setup() -> (Database, String) {
        let db = Database::from_connection(TestDb::new().into_connection()).unwrap();
        let app = db.applications().create("svc", None, Utc::now()).unwrap();
        let cluster = db
            .clusters()
            .upsert(&app.id, "fp", &ClusterCandidate::default(), Utc::now(), Utc::now(), &Flat)
            .unwrap()
            .cluster;
        (db, cluster.id)
    }

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let (db, cluster) = setup();
        let now = Utc::now();
        let ttl = Duration::minutes(5);
        let job = db.jobs().acquire(&cluster, JobKind::Analysis, now, ttl).unwrap();
        assert_eq!(job.status, JobStatus::Running);

        let busy = db.jobs().acquire(&cluster, JobKind::Analysis, now, ttl);
        assert!(matches!(busy, Err(StorageError::LeaseHeld { .. })));

        // Leases are per kind.
        db.jobs().acquire(&cluster, JobKind::Patch, now, ttl).unwrap();

        db.jobs().complete(&job.id, now).unwrap();
        db.jobs().acquire(&cluster, JobKind::Analysis, now, ttl).unwrap();
    }

    #[test]
    fn expired_lease_is_taken_over() {
        let (db, cluster) = setup();
        let start = Utc::now() - Duration::minutes(10);
        let stale = db
            .jobs()
            .acquire(&cluster, JobKind::Analysis, start, Duration::minutes(5))
            .unwrap();

        let fresh = db
            .jobs()
            .acquire(&cluster, JobKind::Analysis, Utc::now(), Duration::minutes(5))
            .unwrap();
        assert_ne!(fresh.id, stale.id);

        let stale = db.jobs().get(&stale.id).unwrap().unwrap();
        assert_eq!(stale.status, JobStatus::Failed);
        assert_eq!(stale.error.as_deref(), Some(LEASE_EXPIRED));
    }

    #[test]
    fn finished_jobs_cannot_finish_again() {
        let (db, cluster) = setup();
        let job = db
            .jobs()
            .acquire(&cluster, JobKind::Patch, Utc::now(), Duration::minutes(1))
            .unwrap();
        let failed = db.jobs().fail(&job.id, "upstream down", Utc::now()).unwrap();
        assert_eq!(failed.error.as_deref(), Some("upstream down"));
        assert!(matches!(
            db.jobs().complete(&job.id, Utc::now()),
            Err(StorageError::InvalidTransition { .. })
        ));
        assert_eq!(db.jobs().list_for_cluster(&cluster).unwrap().len(), 1);
    }
}
