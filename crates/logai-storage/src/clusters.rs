use chrono::{DateTime, Utc};
use logai_types::{
    ClusterCandidate, ClusterStatus, ErrorCluster, Severity, StatusChange, StatusChangeReason,
    UpsertOutcome,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::codec::{encode_ts, enum_col, ts_col};
use crate::error::{Result, StorageError};

/// Rules applied inside the upsert transaction. Kept as a trait so the
/// scoring and status policy live with the rest of the triage logic.
pub trait UpsertPolicy {
    /// Severity for the cluster as it stands after the occurrence was counted.
    fn severity(&self, cluster: &ErrorCluster) -> Severity;

    /// Status a cluster moves to when a new occurrence arrives, if it moves at all.
    fn status_on_occurrence(&self, current: ClusterStatus) -> Option<ClusterStatus>;
}

pub struct ClustersDao<'a> {
    pub(crate) conn: &'a Connection,
}

const CLUSTER_COLUMNS: &str = "id, app_id, fingerprint, exception_class, message_pattern,
     primary_file, primary_class, primary_method, primary_line, sample_message,
     sample_stack_trace, occurrence_count, severity, status, first_seen, last_seen,
     created_at, updated_at";

fn map_cluster(row: &Row<'_>) -> rusqlite::Result<ErrorCluster> {
    Ok(ErrorCluster {
        id: row.get(0)?,
        app_id: row.get(1)?,
        fingerprint: row.get(2)?,
        exception_class: row.get(3)?,
        message_pattern: row.get(4)?,
        primary_file: row.get(5)?,
        primary_class: row.get(6)?,
        primary_method: row.get(7)?,
        primary_line: row.get(8)?,
        sample_message: row.get(9)?,
        sample_stack_trace: row.get(10)?,
        occurrence_count: row.get(11)?,
        severity: enum_col(row, 12, "severity", Severity::from_severity)?,
        status: enum_col(row, 13, "status", ClusterStatus::from_status)?,
        first_seen: ts_col(row, 14)?,
        last_seen: ts_col(row, 15)?,
        created_at: ts_col(row, 16)?,
        updated_at: ts_col(row, 17)?,
    })
}

fn map_status_change(row: &Row<'_>) -> rusqlite::Result<StatusChange> {
    Ok(StatusChange {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        from_status: enum_col(row, 2, "status", ClusterStatus::from_status)?,
        to_status: enum_col(row, 3, "status", ClusterStatus::from_status)?,
        reason: enum_col(row, 4, "reason", StatusChangeReason::from_reason)?,
        created_at: ts_col(row, 5)?,
    })
}

fn select_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<ErrorCluster>> {
    conn.query_row(
        &format!("SELECT {} FROM error_clusters WHERE id = ?1", CLUSTER_COLUMNS),
        params![id],
        map_cluster,
    )
    .optional()
}

fn insert_status_change(
    conn: &Connection,
    cluster_id: &str,
    from: ClusterStatus,
    to: ClusterStatus,
    reason: StatusChangeReason,
    now: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cluster_status_history (cluster_id, from_status, to_status, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![cluster_id, from.as_str(), to.as_str(), reason.as_str(), now],
    )?;
    Ok(())
}

impl ClustersDao<'_> {
    /// Count one occurrence of `fingerprint` for `app_id`, creating the cluster
    /// on first sight.
    ///
    /// Runs in an IMMEDIATE transaction so the write lock is taken before the
    /// existing row is read, and the counter is bumped with
    /// `occurrence_count + 1` in SQL rather than a value computed in Rust. This is
    /// the one place concurrent scans must synchronize; a read-modify-write
    /// here would lose updates.
    pub fn upsert(
        &self,
        app_id: &str,
        fingerprint: &str,
        candidate: &ClusterCandidate,
        occurred_at: DateTime<Utc>,
        now: DateTime<Utc>,
        policy: &dyn UpsertPolicy,
    ) -> Result<UpsertOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let occurred = encode_ts(&occurred_at);
        let now_ts = encode_ts(&now);

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {} FROM error_clusters WHERE app_id = ?1 AND fingerprint = ?2",
                    CLUSTER_COLUMNS
                ),
                params![app_id, fingerprint],
                map_cluster,
            )
            .optional()?;

        let (cluster_id, created, reopened) = match existing {
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO error_clusters
                     (id, app_id, fingerprint, exception_class, message_pattern, primary_file,
                      primary_class, primary_method, primary_line, sample_message,
                      sample_stack_trace, occurrence_count, severity, status, first_seen,
                      last_seen, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?13, ?14, ?14, ?15, ?15)",
                    params![
                        id,
                        app_id,
                        fingerprint,
                        candidate.exception_class,
                        candidate.message_pattern,
                        candidate.location.file,
                        candidate.location.class,
                        candidate.location.method,
                        candidate.location.line,
                        candidate.sample_message,
                        candidate.sample_stack_trace,
                        Severity::Low.as_str(),
                        ClusterStatus::Open.as_str(),
                        occurred,
                        now_ts,
                    ],
                )?;
                (id, true, false)
            }
            Some(current) => {
                let next_status = policy
                    .status_on_occurrence(current.status)
                    .filter(|next| *next != current.status);
                tx.execute(
                    "UPDATE error_clusters
                     SET occurrence_count = occurrence_count + 1,
                         last_seen = MAX(last_seen, ?2),
                         status = COALESCE(?3, status),
                         updated_at = ?4
                     WHERE id = ?1",
                    params![
                        current.id,
                        occurred,
                        next_status.map(ClusterStatus::as_str),
                        now_ts
                    ],
                )?;
                if let Some(next) = next_status {
                    insert_status_change(
                        &tx,
                        &current.id,
                        current.status,
                        next,
                        StatusChangeReason::Reopened,
                        &now_ts,
                    )?;
                }
                (current.id, false, next_status.is_some())
            }
        };

        let mut cluster = select_by_id(&tx, &cluster_id)?.ok_or_else(|| StorageError::NotFound {
            entity: "cluster",
            id: cluster_id.clone(),
        })?;

        // Severity only ever escalates on the upsert path.
        let severity = cluster.severity.max(policy.severity(&cluster));
        if severity != cluster.severity {
            tx.execute(
                "UPDATE error_clusters SET severity = ?2 WHERE id = ?1",
                params![cluster.id, severity.as_str()],
            )?;
            cluster.severity = severity;
        }

        tx.commit()?;
        Ok(UpsertOutcome {
            cluster,
            created,
            reopened,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<ErrorCluster>> {
        Ok(select_by_id(self.conn, id)?)
    }

    /// Clusters for an application, most frequent first.
    pub fn list_by_app(&self, app_id: &str) -> Result<Vec<ErrorCluster>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM error_clusters WHERE app_id = ?1
             ORDER BY occurrence_count DESC, last_seen DESC",
            CLUSTER_COLUMNS
        ))?;
        let rows = stmt.query_map(params![app_id], map_cluster)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Operator status change. A no-op when the status is unchanged; otherwise
    /// the change is written to the status history.
    pub fn set_status(
        &self,
        id: &str,
        to: ClusterStatus,
        now: DateTime<Utc>,
    ) -> Result<(ErrorCluster, Option<StatusChange>)> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = select_by_id(&tx, id)?.ok_or_else(|| StorageError::NotFound {
            entity: "cluster",
            id: id.to_string(),
        })?;
        if current.status == to {
            tx.commit()?;
            return Ok((current, None));
        }

        let now_ts = encode_ts(&now);
        tx.execute(
            "UPDATE error_clusters SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, to.as_str(), now_ts],
        )?;
        insert_status_change(
            &tx,
            id,
            current.status,
            to,
            StatusChangeReason::Operator,
            &now_ts,
        )?;
        let change = tx.query_row(
            "SELECT id, cluster_id, from_status, to_status, reason, created_at
             FROM cluster_status_history WHERE id = ?1",
            params![tx.last_insert_rowid()],
            map_status_change,
        )?;
        let updated = select_by_id(&tx, id)?.ok_or_else(|| StorageError::NotFound {
            entity: "cluster",
            id: id.to_string(),
        })?;
        tx.commit()?;
        Ok((updated, Some(change)))
    }

    pub fn status_history(&self, cluster_id: &str) -> Result<Vec<StatusChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, cluster_id, from_status, to_status, reason, created_at
             FROM cluster_status_history WHERE cluster_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![cluster_id], map_status_change)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
