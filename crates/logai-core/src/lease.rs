//! Per-cluster leases for analysis and patch generation.
//!
//! A lease is a running row in the triage jobs table; the store refuses a
//! second running row for the same `(cluster, kind)`. The guard finishes the
//! row explicitly on success or failure, and its `Drop` fails it when the
//! owning future is cancelled, so a lease is never left held past its expiry.

use std::future::Future;

use chrono::{Duration, Utc};
use logai_types::{JobKind, TriageError, TriageJob};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::{Result, SharedDb};

pub const CANCELLED_REASON: &str = "cancelled before completion";

pub struct LeaseGuard {
    db: SharedDb,
    job: TriageJob,
    finished: bool,
}

impl LeaseGuard {
    pub async fn acquire(
        db: &SharedDb,
        cluster_id: &str,
        kind: JobKind,
        ttl: Duration,
    ) -> Result<Self> {
        let job = {
            let db = db.lock().await;
            db.jobs().acquire(cluster_id, kind, Utc::now(), ttl)
        };
        match job {
            Ok(job) => {
                debug!("Lease {} taken for {} on cluster {}", job.id, kind.as_str(), cluster_id);
                Ok(Self {
                    db: db.clone(),
                    job,
                    finished: false,
                })
            }
            Err(err) => {
                let err = TriageError::from(err);
                if let TriageError::ConcurrencyConflict { .. } = err {
                    warn!("Rejected {} for cluster {}: already in progress", kind.as_str(), cluster_id);
                }
                Err(err)
            }
        }
    }

    pub fn job(&self) -> &TriageJob {
        &self.job
    }

    /// Time left before another caller may take the lease over.
    pub fn remaining(&self) -> std::time::Duration {
        (self.job.lease_expires_at - Utc::now())
            .to_std()
            .unwrap_or_default()
    }

    /// Run `work` while the lease is still ours. Work that outlives the
    /// lease is abandoned with `UpstreamUnavailable`, so two holders never
    /// overlap.
    pub async fn bound<T>(&self, what: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.remaining(), work).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("{} for job {} outlived its lease; abandoning it", what, self.job.id);
                Err(TriageError::UpstreamUnavailable(format!(
                    "{} did not finish before its lease expired",
                    what
                )))
            }
        }
    }

    pub async fn complete(mut self) -> Result<()> {
        self.finished = true;
        let db = self.db.lock().await;
        db.jobs().complete(&self.job.id, Utc::now())?;
        Ok(())
    }

    /// Release the lease, keeping `error` verbatim on the job row.
    pub async fn fail(mut self, error: &str) -> Result<()> {
        self.finished = true;
        let db = self.db.lock().await;
        db.jobs().fail(&self.job.id, error, Utc::now())?;
        Ok(())
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!("Lease {} dropped outside a runtime; it will expire", self.job.id);
            return;
        };
        let db = self.db.clone();
        let job_id = self.job.id.clone();
        handle.spawn(async move {
            let db = db.lock().await;
            if let Err(err) = db.jobs().fail(&job_id, CANCELLED_REASON, Utc::now()) {
                warn!("Failed to release lease {}: {}", job_id, err);
            }
        });
    }
}
