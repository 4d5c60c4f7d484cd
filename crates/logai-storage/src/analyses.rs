use chrono::{DateTime, Utc};
use logai_types::{AnalysisResult, Confidence, NewAnalysis};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::codec::{encode_ts, ts_col};
use crate::error::{Result, StorageError};

pub struct AnalysesDao<'a> {
    pub(crate) conn: &'a Connection,
}

const ANALYSIS_COLUMNS: &str = "id, cluster_id, explanation, root_cause, recommendation, confidence,
     model_used, tokens_used, raw_response, patch, patch_file_name, created_at";

fn map_analysis(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
    let confidence: String = row.get(5)?;
    Ok(AnalysisResult {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        explanation: row.get(2)?,
        root_cause: row.get(3)?,
        recommendation: row.get(4)?,
        confidence: Confidence::from_confidence(&confidence),
        model_used: row.get(6)?,
        tokens_used: row.get(7)?,
        raw_response: row.get(8)?,
        patch: row.get(9)?,
        patch_file_name: row.get(10)?,
        created_at: ts_col(row, 11)?,
    })
}

impl AnalysesDao<'_> {
    /// Appends a new analysis. Earlier analyses are never touched.
    pub fn insert(&self, analysis: &NewAnalysis, now: DateTime<Utc>) -> Result<AnalysisResult> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO analysis_results
             (id, cluster_id, explanation, root_cause, recommendation, confidence, model_used,
              tokens_used, raw_response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                analysis.cluster_id,
                analysis.explanation,
                analysis.root_cause,
                analysis.recommendation,
                analysis.confidence.as_str(),
                analysis.model_used,
                analysis.tokens_used,
                analysis.raw_response,
                encode_ts(&now),
            ],
        )?;
        self.require(&id)
    }

    pub fn get(&self, id: &str) -> Result<Option<AnalysisResult>> {
        let analysis = self
            .conn
            .query_row(
                &format!("SELECT {} FROM analysis_results WHERE id = ?1", ANALYSIS_COLUMNS),
                params![id],
                map_analysis,
            )
            .optional()?;
        Ok(analysis)
    }

    fn require(&self, id: &str) -> Result<AnalysisResult> {
        self.get(id)?.ok_or_else(|| StorageError::NotFound {
            entity: "analysis",
            id: id.to_string(),
        })
    }

    /// The current analysis is the newest one; rowid breaks same-millisecond ties.
    pub fn current(&self, cluster_id: &str) -> Result<Option<AnalysisResult>> {
        let analysis = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM analysis_results WHERE cluster_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    ANALYSIS_COLUMNS
                ),
                params![cluster_id],
                map_analysis,
            )
            .optional()?;
        Ok(analysis)
    }

    pub fn history(&self, cluster_id: &str) -> Result<Vec<AnalysisResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM analysis_results WHERE cluster_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            ANALYSIS_COLUMNS
        ))?;
        let rows = stmt.query_map(params![cluster_id], map_analysis)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn attach_patch(
        &self,
        analysis_id: &str,
        patch: &str,
        patch_file_name: &str,
    ) -> Result<AnalysisResult> {
        let rows = self.conn.execute(
            "UPDATE analysis_results SET patch = ?2, patch_file_name = ?3 WHERE id = ?1",
            params![analysis_id, patch, patch_file_name],
        )?;
        if rows == 0 {
            return Err(StorageError::NotFound {
                entity: "analysis",
                id: analysis_id.to_string(),
            });
        }
        self.require(analysis_id)
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

    fn new_analysis(cluster_id: &str, explanation: &str) -> NewAnalysis {
        NewAnalysis {
            cluster_id: cluster_id.to_string(),
            explanation: Some(explanation.to_string()),
            root_cause: None,
            recommendation: None,
            confidence: Confidence::High,
            model_used: Some("test-model".into()),
            tokens_used: Some(120),
            raw_response: Some("{}".into()),
        }
    }

    #[test]
    fn current_is_latest_and_history_is_kept() {
        let (db, cluster) = setup();
        let now = Utc::now();
        db.analyses().insert(&new_analysis(&cluster, "first"), now).unwrap();
        db.analyses().insert(&new_analysis(&cluster, "second"), now).unwrap();

        let current = db.analyses().current(&cluster).unwrap().unwrap();
        assert_eq!(current.explanation.as_deref(), Some("second"));
        assert_eq!(db.analyses().history(&cluster).unwrap().len(), 2);
    }

    #[test]
    fn patch_attaches_to_the_given_analysis() {
        let (db, cluster) = setup();
        let analysis = db
            .analyses()
            .insert(&new_analysis(&cluster, "x"), Utc::now())
            .unwrap();
        let updated = db
            .analyses()
            .attach_patch(&analysis.id, "--- a/X\n+++ b/X\n", "X")
            .unwrap();
        assert_eq!(updated.patch_file_name.as_deref(), Some("X"));
        assert_eq!(updated.explanation.as_deref(), Some("x"));
        assert!(matches!(
            db.analyses().attach_patch("nope", "p", "f"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn no_analysis_means_no_current() {
        let (db, cluster) = setup();
        assert!(db.analyses().current(&cluster).unwrap().is_none());
    }
}
