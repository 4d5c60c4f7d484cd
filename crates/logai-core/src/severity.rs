//! Severity Scorer: tier from occurrence count, exception class and recency.

use chrono::{DateTime, Duration, Utc};
use logai_types::{ErrorCluster, Severity};

use crate::config::SeverityConfig;

#[derive(Debug, Clone)]
pub struct SeverityScorer {
    config: SeverityConfig,
}

impl SeverityScorer {
    pub fn new(config: SeverityConfig) -> Self {
        Self { config }
    }

    /// Tier for `cluster` as seen at `now`. Callers persisting the result take
    /// the max with the stored tier; this function alone may return a lower
    /// tier once a cluster goes quiet.
    pub fn score(&self, cluster: &ErrorCluster, now: DateTime<Utc>) -> Severity {
        let count = cluster.occurrence_count;
        let dangerous = cluster
            .exception_class
            .as_deref()
            .is_some_and(|class| self.config.is_dangerous(class));
        let recent = now - cluster.last_seen <= Duration::hours(self.config.recency_window_hours);

        if count >= self.config.critical_threshold
            || (dangerous && count >= self.config.dangerous_critical_threshold)
        {
            Severity::Critical
        } else if count >= self.config.high_threshold || dangerous {
            Severity::High
        } else if count >= self.config.medium_threshold && recent {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logai_types::ClusterStatus;

    fn cluster(count: i64, class: &str, last_seen: DateTime<Utc>) -> ErrorCluster {
        ErrorCluster {
            id: "c1".into(),
            app_id: "a1".into(),
            fingerprint: "fp".into(),
            exception_class: Some(class.into()),
            message_pattern: None,
            primary_file: None,
            primary_class: None,
            primary_method: None,
            primary_line: None,
            sample_message: None,
            sample_stack_trace: None,
            occurrence_count: count,
            severity: Severity::Low,
            status: ClusterStatus::Open,
            first_seen: last_seen,
            last_seen,
            created_at: last_seen,
            updated_at: last_seen,
        }
    }

    fn scorer() -> SeverityScorer {
        SeverityScorer::new(SeverityConfig::default())
    }

    #[test]
    fn count_thresholds() {
        let now = Utc::now();
        let npe = "java.lang.NullPointerException";
        assert_eq!(scorer().score(&cluster(1, npe, now), now), Severity::Low);
        assert_eq!(scorer().score(&cluster(4, npe, now), now), Severity::Low);
        assert_eq!(scorer().score(&cluster(5, npe, now), now), Severity::Medium);
        assert_eq!(scorer().score(&cluster(20, npe, now), now), Severity::High);
        assert_eq!(scorer().score(&cluster(99, npe, now), now), Severity::High);
        assert_eq!(scorer().score(&cluster(100, npe, now), now), Severity::Critical);
    }

    #[test]
    fn dangerous_classes_start_high() {
        let now = Utc::now();
        let oom = "java.lang.OutOfMemoryError";
        assert_eq!(scorer().score(&cluster(1, oom, now), now), Severity::High);
        assert_eq!(scorer().score(&cluster(20, oom, now), now), Severity::Critical);
    }

    #[test]
    fn medium_requires_recent_activity() {
        let now = Utc::now();
        let stale = cluster(7, "java.lang.IllegalStateException", now - Duration::hours(48));
        assert_eq!(scorer().score(&stale, now), Severity::Low);
    }

    #[test]
    fn more_occurrences_never_score_lower() {
        let now = Utc::now();
        let mut last = Severity::Low;
        for count in 1..=150 {
            let tier = scorer().score(&cluster(count, "com.acme.DeadlockException", now), now);
            assert!(tier >= last, "{} dropped to {:?}", count, tier);
            last = tier;
        }
    }

    #[test]
    fn thresholds_are_configurable() {
        let now = Utc::now();
        let scorer = SeverityScorer::new(SeverityConfig {
            medium_threshold: 2,
            high_threshold: 3,
            critical_threshold: 4,
            ..SeverityConfig::default()
        });
        assert_eq!(scorer.score(&cluster(2, "E", now), now), Severity::Medium);
        assert_eq!(scorer.score(&cluster(4, "E", now), now), Severity::Critical);
    }
}
