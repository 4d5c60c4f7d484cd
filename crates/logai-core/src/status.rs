//! Cluster Status State Machine.
//!
//! Operator transitions between the four states are unconditional. The only
//! automatic transition is RESOLVED -> OPEN when a resolved error recurs;
//! IGNORED and ACKNOWLEDGED clusters keep their status on new occurrences.

use logai_types::ClusterStatus;

/// Operator-requested change. Any distinct pair of states is allowed;
/// asking for the current status is a no-op.
pub fn operator_transition(from: ClusterStatus, to: ClusterStatus) -> Option<ClusterStatus> {
    (from != to).then_some(to)
}

/// Status a cluster takes when a new occurrence is counted, if it changes.
pub fn status_after_occurrence(current: ClusterStatus) -> Option<ClusterStatus> {
    match current {
        ClusterStatus::Resolved => Some(ClusterStatus::Open),
        ClusterStatus::Open | ClusterStatus::Acknowledged | ClusterStatus::Ignored => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ClusterStatus; 4] = [
        ClusterStatus::Open,
        ClusterStatus::Acknowledged,
        ClusterStatus::Resolved,
        ClusterStatus::Ignored,
    ];

    #[test]
    fn operator_transitions_are_unguarded() {
        for from in ALL {
            for to in ALL {
                let expected = if from == to { None } else { Some(to) };
                assert_eq!(operator_transition(from, to), expected, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn only_resolved_reopens() {
        assert_eq!(
            status_after_occurrence(ClusterStatus::Resolved),
            Some(ClusterStatus::Open)
        );
        assert_eq!(status_after_occurrence(ClusterStatus::Ignored), None);
        assert_eq!(status_after_occurrence(ClusterStatus::Acknowledged), None);
        assert_eq!(status_after_occurrence(ClusterStatus::Open), None);
    }
}
