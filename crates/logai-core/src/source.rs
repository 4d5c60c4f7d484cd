//! Reads the file behind a cluster's top frame from an application's
//! checkout roots, for patch requests that arrive without code.

use std::path::{Path, PathBuf};

use logai_types::ErrorCluster;
use tracing::debug;

/// Larger files are skipped rather than read.
pub const MAX_SOURCE_BYTES: u64 = 1024 * 1024;

const SOURCE_DIRS: &[&str] = &["", "src/main/java", "src/main/kotlin", "src"];

/// Paths, relative to a root, where the cluster's file may live.
///
/// Both the file name and the package come from log lines, so anything that
/// could step outside a root is refused.
pub fn candidate_paths(cluster: &ErrorCluster) -> Vec<PathBuf> {
    let Some(file) = cluster.primary_file.as_deref().filter(|f| is_plain_segment(f)) else {
        return Vec::new();
    };
    let package: Option<PathBuf> = cluster
        .primary_class
        .as_deref()
        .map(|class| class.split('$').next().unwrap_or(class))
        .and_then(|class| class.rsplit_once('.'))
        .map(|(package, _)| package.split('.').collect::<Vec<_>>())
        .filter(|segments| segments.iter().all(|s| is_plain_segment(s)))
        .map(|segments| segments.iter().collect());

    let mut out = Vec::new();
    for dir in SOURCE_DIRS {
        if let Some(package) = &package {
            out.push(Path::new(dir).join(package).join(file));
        }
    }
    out.push(PathBuf::from(file));
    out
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

/// First readable candidate under the first root that has one.
pub async fn load_source(roots: &[String], cluster: &ErrorCluster) -> Option<(PathBuf, String)> {
    let candidates = candidate_paths(cluster);
    for root in roots.iter().map(Path::new).filter(|r| r.is_absolute()) {
        for relative in &candidates {
            let path = root.join(relative);
            let Ok(meta) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            if meta.len() > MAX_SOURCE_BYTES {
                debug!("Skipping {} ({} bytes)", path.display(), meta.len());
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Some((path, text)),
                Err(err) => debug!("Could not read {}: {}", path.display(), err),
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logai_types::{ClusterStatus, Severity};

    fn cluster(file: Option<&str>, class: Option<&str>) -> ErrorCluster {
        let now = Utc::now();
        ErrorCluster {
            id: "c1".to_string(),
            app_id: "a1".to_string(),
            fingerprint: "fp".to_string(),
            exception_class: None,
            message_pattern: None,
            primary_file: file.map(String::from),
            primary_class: class.map(String::from),
            primary_method: None,
            primary_line: None,
            sample_message: None,
            sample_stack_trace: None,
            occurrence_count: 1,
            severity: Severity::Low,
            status: ClusterStatus::Open,
            first_seen: now,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn package_path_comes_from_the_class() {
        let paths = candidate_paths(&cluster(Some("OrderService.java"), Some("com.acme.OrderService$1")));
        assert!(paths.contains(&PathBuf::from("src/main/java/com/acme/OrderService.java")));
        assert!(paths.contains(&PathBuf::from("com/acme/OrderService.java")));
        assert_eq!(paths.last(), Some(&PathBuf::from("OrderService.java")));
    }

    #[test]
    fn traversal_in_frame_data_is_refused() {
        assert!(candidate_paths(&cluster(Some("../../etc/passwd"), None)).is_empty());
        assert!(candidate_paths(&cluster(Some(".."), None)).is_empty());
        let paths = candidate_paths(&cluster(Some("A.java"), Some("com...A")));
        assert_eq!(paths, vec![PathBuf::from("A.java")]);
    }

    #[tokio::test]
    async fn first_root_with_the_file_wins() {
        let empty = tempfile::tempdir().unwrap();
        let checkout = tempfile::tempdir().unwrap();
        let dir = checkout.path().join("src/main/java/com/acme");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("OrderService.java"), "class OrderService {}").unwrap();

        let roots = vec![
            "relative/ignored".to_string(),
            empty.path().display().to_string(),
            checkout.path().display().to_string(),
        ];
        let target = cluster(Some("OrderService.java"), Some("com.acme.OrderService"));
        let (path, text) = load_source(&roots, &target).await.unwrap();
        assert_eq!(path, dir.join("OrderService.java"));
        assert_eq!(text, "class OrderService {}");

        assert!(load_source(&roots[..2], &target).await.is_none());
    }

    #[tokio::test]
    async fn oversized_files_are_skipped() {
        let checkout = tempfile::tempdir().unwrap();
        let big = vec![b'x'; MAX_SOURCE_BYTES as usize + 1];
        std::fs::write(checkout.path().join("Big.java"), big).unwrap();
        let roots = vec![checkout.path().display().to_string()];
        assert!(load_source(&roots, &cluster(Some("Big.java"), None)).await.is_none());
    }
}
