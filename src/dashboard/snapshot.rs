//! In-memory view of the watched change-log.
//!
//! A [`Snapshot`] is an immutable, ordered list of issues shared behind an
//! `Arc`. The [`SnapshotCache`] swaps whole snapshots; it never merges or
//! patches one in place.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use super::models::Issue;
use crate::errors::SnapshotError;

/// The complete set of issues parsed from one read of the log, in file order.
pub type Snapshot = Arc<Vec<Issue>>;

/// Holds the most recently parsed snapshot.
///
/// Reads clone an `Arc` and replacements swap it, so readers never see a
/// half-built snapshot. Cloning the cache clones the handle, not the data.
#[derive(Clone)]
pub struct SnapshotCache {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, snapshot: Snapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Receiver that is marked changed on every [`replace`](Self::replace).
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse newline-delimited JSON records.
///
/// Blank lines are skipped. Any malformed line, or an id seen twice, fails
/// the whole parse; line numbers in errors are 1-based.
pub fn parse_issues(content: &str) -> Result<Vec<Issue>, SnapshotError> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let issue: Issue = serde_json::from_str(line).map_err(|source| {
            SnapshotError::MalformedLine {
                line: idx + 1,
                source,
            }
        })?;
        if !seen.insert(issue.id.clone()) {
            return Err(SnapshotError::DuplicateId {
                line: idx + 1,
                id: issue.id,
            });
        }
        issues.push(issue);
    }

    Ok(issues)
}

/// Read and parse the log at `path`. A missing file is an empty snapshot.
pub async fn load_issues(path: &Path) -> Result<Vec<Issue>, SnapshotError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => parse_issues(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_preserves_file_order() {
        let content = "{\"id\":\"bd-2\",\"title\":\"B\"}\n{\"id\":\"bd-1\",\"title\":\"A\"}\n";
        let issues = parse_issues(content).unwrap();
        let ids: Vec<_> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["bd-2", "bd-1"]);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let content = r#"{"id":"bd-1","title":"A","priority":0,"labels":["x"]}
{"id":"bd-2","title":"B","status":"closed","closed_at":"2025-01-02T03:04:05Z"}"#;
        assert_eq!(parse_issues(content).unwrap(), parse_issues(content).unwrap());
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let content = "\n{\"id\":\"bd-1\",\"title\":\"A\"}\n\n   \n{\"id\":\"bd-2\",\"title\":\"B\"}\n\n";
        assert_eq!(parse_issues(content).unwrap().len(), 2);
        assert!(parse_issues("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_line_reports_line_number() {
        let content = "{\"id\":\"bd-1\",\"title\":\"A\"}\n\n{\"id\":\"bd-2\",\n";
        match parse_issues(content) {
            Err(SnapshotError::MalformedLine { line, .. }) => assert_eq!(line, 3),
            other => panic!("Expected MalformedLine, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_accepts_statuses_and_types_it_does_not_know() {
        let content = concat!(
            "{\"id\":\"bd-1\",\"title\":\"A\"}\n",
            "{\"id\":\"bd-2\",\"title\":\"B\",\"status\":\"deferred\",\"issue_type\":\"message\"}\n",
        );
        let issues = parse_issues(content).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].status.as_str(), "deferred");
        assert_eq!(issues[1].issue_type.as_str(), "message");
    }

    #[test]
    fn test_parse_rejects_duplicate_ids() {
        let content = "{\"id\":\"bd-1\",\"title\":\"A\"}\n{\"id\":\"bd-1\",\"title\":\"again\"}\n";
        match parse_issues(content) {
            Err(SnapshotError::DuplicateId { line, id }) => {
                assert_eq!(line, 2);
                assert_eq!(id, "bd-1");
            }
            other => panic!("Expected DuplicateId, got {:?}", other),
        }
    }

    #[test]
    fn test_cache_starts_empty_and_swaps_whole_snapshots() {
        let cache = SnapshotCache::new();
        assert!(cache.current().is_empty());

        let first: Snapshot = Arc::new(vec![Issue::new("bd-1", "A")]);
        cache.replace(first.clone());
        assert!(Arc::ptr_eq(&cache.current(), &first));

        let second: Snapshot = Arc::new(vec![Issue::new("bd-1", "A"), Issue::new("bd-2", "B")]);
        cache.replace(second.clone());
        assert!(Arc::ptr_eq(&cache.current(), &second));
        // Earlier readers keep their own view.
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_clones_share_the_same_cache() {
        let cache = SnapshotCache::new();
        let other = cache.clone();
        cache.replace(Arc::new(vec![Issue::new("bd-9", "Z")]));
        assert_eq!(other.current()[0].id, "bd-9");
    }

    #[tokio::test]
    async fn test_subscribers_observe_replacements() {
        let cache = SnapshotCache::new();
        let mut rx = cache.subscribe();
        cache.replace(Arc::new(vec![Issue::new("bd-1", "A")]));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let issues = load_issues(&dir.path().join("issues.jsonl")).await.unwrap();
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn test_load_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        std::fs::write(&path, "{\"id\":\"bd-1\",\"title\":\"A\"}\n").unwrap();
        let issues = load_issues(&path).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "A");
    }
}
