//! Dependency edges read straight from bd's SQLite store.
//!
//! The database is discovered per call (first `*.db` in `.beads`, by name),
//! opened read-only on the blocking pool, and dropped before the call
//! returns. Related issues are resolved against the in-memory snapshot
//! rather than by asking bd about each one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};
use tracing::debug;

use super::models::{DependencyEdge, DependencyType, Issue};
use super::watcher::BEADS_DIR;
use crate::errors::DependencyError;

/// One row of bd's `dependencies` table: `issue_id` depends on `depends_on_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRow {
    pub issue_id: String,
    pub depends_on_id: String,
    pub dep_type: DependencyType,
}

/// Async-safe access to the bd database.
#[derive(Debug, Clone)]
pub struct DependencyStore {
    workspace: PathBuf,
}

impl DependencyStore {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Run `f` against a fresh read-only connection on a blocking thread.
    /// Returns `Ok(None)` when the workspace has no database.
    async fn call<F, R>(&self, f: F) -> Result<Option<R>, DependencyError>
    where
        F: FnOnce(&Connection) -> Result<R, DependencyError> + Send + 'static,
        R: Send + 'static,
    {
        let workspace = self.workspace.clone();
        tokio::task::spawn_blocking(move || {
            let Some(path) = discover_database(&workspace)? else {
                return Ok(None);
            };
            let conn = open_read_only(&path)?;
            f(&conn).map(Some)
        })
        .await
        .map_err(|_| DependencyError::TaskPanicked)?
    }

    /// Edges touching `id` in either direction.
    pub async fn edges_for(&self, id: &str) -> Result<Vec<EdgeRow>, DependencyError> {
        let id = id.to_string();
        let rows = self
            .call(move |conn| {
                query_edges(
                    conn,
                    "SELECT issue_id, depends_on_id, type FROM dependencies \
                     WHERE issue_id = ?1 OR depends_on_id = ?1",
                    params![id],
                )
            })
            .await?;
        Ok(rows.unwrap_or_default())
    }

    pub async fn all_edges(&self) -> Result<Vec<EdgeRow>, DependencyError> {
        let rows = self
            .call(|conn| {
                query_edges(
                    conn,
                    "SELECT issue_id, depends_on_id, type FROM dependencies",
                    params![],
                )
            })
            .await?;
        Ok(rows.unwrap_or_default())
    }
}

/// First `*.db` file in `<workspace>/.beads`, sorted by file name.
pub fn discover_database(workspace: &Path) -> Result<Option<PathBuf>, DependencyError> {
    let dir = workspace.join(BEADS_DIR);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(DependencyError::Discover { dir, source }),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| DependencyError::Discover {
                dir: dir.clone(),
                source,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "db") {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

pub fn open_read_only(path: &Path) -> Result<Connection, DependencyError> {
    let open_err = |source| DependencyError::Open {
        path: path.to_path_buf(),
        source,
    };
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(open_err)?;
    conn.pragma_update(None, "query_only", true)
        .map_err(open_err)?;
    Ok(conn)
}

fn query_edges(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<EdgeRow>, DependencyError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut edges = Vec::new();
    for row in rows {
        let (issue_id, depends_on_id, raw_type) = row?;
        match raw_type.parse::<DependencyType>() {
            Ok(dep_type) => edges.push(EdgeRow {
                issue_id,
                depends_on_id,
                dep_type,
            }),
            Err(_) => debug!(
                issue = %issue_id,
                depends_on = %depends_on_id,
                dep_type = %raw_type,
                "skipping edge with unknown type"
            ),
        }
    }
    Ok(edges)
}

// ── Enrichment ────────────────────────────────────────────────────────

/// Attach `depends_on` / `depended_by` to `issue`, resolving related issues
/// in `snapshot`. Edges to issues missing from the snapshot are dropped, and
/// an empty direction is left as `None`.
pub fn enrich_issue(issue: Issue, rows: &[EdgeRow], snapshot: &[Issue]) -> Issue {
    let by_id = index(snapshot);
    attach(issue, rows, &by_id)
}

/// Enrich every issue in `issues` from one pass over `rows`.
pub fn enrich_all(issues: &[Issue], rows: &[EdgeRow]) -> Vec<Issue> {
    let by_id = index(issues);
    issues
        .iter()
        .map(|issue| attach(issue.clone(), rows, &by_id))
        .collect()
}

fn index(issues: &[Issue]) -> HashMap<&str, &Issue> {
    issues.iter().map(|i| (i.id.as_str(), i)).collect()
}

fn attach(mut issue: Issue, rows: &[EdgeRow], by_id: &HashMap<&str, &Issue>) -> Issue {
    let edge = |related: &str, dep_type| {
        by_id.get(related).map(|other| DependencyEdge {
            issue: other.without_edges(),
            dep_type,
        })
    };

    let depends_on: Vec<_> = rows
        .iter()
        .filter(|r| r.issue_id == issue.id)
        .filter_map(|r| edge(&r.depends_on_id, r.dep_type))
        .collect();
    let depended_by: Vec<_> = rows
        .iter()
        .filter(|r| r.depends_on_id == issue.id)
        .filter_map(|r| edge(&r.issue_id, r.dep_type))
        .collect();

    issue.depends_on = (!depends_on.is_empty()).then_some(depends_on);
    issue.depended_by = (!depended_by.is_empty()).then_some(depended_by);
    issue
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_db(workspace: &Path, name: &str, edges: &[(&str, &str, &str)]) -> PathBuf {
        let dir = workspace.join(BEADS_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE dependencies (
                issue_id TEXT NOT NULL,
                depends_on_id TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'blocks',
                PRIMARY KEY (issue_id, depends_on_id)
            );",
        )
        .unwrap();
        for (from, to, ty) in edges {
            conn.execute(
                "INSERT INTO dependencies (issue_id, depends_on_id, type) VALUES (?1, ?2, ?3)",
                params![from, to, ty],
            )
            .unwrap();
        }
        path
    }

    fn row(from: &str, to: &str, dep_type: DependencyType) -> EdgeRow {
        EdgeRow {
            issue_id: from.into(),
            depends_on_id: to.into(),
            dep_type,
        }
    }

    #[test]
    fn test_discover_picks_first_db_by_name() {
        let dir = tempdir().unwrap();
        create_db(dir.path(), "zeta.db", &[]);
        let first = create_db(dir.path(), "beads.db", &[]);
        std::fs::write(dir.path().join(BEADS_DIR).join("issues.jsonl"), "").unwrap();
        assert_eq!(discover_database(dir.path()).unwrap(), Some(first));
    }

    #[test]
    fn test_discover_without_beads_dir_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(discover_database(dir.path()).unwrap(), None);
        std::fs::create_dir_all(dir.path().join(BEADS_DIR)).unwrap();
        assert_eq!(discover_database(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_read_only_connection_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = create_db(dir.path(), "beads.db", &[]);
        let conn = open_read_only(&path).unwrap();
        let result = conn.execute(
            "INSERT INTO dependencies (issue_id, depends_on_id, type) VALUES ('a', 'b', 'blocks')",
            [],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_edges_for_returns_both_directions_and_skips_unknown_types() {
        let dir = tempdir().unwrap();
        create_db(
            dir.path(),
            "beads.db",
            &[
                ("bd-2", "bd-1", "blocks"),
                ("bd-1", "bd-3", "parent-child"),
                ("bd-4", "bd-5", "related"),
                ("bd-1", "bd-6", "mystery"),
            ],
        );
        let store = DependencyStore::new(dir.path());

        let mut edges = store.edges_for("bd-1").await.unwrap();
        edges.sort_by(|a, b| a.issue_id.cmp(&b.issue_id));
        assert_eq!(
            edges,
            vec![
                row("bd-1", "bd-3", DependencyType::ParentChild),
                row("bd-2", "bd-1", DependencyType::Blocks),
            ]
        );
        assert_eq!(store.all_edges().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_database_means_no_edges() {
        let dir = tempdir().unwrap();
        let store = DependencyStore::new(dir.path());
        assert!(store.edges_for("bd-1").await.unwrap().is_empty());
        assert!(store.all_edges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(BEADS_DIR)).unwrap();
        // A database without the dependencies table.
        let conn = Connection::open(dir.path().join(BEADS_DIR).join("beads.db")).unwrap();
        conn.execute_batch("CREATE TABLE other (x INTEGER);").unwrap();
        drop(conn);

        let store = DependencyStore::new(dir.path());
        assert!(matches!(
            store.all_edges().await,
            Err(DependencyError::Query(_))
        ));
    }

    #[test]
    fn test_enrich_issue_resolves_from_snapshot_and_drops_dangling() {
        let snapshot = vec![
            Issue::new("bd-1", "Root"),
            Issue::new("bd-2", "Child"),
            Issue::new("bd-3", "Blocker"),
        ];
        let rows = vec![
            row("bd-1", "bd-3", DependencyType::Blocks),
            row("bd-1", "bd-99", DependencyType::Blocks),
            row("bd-2", "bd-1", DependencyType::ParentChild),
        ];

        let issue = enrich_issue(snapshot[0].clone(), &rows, &snapshot);
        let depends_on = issue.depends_on.unwrap();
        assert_eq!(depends_on.len(), 1);
        assert_eq!(depends_on[0].issue.title, "Blocker");
        assert_eq!(depends_on[0].dep_type, DependencyType::Blocks);

        let depended_by = issue.depended_by.unwrap();
        assert_eq!(depended_by.len(), 1);
        assert_eq!(depended_by[0].issue.id, "bd-2");
        assert_eq!(depended_by[0].dep_type, DependencyType::ParentChild);
    }

    #[test]
    fn test_enrich_all_leaves_unconnected_issues_bare() {
        let issues = vec![
            Issue::new("bd-1", "A"),
            Issue::new("bd-2", "B"),
            Issue::new("bd-3", "Loner"),
        ];
        let rows = vec![row("bd-2", "bd-1", DependencyType::Blocks)];

        let enriched = enrich_all(&issues, &rows);
        assert_eq!(enriched.len(), 3);
        assert!(enriched[0].depends_on.is_none());
        assert_eq!(enriched[0].depended_by.as_ref().unwrap()[0].issue.id, "bd-2");
        assert_eq!(enriched[1].depends_on.as_ref().unwrap()[0].issue.id, "bd-1");
        assert!(enriched[2].depends_on.is_none());
        assert!(enriched[2].depended_by.is_none());
    }

    #[test]
    fn test_embedded_issues_carry_no_edges() {
        let issues = vec![Issue::new("bd-1", "A"), Issue::new("bd-2", "B")];
        let rows = vec![row("bd-2", "bd-1", DependencyType::Blocks)];
        let enriched = enrich_all(&issues, &rows);
        let embedded = &enriched[1].depends_on.as_ref().unwrap()[0].issue;
        assert!(embedded.depends_on.is_none());
        assert!(embedded.depended_by.is_none());
    }
}
