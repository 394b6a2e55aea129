use serde::Serialize;

use crate::dashboard::models::{Issue, IssueStatus};

/// One board column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardColumn {
    pub status: IssueStatus,
    pub issues: Vec<Issue>,
}

/// Group issues into one column per status, in [`IssueStatus::ALL`] order.
/// Empty columns are kept; input order is preserved within a column.
pub fn group_by_status(issues: &[Issue]) -> Vec<BoardColumn> {
    IssueStatus::ALL
        .iter()
        .map(|status| BoardColumn {
            status: status.clone(),
            issues: issues.iter().filter(|i| i.status == *status).cloned().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_follow_status_order() {
        let mut closed = Issue::new("bd-1", "Done");
        closed.status = IssueStatus::Closed;
        let open_a = Issue::new("bd-2", "A");
        let mut blocked = Issue::new("bd-3", "Stuck");
        blocked.status = IssueStatus::Blocked;
        let open_b = Issue::new("bd-4", "B");

        let board = group_by_status(&[closed, open_a, blocked, open_b]);
        let statuses: Vec<_> = board.iter().map(|c| c.status.clone()).collect();
        assert_eq!(statuses, IssueStatus::ALL.to_vec());

        let open: Vec<_> = board[0].issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(open, vec!["bd-2", "bd-4"]);
        assert!(board[1].issues.is_empty());
        assert_eq!(board[2].issues[0].id, "bd-3");
        assert_eq!(board[3].issues[0].id, "bd-1");
    }

    #[test]
    fn test_empty_input_gives_empty_columns() {
        let board = group_by_status(&[]);
        assert_eq!(board.len(), 4);
        assert!(board.iter().all(|c| c.issues.is_empty()));
    }
}
