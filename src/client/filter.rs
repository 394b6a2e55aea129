use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::dashboard::models::{Issue, IssueStatus, IssueType, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// List filters and sort order. An empty filter set means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub statuses: Vec<IssueStatus>,
    pub priorities: Vec<Priority>,
    pub types: Vec<IssueType>,
    pub labels: Vec<String>,
    pub query: String,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

fn toggle<T: PartialEq>(set: &mut Vec<T>, value: T) {
    if let Some(pos) = set.iter().position(|v| *v == value) {
        set.remove(pos);
    } else {
        set.push(value);
    }
}

impl FilterState {
    pub fn toggle_status(&mut self, status: IssueStatus) {
        toggle(&mut self.statuses, status);
    }

    pub fn toggle_priority(&mut self, priority: Priority) {
        toggle(&mut self.priorities, priority);
    }

    pub fn toggle_type(&mut self, issue_type: IssueType) {
        toggle(&mut self.types, issue_type);
    }

    pub fn toggle_label(&mut self, label: impl Into<String>) {
        toggle(&mut self.labels, label.into());
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn set_sort_field(&mut self, field: SortField) {
        self.sort_field = field;
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sort_direction = self.sort_direction.toggled();
    }

    /// Reset every filter. Sort settings are kept.
    pub fn clear(&mut self) {
        *self = Self {
            sort_field: self.sort_field,
            sort_direction: self.sort_direction,
            ..Self::default()
        };
    }

    pub fn is_active(&self) -> bool {
        !(self.statuses.is_empty()
            && self.priorities.is_empty()
            && self.types.is_empty()
            && self.labels.is_empty()
            && self.query.is_empty())
    }

    /// Status, priority and type only; the graph view selects with these.
    pub fn matches_attributes(&self, issue: &Issue) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&issue.status))
            && (self.priorities.is_empty() || self.priorities.contains(&issue.priority))
            && (self.types.is_empty() || self.types.contains(&issue.issue_type))
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        if !self.matches_attributes(issue) {
            return false;
        }
        if !self.labels.is_empty() && !issue.labels.iter().any(|l| self.labels.contains(l)) {
            return false;
        }
        if !self.query.is_empty() {
            let query = self.query.to_lowercase();
            let hit = issue.title.to_lowercase().contains(&query)
                || issue.description.to_lowercase().contains(&query)
                || issue.id.to_lowercase().contains(&query);
            if !hit {
                return false;
            }
        }
        true
    }

    fn compare(&self, a: &Issue, b: &Issue) -> Ordering {
        let ordering = match self.sort_field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        match self.sort_direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    /// Matching issues in sort order. Ties keep their input order.
    pub fn apply(&self, issues: &[Issue]) -> Vec<Issue> {
        let mut out: Vec<Issue> = issues.iter().filter(|i| self.matches(i)).cloned().collect();
        out.sort_by(|a, b| self.compare(a, b));
        out
    }
}
