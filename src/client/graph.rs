//! Dependency graph view model.
//!
//! Node positions are left to the renderer; this module only decides which
//! nodes and edges are shown and which are highlighted.

use std::collections::HashSet;

use serde::Serialize;

use super::filter::FilterState;
use crate::dashboard::models::{DependencyType, Issue};

/// Directed edge from a dependency to the issue that depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub dep_type: DependencyType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphView {
    /// Displayed issues, in input order.
    pub nodes: Vec<Issue>,
    pub edges: Vec<GraphEdge>,
    /// Ids that passed the filters, as opposed to being pulled in by an edge.
    pub selected: HashSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlight {
    pub nodes: HashSet<String>,
    pub edges: HashSet<String>,
}

impl Highlight {
    /// True when something is hovered and `node` is not part of it.
    pub fn dims_node(&self, node: &str) -> bool {
        !self.nodes.is_empty() && !self.nodes.contains(node)
    }

    pub fn dims_edge(&self, edge: &str) -> bool {
        !self.nodes.is_empty() && !self.edges.contains(edge)
    }
}

/// Build the graph for `issues` (which must carry `depends_on`, as served by
/// `/api/graph`). Issues passing the status, priority and type filters are
/// selected; an edge is kept when either end is selected, and both its ends
/// are then displayed.
pub fn build_graph(issues: &[Issue], filter: &FilterState) -> GraphView {
    let selected: HashSet<String> = issues
        .iter()
        .filter(|i| filter.matches_attributes(i))
        .map(|i| i.id.clone())
        .collect();

    let mut edges = Vec::new();
    let mut connected = HashSet::new();
    for issue in issues {
        for dep in issue.depends_on.iter().flatten() {
            if !(selected.contains(&issue.id) || selected.contains(&dep.issue.id)) {
                continue;
            }
            edges.push(GraphEdge {
                id: format!("{}-{}", issue.id, dep.issue.id),
                source: dep.issue.id.clone(),
                target: issue.id.clone(),
                dep_type: dep.dep_type,
            });
            connected.insert(issue.id.clone());
            connected.insert(dep.issue.id.clone());
        }
    }

    let nodes = issues
        .iter()
        .filter(|i| selected.contains(&i.id) || connected.contains(&i.id))
        .cloned()
        .collect();

    GraphView {
        nodes,
        edges,
        selected,
    }
}

impl GraphView {
    /// Hovering a node highlights it, every edge touching it, and the other
    /// end of each such edge.
    pub fn highlight(&self, hovered: Option<&str>) -> Highlight {
        let Some(hovered) = hovered else {
            return Highlight::default();
        };
        let mut highlight = Highlight::default();
        highlight.nodes.insert(hovered.to_string());
        for edge in &self.edges {
            if edge.source == hovered || edge.target == hovered {
                highlight.edges.insert(edge.id.clone());
                highlight.nodes.insert(edge.source.clone());
                highlight.nodes.insert(edge.target.clone());
            }
        }
        highlight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::models::{DependencyEdge, IssueStatus};

    fn depends(issue: &mut Issue, on: &Issue, dep_type: DependencyType) {
        issue
            .depends_on
            .get_or_insert_with(Vec::new)
            .push(DependencyEdge {
                issue: on.without_edges(),
                dep_type,
            });
    }

    /// bd-1 (closed) <- bd-2 (open) <- bd-3 (open); bd-4 (closed) alone.
    fn chain() -> Vec<Issue> {
        let mut a = Issue::new("bd-1", "Schema");
        a.status = IssueStatus::Closed;
        let mut b = Issue::new("bd-2", "API");
        depends(&mut b, &a, DependencyType::Blocks);
        let mut c = Issue::new("bd-3", "UI");
        depends(&mut c, &b, DependencyType::ParentChild);
        let mut d = Issue::new("bd-4", "Old");
        d.status = IssueStatus::Closed;
        vec![a, b, c, d]
    }

    fn node_ids(view: &GraphView) -> Vec<&str> {
        view.nodes.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_no_filter_shows_everything() {
        let view = build_graph(&chain(), &FilterState::default());
        assert_eq!(node_ids(&view), vec!["bd-1", "bd-2", "bd-3", "bd-4"]);
        assert_eq!(view.edges.len(), 2);
        assert_eq!(view.edges[0].source, "bd-1");
        assert_eq!(view.edges[0].target, "bd-2");
        assert_eq!(view.edges[0].id, "bd-2-bd-1");
    }

    #[test]
    fn test_edge_pulls_in_unselected_endpoint() {
        let mut filter = FilterState::default();
        filter.toggle_status(IssueStatus::Open);
        let view = build_graph(&chain(), &filter);

        // bd-1 is closed but bd-2 depends on it; bd-4 has no edge.
        assert_eq!(node_ids(&view), vec!["bd-1", "bd-2", "bd-3"]);
        assert!(!view.selected.contains("bd-1"));
        assert!(view.selected.contains("bd-2"));
        assert_eq!(view.edges.len(), 2);
    }

    #[test]
    fn test_edges_between_unselected_nodes_are_dropped() {
        let mut filter = FilterState::default();
        filter.toggle_status(IssueStatus::Closed);
        let view = build_graph(&chain(), &filter);

        // Only bd-2 -> bd-1 touches a selected node.
        assert_eq!(view.edges.len(), 1);
        assert_eq!(node_ids(&view), vec!["bd-1", "bd-2", "bd-4"]);
    }

    #[test]
    fn test_label_and_query_do_not_affect_graph_selection() {
        let mut filter = FilterState::default();
        filter.set_query("nothing matches this");
        let view = build_graph(&chain(), &filter);
        assert_eq!(view.nodes.len(), 4);
    }

    #[test]
    fn test_hover_highlights_incident_edges_and_neighbours() {
        let view = build_graph(&chain(), &FilterState::default());
        let highlight = view.highlight(Some("bd-2"));

        assert_eq!(highlight.edges.len(), 2);
        for id in ["bd-1", "bd-2", "bd-3"] {
            assert!(highlight.nodes.contains(id));
            assert!(!highlight.dims_node(id));
        }
        assert!(highlight.dims_node("bd-4"));

        let leaf = view.highlight(Some("bd-3"));
        assert_eq!(leaf.edges, HashSet::from(["bd-3-bd-2".to_string()]));
        assert!(leaf.dims_edge("bd-2-bd-1"));
    }

    #[test]
    fn test_no_hover_dims_nothing() {
        let view = build_graph(&chain(), &FilterState::default());
        let highlight = view.highlight(None);
        assert!(highlight.nodes.is_empty());
        assert!(!highlight.dims_node("bd-1"));
        assert!(!highlight.dims_edge("bd-2-bd-1"));
    }
}
