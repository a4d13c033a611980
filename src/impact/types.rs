use crate::model::Symbol;
use serde::Serialize;
use std::collections::BTreeMap;

/// One call site reached by the traversal.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ImpactRow {
    pub caller_id: i64,
    pub caller_name: String,
    pub caller_file: String,
    pub line: i64,
    /// 1 for direct callers, 2+ for ripple callers.
    pub depth: usize,
    /// Symbol the caller invokes at this site.
    pub target_id: i64,
    pub target_name: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ImpactReport {
    pub target: Symbol,
    pub max_depth: usize,
    pub rows: Vec<ImpactRow>,
    /// The deadline cut the traversal short; deeper levels were not explored.
    pub truncated: bool,
}

impl ImpactReport {
    pub fn direct(&self) -> impl Iterator<Item = &ImpactRow> {
        self.rows.iter().filter(|row| row.depth == 1)
    }

    pub fn ripple(&self) -> impl Iterator<Item = &ImpactRow> {
        self.rows.iter().filter(|row| row.depth > 1)
    }

    /// Distinct caller files, sorted.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.rows.iter().map(|row| row.caller_file.as_str()).collect();
        files.sort_unstable();
        files.dedup();
        files
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImpactOutcome {
    NotFound { symbol: String },
    NoDependents { target: Symbol },
    Impacted(ImpactReport),
}

impl ImpactOutcome {
    /// Graph export; `None` when the target was not found.
    pub fn graph(&self) -> Option<ImpactGraph> {
        match self {
            ImpactOutcome::NotFound { .. } => None,
            ImpactOutcome::NoDependents { target } => Some(ImpactGraph::target_only(target)),
            ImpactOutcome::Impacted(report) => Some(ImpactGraph::from_report(report)),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: i64,
    pub label: String,
    /// 0 for the target, otherwise the shallowest depth the symbol was
    /// reached at.
    pub group: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GraphEdge {
    pub from: i64,
    pub to: i64,
}

/// Node/edge export of a report, for visualisation.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ImpactGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn target_node(target: &Symbol) -> GraphNode {
    GraphNode {
        id: target.id,
        label: target.name.clone(),
        group: 0,
    }
}

impl ImpactGraph {
    /// A lone target node with no edges.
    pub fn target_only(target: &Symbol) -> Self {
        Self {
            nodes: vec![target_node(target)],
            edges: Vec::new(),
        }
    }

    pub fn from_report(report: &ImpactReport) -> Self {
        let mut nodes: BTreeMap<i64, GraphNode> = BTreeMap::new();
        nodes.insert(report.target.id, target_node(&report.target));
        let mut edges = Vec::with_capacity(report.rows.len());
        for row in &report.rows {
            let node = nodes.entry(row.caller_id).or_insert_with(|| GraphNode {
                id: row.caller_id,
                label: row.caller_name.clone(),
                group: row.depth,
            });
            node.group = node.group.min(row.depth);
            edges.push(GraphEdge {
                from: row.caller_id,
                to: row.target_id,
            });
        }
        edges.sort();
        edges.dedup();
        Self {
            nodes: nodes.into_values().collect(),
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolKind;

    fn symbol(id: i64, name: &str) -> Symbol {
        Symbol {
            id,
            project_id: 1,
            parent_id: None,
            kind: SymbolKind::Function,
            file_path: "a.py".to_string(),
            name: name.to_string(),
            start_line: 1,
            end_line: 2,
            signature: format!("def {name}()"),
        }
    }

    fn row(caller: (i64, &str), line: i64, depth: usize, target: (i64, &str)) -> ImpactRow {
        ImpactRow {
            caller_id: caller.0,
            caller_name: caller.1.to_string(),
            caller_file: format!("{}.py", caller.1),
            line,
            depth,
            target_id: target.0,
            target_name: target.1.to_string(),
        }
    }

    #[test]
    fn graph_groups_by_shallowest_depth() {
        // cycle: a <- b <- a, target is a
        let report = ImpactReport {
            target: symbol(1, "a"),
            max_depth: 5,
            rows: vec![
                row((2, "b"), 3, 1, (1, "a")),
                row((1, "a"), 7, 2, (2, "b")),
                row((2, "b"), 9, 1, (1, "a")),
            ],
            truncated: false,
        };
        let graph = ImpactGraph::from_report(&report);
        assert_eq!(
            graph.nodes,
            vec![
                GraphNode {
                    id: 1,
                    label: "a".to_string(),
                    group: 0
                },
                GraphNode {
                    id: 2,
                    label: "b".to_string(),
                    group: 1
                },
            ]
        );
        assert_eq!(
            graph.edges,
            vec![GraphEdge { from: 1, to: 2 }, GraphEdge { from: 2, to: 1 }]
        );
        assert_eq!(report.direct().count(), 2);
        assert_eq!(report.ripple().count(), 1);
        assert_eq!(report.files(), vec!["a.py", "b.py"]);
    }

    #[test]
    fn target_without_dependents_exports_single_node() {
        let outcome = ImpactOutcome::NoDependents {
            target: symbol(4, "lonely"),
        };
        let graph = outcome.graph().unwrap();
        assert_eq!(
            graph.nodes,
            vec![GraphNode {
                id: 4,
                label: "lonely".to_string(),
                group: 0
            }]
        );
        assert!(graph.edges.is_empty());

        let missing = ImpactOutcome::NotFound {
            symbol: "ghost".to_string(),
        };
        assert!(missing.graph().is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ImpactOutcome::NotFound {
            symbol: "ghost".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["symbol"], "ghost");
    }
}
