use crate::db::Db;
use crate::impact::types::ImpactRow;
use crate::model::{CallEdge, Symbol};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Source of resolved incoming call edges.
pub trait Callers {
    /// Resolved call sites whose target is `symbol_id`, in a stable order.
    fn callers_of(&self, symbol_id: i64) -> Result<Vec<CallEdge>>;
}

/// Whole resolved call graph of a project, indexed by callee.
#[derive(Debug, Default, Clone)]
pub struct CallGraph {
    callers: HashMap<i64, Vec<CallEdge>>,
}

impl CallGraph {
    pub fn from_edges(edges: impl IntoIterator<Item = CallEdge>) -> Self {
        let mut callers: HashMap<i64, Vec<CallEdge>> = HashMap::new();
        for edge in edges {
            callers.entry(edge.callee_id).or_default().push(edge);
        }
        Self { callers }
    }

    pub fn load(db: &Db, project_id: i64) -> Result<Self> {
        Ok(Self::from_edges(db.resolved_call_edges(project_id)?))
    }

    pub fn edge_count(&self) -> usize {
        self.callers.values().map(Vec::len).sum()
    }
}

impl Callers for CallGraph {
    fn callers_of(&self, symbol_id: i64) -> Result<Vec<CallEdge>> {
        Ok(self.callers.get(&symbol_id).cloned().unwrap_or_default())
    }
}

/// Reads callers straight from the store, one query per expanded symbol.
pub struct StoreCallers<'a> {
    pub db: &'a Db,
    pub project_id: i64,
}

impl Callers for StoreCallers<'_> {
    fn callers_of(&self, symbol_id: i64) -> Result<Vec<CallEdge>> {
        self.db.find_resolved_callers_of(self.project_id, symbol_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    pub rows: Vec<ImpactRow>,
    pub truncated: bool,
}

/// Level-by-level walk up the caller graph from `target`.
///
/// Every symbol is expanded at most once (the target counts as expanded from
/// the start), so cycles terminate. Rows are keyed by (caller, line) and the
/// first, shallowest, occurrence wins. Once level 1 is done the deadline is
/// checked before each further level; hitting it stops the walk and marks
/// the result truncated.
pub fn traverse<C: Callers>(
    callers: &C,
    target: &Symbol,
    max_depth: usize,
    timeout: Duration,
) -> Result<Traversal> {
    let started = Instant::now();
    let mut expanded: HashSet<i64> = HashSet::from([target.id]);
    let mut seen: HashSet<(i64, i64)> = HashSet::new();
    let mut frontier: Vec<(i64, String)> = vec![(target.id, target.name.clone())];
    let mut rows = Vec::new();
    let mut truncated = false;

    for depth in 1..=max_depth {
        if frontier.is_empty() {
            break;
        }
        if depth > 1 && started.elapsed() >= timeout {
            tracing::warn!(depth, elapsed_ms = started.elapsed().as_millis() as u64, "impact traversal timed out");
            truncated = true;
            break;
        }

        let mut next = Vec::new();
        for (callee_id, callee_name) in &frontier {
            for edge in callers.callers_of(*callee_id)? {
                if seen.insert((edge.caller_id, edge.line)) {
                    rows.push(ImpactRow {
                        caller_id: edge.caller_id,
                        caller_name: edge.caller_name.clone(),
                        caller_file: edge.caller_file.clone(),
                        line: edge.line,
                        depth,
                        target_id: *callee_id,
                        target_name: callee_name.clone(),
                    });
                }
                if expanded.insert(edge.caller_id) {
                    next.push((edge.caller_id, edge.caller_name));
                }
            }
        }
        next.sort_by_key(|(id, _)| *id);
        frontier = next;
    }

    rows.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| a.caller_file.cmp(&b.caller_file))
            .then_with(|| a.caller_name.cmp(&b.caller_name))
            .then_with(|| a.line.cmp(&b.line))
    });
    Ok(Traversal { rows, truncated })
}
