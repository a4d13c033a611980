//! Impact analysis: "what breaks if I change this?"
//!
//! Walks the resolved call graph upward from a target symbol and reports
//! every direct and transitive caller, bounded by depth and a deadline.

pub mod graph;
pub mod types;

pub use graph::{CallGraph, Callers, StoreCallers, Traversal, traverse};
pub use types::{GraphEdge, GraphNode, ImpactGraph, ImpactOutcome, ImpactReport, ImpactRow};

use crate::config::Config;
use crate::db::Db;
use anyhow::Result;
use std::fmt::Write as _;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ImpactQuery {
    pub symbol: String,
    /// Only consider definitions in this file.
    pub file: Option<String>,
    pub max_depth: usize,
    pub timeout: Duration,
}

impl ImpactQuery {
    /// Query with depth and timeout taken from [`Config`].
    pub fn new(symbol: impl Into<String>) -> Self {
        let config = Config::get();
        Self {
            symbol: symbol.into(),
            file: None,
            max_depth: config.max_depth,
            timeout: Duration::from_secs(config.impact_timeout_secs),
        }
    }

    pub fn in_file(mut self, file: Option<String>) -> Self {
        self.file = file;
        self
    }

    /// Depth 0 would skip the direct callers, so it is raised to 1.
    pub fn with_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }
}

/// Resolve the target by name and trace its callers through the store.
///
/// Of several same-named definitions the lowest id is chosen.
pub fn trace_impact(db: &Db, project_id: i64, query: &ImpactQuery) -> Result<ImpactOutcome> {
    let target = db
        .find_symbols_by_name(project_id, &query.symbol)?
        .into_iter()
        .find(|symbol| query.file.as_deref().is_none_or(|file| symbol.file_path == file));
    let Some(target) = target else {
        tracing::debug!(symbol = %query.symbol, "impact target not found");
        return Ok(ImpactOutcome::NotFound {
            symbol: query.symbol.clone(),
        });
    };

    let max_depth = query.max_depth.max(1);
    let callers = StoreCallers { db, project_id };
    let traversal = traverse(&callers, &target, max_depth, query.timeout)?;
    tracing::debug!(
        target_id = target.id,
        rows = traversal.rows.len(),
        truncated = traversal.truncated,
        "impact traced"
    );

    if traversal.rows.is_empty() && !traversal.truncated {
        return Ok(ImpactOutcome::NoDependents { target });
    }
    Ok(ImpactOutcome::Impacted(ImpactReport {
        target,
        max_depth,
        rows: traversal.rows,
        truncated: traversal.truncated,
    }))
}

/// Human-readable report.
pub fn render_text(outcome: &ImpactOutcome) -> String {
    let mut out = String::new();
    match outcome {
        ImpactOutcome::NotFound { symbol } => {
            let _ = writeln!(out, "Symbol '{symbol}' not found.");
        }
        ImpactOutcome::NoDependents { target } => {
            let _ = writeln!(out, "{} ({}:{})", target.signature, target.file_path, target.start_line);
            let _ = writeln!(out, "Safe to change: no dependents found.");
        }
        ImpactOutcome::Impacted(report) => {
            let target = &report.target;
            let _ = writeln!(out, "{} ({}:{})", target.signature, target.file_path, target.start_line);

            let _ = writeln!(out, "\nDirect callers:");
            for row in report.direct() {
                let _ = writeln!(out, "  {} ({}:{})", row.caller_name, row.caller_file, row.line);
            }

            let ripple: Vec<_> = report.ripple().collect();
            if !ripple.is_empty() {
                let _ = writeln!(out, "\nRipple effects:");
                for row in ripple {
                    let _ = writeln!(
                        out,
                        "  [depth {}] {} ({}:{}) -> {}",
                        row.depth, row.caller_name, row.caller_file, row.line, row.target_name
                    );
                }
            }

            let _ = writeln!(
                out,
                "\n{} call sites across {} files (max depth {}).",
                report.rows.len(),
                report.files().len(),
                report.max_depth
            );
            if report.truncated {
                let _ = writeln!(out, "Traversal timed out; deeper callers were not explored.");
            }
        }
    }
    out
}
