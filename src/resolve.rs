//! Name-based linking of imports and calls to symbols.
//!
//! Passes run in a fixed order and only ever fill `resolved_symbol_id`
//! columns that are still empty, so re-running is a no-op once nothing new
//! can be linked. Each pass commits in one transaction.

use crate::db::Db;
use crate::error::N3moError;
use crate::model::{ResolveStats, Symbol};
use anyhow::Result;
use std::collections::HashMap;
use std::time::Instant;

/// Call linking strategies, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStrategy {
    /// Callee text equals a symbol name.
    Exact,
    /// Callee is `<anything>.<name>`; `self.` and `cls.` fall here.
    Qualified,
    /// A resolved import in the caller's file binds the callee.
    ViaImports,
    /// Callee names a symbol declared in the caller's own file.
    LocalFile,
}

impl CallStrategy {
    pub const ORDER: [CallStrategy; 4] = [
        CallStrategy::Exact,
        CallStrategy::Qualified,
        CallStrategy::ViaImports,
        CallStrategy::LocalFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStrategy::Exact => "calls_exact",
            CallStrategy::Qualified => "calls_qualified",
            CallStrategy::ViaImports => "calls_via_imports",
            CallStrategy::LocalFile => "calls_local",
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    id: i64,
    file_path: String,
}

/// Symbols grouped by name, each group ordered by (id, file). The first
/// entry of a group is the tie-break winner.
#[derive(Debug, Default)]
struct SymbolIndex {
    by_name: HashMap<String, Vec<Candidate>>,
}

impl SymbolIndex {
    fn build(symbols: Vec<Symbol>) -> Self {
        let mut by_name: HashMap<String, Vec<Candidate>> = HashMap::new();
        for symbol in symbols {
            by_name.entry(symbol.name).or_default().push(Candidate {
                id: symbol.id,
                file_path: symbol.file_path,
            });
        }
        for group in by_name.values_mut() {
            group.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.file_path.cmp(&b.file_path)));
        }
        Self { by_name }
    }

    fn best(&self, name: &str) -> Option<i64> {
        self.by_name.get(name)?.first().map(|c| c.id)
    }

    fn best_in_file(&self, name: &str, file_path: &str) -> Option<i64> {
        self.by_name
            .get(name)?
            .iter()
            .find(|c| c.file_path == file_path)
            .map(|c| c.id)
    }
}

pub struct Resolver<'a> {
    db: &'a Db,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Run every pass for `project_id` and report what each newly linked.
    pub fn run(&self, project_id: i64) -> Result<ResolveStats> {
        let started = Instant::now();
        let index = SymbolIndex::build(self.db.symbols_for_project(project_id)?);

        let mut stats = ResolveStats {
            imports: self.resolve_imports(project_id, &index)?,
            ..Default::default()
        };
        for strategy in CallStrategy::ORDER {
            let linked = self.resolve_calls(project_id, &index, strategy)?;
            match strategy {
                CallStrategy::Exact => stats.calls_exact = linked,
                CallStrategy::Qualified => stats.calls_qualified = linked,
                CallStrategy::ViaImports => stats.calls_via_imports = linked,
                CallStrategy::LocalFile => stats.calls_local = linked,
            }
        }

        tracing::info!(
            project_id,
            imports = stats.imports,
            calls = stats.calls_total(),
            duration_ms = started.elapsed().as_millis() as u64,
            "resolve complete"
        );
        Ok(stats)
    }

    fn resolve_imports(&self, project_id: i64, index: &SymbolIndex) -> Result<usize> {
        let pending = self.db.unresolved_imports(project_id)?;
        let links: Vec<(i64, i64)> = pending
            .iter()
            .filter_map(|import| Some((import.id, index.best(import.target_name())?)))
            .collect();
        let linked = self
            .db
            .apply_import_resolutions(&links)
            .map_err(|err| pass_error("imports", err))?;
        tracing::debug!(pending = pending.len(), linked, "imports pass");
        Ok(linked)
    }

    fn resolve_calls(&self, project_id: i64, index: &SymbolIndex, strategy: CallStrategy) -> Result<usize> {
        let pending = self.db.unresolved_calls(project_id)?;
        if pending.is_empty() {
            return Ok(0);
        }

        let links: Vec<(i64, i64)> = match strategy {
            CallStrategy::Exact => pending
                .iter()
                .filter_map(|call| Some((call.id, index.best(&call.callee)?)))
                .collect(),
            CallStrategy::Qualified => pending
                .iter()
                .filter_map(|call| {
                    let (_, name) = call.callee.rsplit_once('.')?;
                    Some((call.id, index.best(name.trim())?))
                })
                .collect(),
            CallStrategy::ViaImports => {
                let bindings = self.import_bindings(project_id)?;
                pending
                    .iter()
                    .filter_map(|call| {
                        let target = bindings.get(&call.caller_file)?.get(&call.callee)?;
                        Some((call.id, *target))
                    })
                    .collect()
            }
            CallStrategy::LocalFile => pending
                .iter()
                .filter_map(|call| Some((call.id, index.best_in_file(&call.callee, &call.caller_file)?)))
                .collect(),
        };

        let linked = self
            .db
            .apply_call_resolutions(&links)
            .map_err(|err| pass_error(strategy.as_str(), err))?;
        tracing::debug!(pass = strategy.as_str(), pending = pending.len(), linked, "calls pass");
        Ok(linked)
    }

    /// file → bound name → target symbol, from resolved imports. When two
    /// imports bind the same name the smaller target id wins.
    fn import_bindings(&self, project_id: i64) -> Result<HashMap<String, HashMap<String, i64>>> {
        let mut bindings: HashMap<String, HashMap<String, i64>> = HashMap::new();
        for import in self.db.resolved_imports(project_id)? {
            let Some(target) = import.resolved_symbol_id else {
                continue;
            };
            let slot = bindings
                .entry(import.file_path.clone())
                .or_default()
                .entry(import.bound_name().to_string())
                .or_insert(target);
            *slot = (*slot).min(target);
        }
        Ok(bindings)
    }
}

fn pass_error(pass: &'static str, err: anyhow::Error) -> anyhow::Error {
    N3moError::ResolvePass {
        pass,
        reason: format!("{err:#}"),
    }
    .into()
}
