use crate::config::Config;
use crate::db::{self, Db, ImportRow, SymbolRow};
use crate::indexer::extract::{ExtractedFile, TempId};
use crate::indexer::python::PythonExtractor;
use crate::model::{IndexStats, Project};
use crate::resolve::Resolver;
use anyhow::{Result, anyhow};
use rayon::prelude::*;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub mod extract;
pub mod python;
pub mod scan;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Project name; defaults to the repository directory name.
    pub name: Option<String>,
    /// Stable project locator; defaults to the canonical repository path.
    pub locator: Option<String>,
    /// Re-ingest files whose content hash is unchanged.
    pub force: bool,
    pub scan: scan::ScanOptions,
}

/// Rows written for one file: symbols upserted, imports and calls newly
/// inserted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileCounts {
    pub symbols: usize,
    pub imports: usize,
    pub calls: usize,
}

pub struct Indexer {
    repo_root: PathBuf,
    db: Db,
    project: Project,
    options: IndexOptions,
}

impl Indexer {
    pub fn new(repo_root: PathBuf, db_path: &Path) -> Result<Self> {
        Self::new_with_options(repo_root, db_path, IndexOptions::default())
    }

    pub fn new_with_options(repo_root: PathBuf, db_path: &Path, options: IndexOptions) -> Result<Self> {
        let repo_root = std::fs::canonicalize(&repo_root).unwrap_or(repo_root);
        let db = Db::new(db_path)?;
        let locator = options
            .locator
            .clone()
            .unwrap_or_else(|| repo_root.display().to_string());
        let name = options.name.clone().unwrap_or_else(|| {
            repo_root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| locator.clone())
        });
        let project = db.upsert_project(&name, &locator)?;
        tracing::debug!(project_id = project.id, %locator, "project ready");

        Ok(Self {
            repo_root,
            db,
            project,
            options,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Scan, extract in parallel, persist file by file, then resolve.
    pub fn index(&mut self) -> Result<IndexStats> {
        let started = Instant::now();
        let project_id = self.project.id;
        let scanned = scan::scan_repo_with_options(&self.repo_root, self.options.scan)?;
        let mut stats = IndexStats {
            project_id,
            scanned: scanned.len(),
            ..Default::default()
        };

        let max_bytes = Config::get().max_file_size_mb.saturating_mul(1024 * 1024);
        let mut pending = Vec::with_capacity(scanned.len());
        for file in scanned {
            if file.size > max_bytes {
                tracing::warn!(
                    path = %file.rel_path,
                    size_mb = file.size / (1024 * 1024),
                    "skipping large file"
                );
                stats.skipped += 1;
                continue;
            }
            if !self.options.force
                && self.db.file_hash(project_id, &file.rel_path)?.as_deref() == Some(file.hash.as_str())
            {
                stats.skipped += 1;
                continue;
            }
            pending.push(file);
        }
        tracing::info!(
            scanned = stats.scanned,
            pending = pending.len(),
            skipped = stats.skipped,
            "extracting"
        );

        let extracted: Vec<(scan::ScannedFile, Result<ExtractedFile>)> = pending
            .into_par_iter()
            .map_init(PythonExtractor::new, |extractor, file| {
                let result = extract_file(extractor, &file);
                (file, result)
            })
            .collect();

        for (file, result) in extracted {
            let extracted = match result {
                Ok(extracted) => extracted,
                Err(err) => {
                    tracing::warn!(path = %file.rel_path, "extract failed: {err:#}");
                    stats.errors += 1;
                    continue;
                }
            };
            let written = self.db.with_write_tx(|tx| {
                let counts = ingest_file(tx, project_id, &extracted)?;
                db::record_file(tx, project_id, &file.rel_path, &file.hash)?;
                Ok(counts)
            });
            match written {
                Ok(counts) => {
                    tracing::debug!(
                        path = %file.rel_path,
                        symbols = counts.symbols,
                        imports = counts.imports,
                        calls = counts.calls,
                        "ingested"
                    );
                    stats.indexed += 1;
                    stats.symbols += counts.symbols;
                    stats.imports += counts.imports;
                    stats.calls += counts.calls;
                }
                Err(err) => {
                    tracing::warn!(path = %file.rel_path, "persist failed: {err:#}");
                    stats.errors += 1;
                }
            }
        }

        // every file is persisted before linking starts
        stats.resolve = Some(Resolver::new(&self.db).run(project_id)?);

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.db.set_meta_i64("last_indexed", now)?;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            indexed = stats.indexed,
            skipped = stats.skipped,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "index complete"
        );
        Ok(stats)
    }
}

fn extract_file(
    extractor: &mut Result<PythonExtractor>,
    file: &scan::ScannedFile,
) -> Result<ExtractedFile> {
    let extractor = extractor
        .as_mut()
        .map_err(|err| anyhow!("init python parser: {err:#}"))?;
    let source = crate::util::read_to_string(&file.abs_path)?;
    extractor.extract(&source, &file.rel_path)
}

/// Temp id → durable id table, indexed by [`TempId`].
#[derive(Debug, Default)]
struct IdRemap {
    ids: Vec<Option<i64>>,
}

impl IdRemap {
    fn with_capacity(len: usize) -> Self {
        Self {
            ids: vec![None; len],
        }
    }

    fn insert(&mut self, temp: TempId, id: i64) {
        if temp.0 >= self.ids.len() {
            self.ids.resize(temp.0 + 1, None);
        }
        self.ids[temp.0] = Some(id);
    }

    fn get(&self, temp: TempId) -> Option<i64> {
        self.ids.get(temp.0).copied().flatten()
    }
}

/// Persist one extracted file. Symbols are written in emission order so each
/// parent has a durable id before its children reference it; calls whose
/// source never got one are dropped.
pub fn ingest_file(conn: &Connection, project_id: i64, file: &ExtractedFile) -> Result<FileCounts> {
    let mut remap = IdRemap::with_capacity(file.symbols.len());
    let mut counts = FileCounts::default();

    for symbol in &file.symbols {
        let parent_id = match symbol.parent {
            Some(parent) => match remap.get(parent) {
                Some(id) => Some(id),
                None => {
                    tracing::warn!(
                        path = %file.file_path,
                        name = %symbol.name,
                        "parent was not persisted, skipping symbol"
                    );
                    continue;
                }
            },
            None => None,
        };
        let id = db::upsert_symbol(
            conn,
            project_id,
            &SymbolRow {
                file_path: &file.file_path,
                parent_id,
                kind: symbol.kind,
                name: &symbol.name,
                start_line: symbol.start_line,
                end_line: symbol.end_line,
                signature: &symbol.signature,
            },
        )?;
        remap.insert(symbol.temp_id, id);
        counts.symbols += 1;
    }

    for import in &file.imports {
        let row = ImportRow {
            file_path: &file.file_path,
            module: &import.module,
            name: import.name.as_deref(),
            alias: import.alias.as_deref(),
            line: import.line,
        };
        if db::upsert_import(conn, project_id, &row)?.is_some() {
            counts.imports += 1;
        }
    }

    for call in &file.calls {
        let Some(source) = remap.get(call.source) else {
            tracing::debug!(callee = %call.callee, "call source unmapped, dropped");
            continue;
        };
        if db::insert_call(conn, project_id, source, &call.callee, call.line)? {
            counts.calls += 1;
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::extract::{CallInput, SymbolInput};
    use crate::model::SymbolKind;

    fn symbol(temp: usize, parent: Option<usize>, name: &str, start: i64, end: i64) -> SymbolInput {
        SymbolInput {
            temp_id: TempId(temp),
            parent: parent.map(TempId),
            kind: SymbolKind::Function,
            name: name.to_string(),
            start_line: start,
            end_line: end,
            signature: format!("def {name}()"),
        }
    }

    #[test]
    fn remap_grows_on_demand() {
        let mut remap = IdRemap::with_capacity(1);
        assert_eq!(remap.get(TempId(0)), None);
        remap.insert(TempId(3), 42);
        assert_eq!(remap.get(TempId(3)), Some(42));
        assert_eq!(remap.get(TempId(7)), None);
    }

    #[test]
    fn ingest_links_children_to_durable_parents() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::new(&dir.path().join("graph.sqlite")).unwrap();
        let project = db.upsert_project("demo", "/demo").unwrap();

        let mut file = ExtractedFile::new("a.py");
        file.symbols.push(symbol(0, None, "outer", 1, 6));
        file.symbols.push(symbol(1, Some(0), "inner", 2, 4));
        // dangling parent reference
        file.symbols.push(symbol(2, Some(9), "orphan", 5, 5));
        file.calls.push(CallInput {
            source: TempId(1),
            callee: "work".to_string(),
            line: 3,
        });
        file.calls.push(CallInput {
            source: TempId(2),
            callee: "lost".to_string(),
            line: 5,
        });

        let counts = db
            .with_write_tx(|tx| ingest_file(tx, project.id, &file))
            .unwrap();
        assert_eq!(
            counts,
            FileCounts {
                symbols: 2,
                imports: 0,
                calls: 1
            }
        );

        let symbols = db.symbols_for_file(project.id, "a.py").unwrap();
        let outer = symbols.iter().find(|s| s.name == "outer").unwrap();
        let inner = symbols.iter().find(|s| s.name == "inner").unwrap();
        assert_eq!(inner.parent_id, Some(outer.id));

        let calls = db.calls_for_project(project.id).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].source_symbol_id, inner.id);

        let again = db
            .with_write_tx(|tx| ingest_file(tx, project.id, &file))
            .unwrap();
        assert_eq!(again.calls, 0);
        assert_eq!(db.symbols_for_project(project.id).unwrap().len(), 2);
    }
}
