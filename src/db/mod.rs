use crate::config::Config;
use crate::error::N3moError;
use crate::model::{
    Call, CallEdge, Import, PendingCall, Project, ProjectOverview, Symbol, SymbolKind,
};
use anyhow::{Context, Result, anyhow};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

mod migrations;

pub use migrations::{NO_NAME_KEY, NO_PARENT_KEY, SCHEMA_VERSION};

const SYMBOL_COLUMNS: &str =
    "id, project_id, parent_id, kind, file_path, name, start_line, end_line, signature";

const IMPORT_COLUMNS: &str =
    "id, project_id, file_path, module, name, alias, line, resolved_symbol_id";

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

impl FromSql for SymbolKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        SymbolKind::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown symbol kind: {raw}").into()))
    }
}

/// Definition row as written by ingestion, with its parent already remapped
/// to a durable id.
#[derive(Debug, Clone, Copy)]
pub struct SymbolRow<'a> {
    pub file_path: &'a str,
    pub parent_id: Option<i64>,
    pub kind: SymbolKind,
    pub name: &'a str,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportRow<'a> {
    pub file_path: &'a str,
    pub module: &'a str,
    pub name: Option<&'a str>,
    pub alias: Option<&'a str>,
    pub line: i64,
}

pub struct Db {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Db {
    /// Open the store, retrying with exponential backoff per [`Config`].
    pub fn new(db_path: &Path) -> Result<Self> {
        let config = Config::get();
        Self::open_with_retry(
            db_path,
            config.connect_retries,
            Duration::from_millis(config.connect_backoff_ms),
        )
    }

    pub fn open_with_retry(db_path: &Path, attempts: u32, backoff: Duration) -> Result<Self> {
        let attempts = attempts.max(1);
        let mut delay = backoff;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match Self::open(db_path) {
                Ok(db) => return Ok(db),
                Err(err) => {
                    if attempt < attempts {
                        tracing::warn!(
                            attempt,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            "store open failed, retrying: {err:#}"
                        );
                        std::thread::sleep(delay);
                        delay = delay.saturating_mul(2);
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(N3moError::StoreUnavailable {
            path: db_path.display().to_string(),
            attempts,
            reason: last_error
                .map(|err| format!("{err:#}"))
                .unwrap_or_default(),
        }
        .into())
    }

    fn open(db_path: &Path) -> Result<Self> {
        crate::util::ensure_parent_dir(db_path)?;

        let config = Config::get();
        tracing::debug!(
            pool_size = config.pool_size,
            min_idle = config.pool_min_idle,
            "initializing connection pool"
        );

        // Open write connection first and run migrations
        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(Duration::from_secs(30))?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn)?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(config.pool_min_idle.min(config.pool_size)))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .with_context(|| "create connection pool")?;

        Ok(Self {
            write_conn,
            read_pool,
        })
    }

    pub fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.write_conn
            .lock()
            .map_err(|_| anyhow!("write connection lock poisoned"))
    }

    /// Run `f` inside one write transaction. An error from `f` rolls back
    /// everything it wrote.
    pub fn with_write_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // --- Projects ---

    pub fn upsert_project(&self, name: &str, locator: &str) -> Result<Project> {
        let conn = self.conn()?;
        let project = conn.query_row(
            "INSERT INTO projects (name, locator) VALUES (?, ?)
             ON CONFLICT(locator) DO UPDATE SET name = projects.name
             RETURNING id, name, locator",
            params![name, locator],
            project_from_row,
        )?;
        Ok(project)
    }

    pub fn find_project(&self, locator: &str) -> Result<Option<Project>> {
        self.read_conn()?
            .query_row(
                "SELECT id, name, locator FROM projects WHERE locator = ?",
                params![locator],
                project_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    // --- Files ---

    pub fn file_hash(&self, project_id: i64, path: &str) -> Result<Option<String>> {
        self.read_conn()?
            .query_row(
                "SELECT hash FROM files WHERE project_id = ? AND path = ?",
                params![project_id, path],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // --- Symbols ---

    pub fn find_symbols_by_name(&self, project_id: i64, name: &str) -> Result<Vec<Symbol>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE project_id = ? AND name = ?
             ORDER BY id, file_path, name"
        ))?;
        let rows = stmt.query_map(params![project_id, name], symbol_from_row)?;
        collect_rows(rows)
    }

    pub fn symbol_by_id(&self, id: i64) -> Result<Option<Symbol>> {
        self.read_conn()?
            .query_row(
                &format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ?"),
                params![id],
                symbol_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn symbols_for_project(&self, project_id: i64) -> Result<Vec<Symbol>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE project_id = ? ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id], symbol_from_row)?;
        collect_rows(rows)
    }

    pub fn symbols_for_file(&self, project_id: i64, file_path: &str) -> Result<Vec<Symbol>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols
             WHERE project_id = ? AND file_path = ?
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id, file_path], symbol_from_row)?;
        collect_rows(rows)
    }

    // --- Imports ---

    pub fn imports_for_project(&self, project_id: i64) -> Result<Vec<Import>> {
        self.query_imports("WHERE project_id = ?", project_id)
    }

    pub fn unresolved_imports(&self, project_id: i64) -> Result<Vec<Import>> {
        self.query_imports(
            "WHERE project_id = ? AND resolved_symbol_id IS NULL",
            project_id,
        )
    }

    pub fn resolved_imports(&self, project_id: i64) -> Result<Vec<Import>> {
        self.query_imports(
            "WHERE project_id = ? AND resolved_symbol_id IS NOT NULL",
            project_id,
        )
    }

    fn query_imports(&self, filter: &str, project_id: i64) -> Result<Vec<Import>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {IMPORT_COLUMNS} FROM imports {filter} ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id], import_from_row)?;
        collect_rows(rows)
    }

    // --- Calls ---

    pub fn calls_for_project(&self, project_id: i64) -> Result<Vec<Call>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, source_symbol_id, callee, line, resolved_symbol_id
             FROM calls WHERE project_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(Call {
                id: row.get(0)?,
                project_id: row.get(1)?,
                source_symbol_id: row.get(2)?,
                callee: row.get(3)?,
                line: row.get(4)?,
                resolved_symbol_id: row.get(5)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Unresolved calls with the file of the calling symbol.
    pub fn unresolved_calls(&self, project_id: i64) -> Result<Vec<PendingCall>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.callee, s.file_path
             FROM calls c
             JOIN symbols s ON s.id = c.source_symbol_id
             WHERE c.project_id = ? AND c.resolved_symbol_id IS NULL
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok(PendingCall {
                id: row.get(0)?,
                callee: row.get(1)?,
                caller_file: row.get(2)?,
            })
        })?;
        collect_rows(rows)
    }

    /// Every resolved call edge of the project, caller side joined in.
    pub fn resolved_call_edges(&self, project_id: i64) -> Result<Vec<CallEdge>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.file_path, c.line, c.resolved_symbol_id
             FROM calls c
             JOIN symbols s ON s.id = c.source_symbol_id
             WHERE c.project_id = ? AND c.resolved_symbol_id IS NOT NULL
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map(params![project_id], call_edge_from_row)?;
        collect_rows(rows)
    }

    pub fn find_resolved_callers_of(&self, project_id: i64, symbol_id: i64) -> Result<Vec<CallEdge>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.file_path, c.line, c.resolved_symbol_id
             FROM calls c
             JOIN symbols s ON s.id = c.source_symbol_id
             WHERE c.project_id = ? AND c.resolved_symbol_id = ?
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map(params![project_id, symbol_id], call_edge_from_row)?;
        collect_rows(rows)
    }

    // --- Resolution writes ---

    /// Apply `(call_id, symbol_id)` links in one transaction; rows that are
    /// already resolved are left alone. Returns the number of rows changed.
    pub fn apply_call_resolutions(&self, links: &[(i64, i64)]) -> Result<usize> {
        if links.is_empty() {
            return Ok(0);
        }
        self.with_write_tx(|tx| {
            let mut changed = 0;
            for &(call_id, symbol_id) in links {
                if update_call_resolution(tx, call_id, symbol_id)? {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    /// Same contract as [`Db::apply_call_resolutions`], for imports.
    pub fn apply_import_resolutions(&self, links: &[(i64, i64)]) -> Result<usize> {
        if links.is_empty() {
            return Ok(0);
        }
        self.with_write_tx(|tx| {
            let mut changed = 0;
            for &(import_id, symbol_id) in links {
                if update_import_resolution(tx, import_id, symbol_id)? {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    // --- Overview & meta ---

    pub fn project_overview(&self, project: &Project) -> Result<ProjectOverview> {
        let conn = self.read_conn()?;
        let count = |sql: &str| -> Result<i64> {
            Ok(conn.query_row(sql, params![project.id], |row| row.get(0))?)
        };
        Ok(ProjectOverview {
            project: project.clone(),
            files: count("SELECT COUNT(*) FROM files WHERE project_id = ?")?,
            symbols: count("SELECT COUNT(*) FROM symbols WHERE project_id = ?")?,
            imports: count("SELECT COUNT(*) FROM imports WHERE project_id = ?")?,
            imports_resolved: count(
                "SELECT COUNT(*) FROM imports WHERE project_id = ? AND resolved_symbol_id IS NOT NULL",
            )?,
            calls: count("SELECT COUNT(*) FROM calls WHERE project_id = ?")?,
            calls_resolved: count(
                "SELECT COUNT(*) FROM calls WHERE project_id = ? AND resolved_symbol_id IS NOT NULL",
            )?,
        })
    }

    pub fn set_meta_i64(&self, key: &str, value: i64) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    pub fn get_meta_i64(&self, key: &str) -> Result<Option<i64>> {
        let value: Option<String> = self
            .read_conn()?
            .query_row("SELECT value FROM meta WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }
}

// --- Single-row writes, usable inside a caller's transaction ---

/// Insert or refresh a definition keyed by (project, file, parent, name).
/// On conflict only the signature and span change. Returns the durable id.
pub fn upsert_symbol(conn: &Connection, project_id: i64, symbol: &SymbolRow<'_>) -> Result<i64> {
    let parent_key = symbol.parent_id.unwrap_or(NO_PARENT_KEY);
    let existing: Option<(i64, i64)> = conn
        .prepare_cached(
            "SELECT start_line, end_line FROM symbols
             WHERE project_id = ? AND file_path = ? AND parent_key = ? AND name = ?",
        )?
        .query_row(
            params![project_id, symbol.file_path, parent_key, symbol.name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((start_line, end_line)) = existing
        && (start_line, end_line) != (symbol.start_line, symbol.end_line)
    {
        tracing::debug!(
            name = symbol.name,
            file = symbol.file_path,
            old_start = start_line,
            old_end = end_line,
            new_start = symbol.start_line,
            new_end = symbol.end_line,
            "same-named definition replaced earlier span"
        );
    }

    let id = conn
        .prepare_cached(
            "INSERT INTO symbols
             (project_id, parent_id, parent_key, kind, file_path, name, start_line, end_line, signature)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(project_id, file_path, parent_key, name) DO UPDATE SET
                signature = excluded.signature,
                start_line = excluded.start_line,
                end_line = excluded.end_line
             RETURNING id",
        )?
        .query_row(
            params![
                project_id,
                symbol.parent_id,
                parent_key,
                symbol.kind.as_str(),
                symbol.file_path,
                symbol.name,
                symbol.start_line,
                symbol.end_line,
                symbol.signature,
            ],
            |row| row.get(0),
        )
        .with_context(|| format!("upsert symbol {} in {}", symbol.name, symbol.file_path))?;
    Ok(id)
}

/// Insert an import keyed by (project, file, module, name). Returns `None`
/// when the binding already exists.
pub fn upsert_import(conn: &Connection, project_id: i64, import: &ImportRow<'_>) -> Result<Option<i64>> {
    let id = conn
        .prepare_cached(
            "INSERT INTO imports (project_id, file_path, module, name, name_key, alias, line)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(project_id, file_path, module, name_key) DO NOTHING
             RETURNING id",
        )?
        .query_row(
            params![
                project_id,
                import.file_path,
                import.module,
                import.name,
                import.name.unwrap_or(NO_NAME_KEY),
                import.alias,
                import.line,
            ],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("upsert import {} in {}", import.module, import.file_path))?;
    Ok(id)
}

/// Append a call site. Re-ingesting the same site is a no-op; returns
/// whether a row was written.
pub fn insert_call(
    conn: &Connection,
    project_id: i64,
    source_symbol_id: i64,
    callee: &str,
    line: i64,
) -> Result<bool> {
    let changed = conn
        .prepare_cached(
            "INSERT INTO calls (project_id, source_symbol_id, callee, line)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(project_id, source_symbol_id, callee, line) DO NOTHING",
        )?
        .execute(params![project_id, source_symbol_id, callee, line])?;
    Ok(changed > 0)
}

pub fn record_file(conn: &Connection, project_id: i64, path: &str, hash: &str) -> Result<()> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    conn.prepare_cached(
        "INSERT INTO files (project_id, path, hash, indexed_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(project_id, path) DO UPDATE SET
            hash = excluded.hash,
            indexed_at = excluded.indexed_at",
    )?
    .execute(params![project_id, path, hash, now])?;
    Ok(())
}

/// Set a call's target unless it already has one.
pub fn update_call_resolution(conn: &Connection, call_id: i64, symbol_id: i64) -> Result<bool> {
    let changed = conn
        .prepare_cached(
            "UPDATE calls SET resolved_symbol_id = ?
             WHERE id = ? AND resolved_symbol_id IS NULL",
        )?
        .execute(params![symbol_id, call_id])?;
    Ok(changed > 0)
}

/// Set an import's target unless it already has one.
pub fn update_import_resolution(conn: &Connection, import_id: i64, symbol_id: i64) -> Result<bool> {
    let changed = conn
        .prepare_cached(
            "UPDATE imports SET resolved_symbol_id = ?
             WHERE id = ? AND resolved_symbol_id IS NULL",
        )?
        .execute(params![symbol_id, import_id])?;
    Ok(changed > 0)
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        locator: row.get(2)?,
    })
}

fn symbol_from_row(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    Ok(Symbol {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        kind: row.get(3)?,
        file_path: row.get(4)?,
        name: row.get(5)?,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
        signature: row.get(8)?,
    })
}

fn import_from_row(row: &Row<'_>) -> rusqlite::Result<Import> {
    Ok(Import {
        id: row.get(0)?,
        project_id: row.get(1)?,
        file_path: row.get(2)?,
        module: row.get(3)?,
        name: row.get(4)?,
        alias: row.get(5)?,
        line: row.get(6)?,
        resolved_symbol_id: row.get(7)?,
    })
}

fn call_edge_from_row(row: &Row<'_>) -> rusqlite::Result<CallEdge> {
    Ok(CallEdge {
        caller_id: row.get(0)?,
        caller_name: row.get(1)?,
        caller_file: row.get(2)?,
        line: row.get(3)?,
        callee_id: row.get(4)?,
    })
}
