use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

pub const SCHEMA_VERSION: i64 = 1;

/// Sentinel stored in `symbols.parent_key` for top-level definitions, so the
/// natural-key index treats "no parent" as a comparable value.
pub const NO_PARENT_KEY: i64 = 0;

/// Sentinel stored in `imports.name_key` for whole-module imports.
pub const NO_NAME_KEY: &str = "";

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            locator TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_files_key ON files(project_id, path);

        CREATE TABLE IF NOT EXISTS symbols (
            id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL,
            parent_id INTEGER,
            parent_key INTEGER NOT NULL DEFAULT 0,
            kind TEXT NOT NULL,
            file_path TEXT NOT NULL,
            name TEXT NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            signature TEXT NOT NULL,
            FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE,
            FOREIGN KEY(parent_id) REFERENCES symbols(id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_symbols_key
            ON symbols(project_id, file_path, parent_key, name);
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(project_id, name);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(project_id, file_path);

        CREATE TABLE IF NOT EXISTS imports (
            id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL,
            file_path TEXT NOT NULL,
            module TEXT NOT NULL,
            name TEXT,
            name_key TEXT NOT NULL DEFAULT '',
            alias TEXT,
            line INTEGER NOT NULL,
            resolved_symbol_id INTEGER,
            FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE,
            FOREIGN KEY(resolved_symbol_id) REFERENCES symbols(id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_imports_key
            ON imports(project_id, file_path, module, name_key);
        CREATE INDEX IF NOT EXISTS idx_imports_file ON imports(project_id, file_path);

        CREATE TABLE IF NOT EXISTS calls (
            id INTEGER PRIMARY KEY,
            project_id INTEGER NOT NULL,
            source_symbol_id INTEGER NOT NULL,
            callee TEXT NOT NULL,
            line INTEGER NOT NULL,
            resolved_symbol_id INTEGER,
            FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE,
            FOREIGN KEY(source_symbol_id) REFERENCES symbols(id),
            FOREIGN KEY(resolved_symbol_id) REFERENCES symbols(id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_calls_key
            ON calls(project_id, source_symbol_id, callee, line);
        CREATE INDEX IF NOT EXISTS idx_calls_resolved ON calls(project_id, resolved_symbol_id);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    if existing.unwrap_or(0) < SCHEMA_VERSION {
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}
