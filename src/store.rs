//! The archive store: one SQLite file holding the unified `entries` table and
//! its FTS index, plus a sidecar star database attached as `stardb`.
//!
//! Stars are keyed by an entry's business key (conversation file path or
//! thread id), not its rowid, and live in their own file. A full rebuild
//! deletes and recreates the archive wholesale; the sidecar is untouched, so
//! stars survive rebuilds and the surrogate-id reshuffle they cause.

use eyre::{Context, Result, eyre};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Transaction, params};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const CREATE_ENTRIES: &str = "
CREATE TABLE IF NOT EXISTS entries (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    type           TEXT NOT NULL,
    title          TEXT NOT NULL,
    content        TEXT NOT NULL,
    full_json      TEXT NOT NULL,
    file_path      TEXT,
    workspace_path TEXT,
    project        TEXT,
    original_id    TEXT,
    timestamp      TEXT,
    file_mtime     TEXT,
    created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

const SCHEMA_OBJECTS: &str = "
CREATE INDEX IF NOT EXISTS idx_entries_type ON entries(type);
CREATE INDEX IF NOT EXISTS idx_entries_title ON entries(title);
CREATE INDEX IF NOT EXISTS idx_entries_file_path ON entries(file_path);
CREATE INDEX IF NOT EXISTS idx_entries_original_id ON entries(original_id);
CREATE INDEX IF NOT EXISTS idx_entries_project ON entries(project);

CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
    title,
    content,
    project,
    content='entries',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS entries_ai AFTER INSERT ON entries BEGIN
    INSERT INTO entries_fts(rowid, title, content, project)
    VALUES (new.id, new.title, new.content, new.project);
END;

CREATE TRIGGER IF NOT EXISTS entries_ad AFTER DELETE ON entries BEGIN
    INSERT INTO entries_fts(entries_fts, rowid, title, content, project)
    VALUES ('delete', old.id, old.title, old.content, old.project);
END;

CREATE TRIGGER IF NOT EXISTS entries_au AFTER UPDATE ON entries BEGIN
    INSERT INTO entries_fts(entries_fts, rowid, title, content, project)
    VALUES ('delete', old.id, old.title, old.content, old.project);
    INSERT INTO entries_fts(rowid, title, content, project)
    VALUES (new.id, new.title, new.content, new.project);
END;
";

const STARS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stardb.stars (
    key        TEXT PRIMARY KEY,
    starred_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// Which source collection an entry came from. Stored in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Conversation,
    Thread,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Conversation => "conversation",
            EntryKind::Thread => "thread",
        }
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "conversation" => Ok(EntryKind::Conversation),
            "thread" => Ok(EntryKind::Thread),
            other => Err(FromSqlError::Other(
                format!("unknown entry type: {other}").into(),
            )),
        }
    }
}

/// A stored entry as the read API returns it, with the derived star flag.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub title: String,
    pub content: String,
    pub full_json: String,
    pub file_path: Option<String>,
    pub workspace_path: Option<String>,
    pub project: Option<String>,
    pub original_id: Option<String>,
    pub timestamp: Option<String>,
    pub file_mtime: Option<String>,
    pub created_at: String,
    pub starred: bool,
}

/// The extracted fields of a record about to be written. Exactly one of
/// `file_path` / `original_id` is set, depending on `kind`.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: EntryKind,
    pub title: String,
    pub content: String,
    pub full_json: String,
    pub file_path: Option<String>,
    pub workspace_path: Option<String>,
    pub project: Option<String>,
    pub original_id: Option<String>,
    pub timestamp: Option<String>,
    pub file_mtime: Option<String>,
}

/// Handle on an opened archive. Constructed once per run and passed down;
/// the query functions below all take its connection so they work inside and
/// outside transactions alike.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if necessary) the archive at `db_path`, attach the star
    /// sidecar and bring both schemas up to date.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).wrap_err_with(|| {
            format!("Failed to open archive database: {}", db_path.display())
        })?;
        let stars = stars_path(db_path);
        let stars_str = stars.to_str().ok_or_else(|| {
            eyre!("Star database path is not valid UTF-8: {}", stars.display())
        })?;
        conn.execute("ATTACH DATABASE ?1 AS stardb", params![stars_str])
            .wrap_err("Failed to attach star database")?;
        conn.execute_batch(STARS_SCHEMA)
            .wrap_err("Failed to ensure star schema")?;
        ensure_schema(&conn)?;
        Ok(Store { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction()
            .wrap_err("Failed to begin transaction")
    }
}

/// The star sidecar lives next to the archive: `unified.db` ->
/// `unified.stars.db`. It is never deleted by a rebuild.
pub fn stars_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("stars.db")
}

/// Whether the archive must be discarded and rebuilt from scratch: it does
/// not exist yet, or predates the `project` column (which also means its FTS
/// index has the wrong shape, so no incremental migration can reconcile it).
pub fn needs_full_rebuild(db_path: &Path) -> Result<bool> {
    if !db_path.exists() {
        return Ok(true);
    }
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to inspect archive database: {}", db_path.display()))?;
    let has_entries = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'entries'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .wrap_err("Failed to inspect archive schema")?
        > 0;
    if !has_entries {
        return Ok(true);
    }
    Ok(!column_exists(&conn, "entries", "project")?)
}

/// Delete the archive file and its `-wal`/`-shm` siblings. Leaves the star
/// sidecar alone.
pub fn remove_store_files(db_path: &Path) -> Result<()> {
    for path in [
        db_path.to_path_buf(),
        sibling(db_path, "-wal"),
        sibling(db_path, "-shm"),
    ] {
        if path.exists() {
            fs::remove_file(&path)
                .wrap_err_with(|| format!("Failed to remove: {}", path.display()))?;
        }
    }
    Ok(())
}

fn sibling(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Idempotent schema setup: entries table, additive column migrations for
/// stores created by older releases, then indexes, FTS table and triggers.
/// Column migrations must run before the second batch, which references the
/// migrated columns.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_ENTRIES)
        .wrap_err("Failed to create entries table")?;
    for column in ["file_mtime", "project"] {
        if !column_exists(conn, "entries", column)? {
            conn.execute(&format!("ALTER TABLE entries ADD COLUMN {column} TEXT"), [])
                .wrap_err_with(|| format!("Failed to add column: {column}"))?;
        }
    }
    conn.execute_batch(SCHEMA_OBJECTS)
        .wrap_err("Failed to create archive schema objects")?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .wrap_err("Failed to read table info")?;
    let mut rows = stmt.query([]).wrap_err("Failed to query table info")?;
    while let Some(row) = rows.next().wrap_err("Failed to read table info row")? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Read API (consumed by the serving layer)
// ---------------------------------------------------------------------------

pub(crate) const ENTRY_COLUMNS: &str = "e.id, e.type, e.title, e.content, e.full_json, e.file_path, \
    e.workspace_path, e.project, e.original_id, e.timestamp, e.file_mtime, e.created_at, \
    s.key IS NOT NULL";

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        kind: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        full_json: row.get(4)?,
        file_path: row.get(5)?,
        workspace_path: row.get(6)?,
        project: row.get(7)?,
        original_id: row.get(8)?,
        timestamp: row.get(9)?,
        file_mtime: row.get(10)?,
        created_at: row.get(11)?,
        starred: row.get(12)?,
    })
}

/// All entries, newest first, optionally restricted to starred ones. The
/// star join matches on business key, so it holds across rebuilds.
pub fn list_entries(conn: &Connection, starred_only: bool) -> Result<Vec<Entry>> {
    let mut sql = format!(
        "SELECT {ENTRY_COLUMNS}
         FROM entries e
         LEFT JOIN stardb.stars s ON s.key = COALESCE(e.file_path, e.original_id)"
    );
    if starred_only {
        sql.push_str(" WHERE s.key IS NOT NULL");
    }
    sql.push_str(" ORDER BY e.timestamp DESC");

    let mut stmt = conn.prepare(&sql).wrap_err("Failed to prepare entry listing")?;
    let entries = stmt
        .query_map([], entry_from_row)
        .wrap_err("Failed to list entries")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .wrap_err("Failed to read entry rows")?;
    Ok(entries)
}

/// A single entry by surrogate id, `None` when it does not exist.
pub fn get_entry(conn: &Connection, id: i64) -> Result<Option<Entry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS}
         FROM entries e
         LEFT JOIN stardb.stars s ON s.key = COALESCE(e.file_path, e.original_id)
         WHERE e.id = ?1"
    );
    conn.query_row(&sql, params![id], entry_from_row)
        .optional()
        .wrap_err("Failed to fetch entry")
}

/// Flip the star on the entry with surrogate id `id`. The id is resolved to
/// the entry's business key first, so the star row outlives the id. Returns
/// the new state, `None` when no such entry exists.
pub fn toggle_star(conn: &Connection, id: i64) -> Result<Option<bool>> {
    let key: Option<Option<String>> = conn
        .query_row(
            "SELECT COALESCE(file_path, original_id) FROM entries WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .wrap_err("Failed to resolve entry key")?;
    let Some(Some(key)) = key else {
        return Ok(None);
    };
    let removed = conn
        .execute("DELETE FROM stardb.stars WHERE key = ?1", params![key])
        .wrap_err("Failed to clear star")?;
    if removed > 0 {
        return Ok(Some(false));
    }
    conn.execute("INSERT INTO stardb.stars (key) VALUES (?1)", params![key])
        .wrap_err("Failed to set star")?;
    Ok(Some(true))
}

// ---------------------------------------------------------------------------
// Write primitives used by the sync engine
// ---------------------------------------------------------------------------

/// Business key -> stored change-detection value for every conversation.
pub fn conversation_mtimes(conn: &Connection) -> Result<HashMap<String, Option<String>>> {
    lookup_map(
        conn,
        "SELECT file_path, file_mtime FROM entries
         WHERE type = 'conversation' AND file_path IS NOT NULL",
    )
}

/// Business key -> stored change-detection value for every thread.
pub fn thread_timestamps(conn: &Connection) -> Result<HashMap<String, Option<String>>> {
    lookup_map(
        conn,
        "SELECT original_id, timestamp FROM entries
         WHERE type = 'thread' AND original_id IS NOT NULL",
    )
}

fn lookup_map(conn: &Connection, sql: &str) -> Result<HashMap<String, Option<String>>> {
    let mut stmt = conn.prepare(sql).wrap_err("Failed to prepare lookup")?;
    let map = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .wrap_err("Failed to run lookup")?
        .collect::<rusqlite::Result<HashMap<_, _>>>()
        .wrap_err("Failed to read lookup rows")?;
    Ok(map)
}

pub fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO entries
         (type, title, content, full_json, file_path, workspace_path, project, original_id, timestamp, file_mtime)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.kind.as_str(),
            entry.title,
            entry.content,
            entry.full_json,
            entry.file_path,
            entry.workspace_path,
            entry.project,
            entry.original_id,
            entry.timestamp,
            entry.file_mtime,
        ],
    )
    .wrap_err("Failed to insert entry")?;
    Ok(())
}

/// In-place update matched by business key; the surrogate id and created_at
/// are untouched.
pub fn update_conversation(conn: &Connection, file_path: &str, entry: &NewEntry) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE entries
             SET title = ?1, content = ?2, full_json = ?3, workspace_path = ?4,
                 project = ?5, timestamp = ?6, file_mtime = ?7
             WHERE file_path = ?8",
            params![
                entry.title,
                entry.content,
                entry.full_json,
                entry.workspace_path,
                entry.project,
                entry.timestamp,
                entry.file_mtime,
                file_path,
            ],
        )
        .wrap_err("Failed to update conversation entry")?;
    Ok(changed > 0)
}

pub fn update_thread(conn: &Connection, original_id: &str, entry: &NewEntry) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE entries
             SET title = ?1, content = ?2, full_json = ?3, workspace_path = ?4,
                 project = ?5, timestamp = ?6
             WHERE original_id = ?7",
            params![
                entry.title,
                entry.content,
                entry.full_json,
                entry.workspace_path,
                entry.project,
                entry.timestamp,
                original_id,
            ],
        )
        .wrap_err("Failed to update thread entry")?;
    Ok(changed > 0)
}

pub fn delete_conversation(conn: &Connection, file_path: &str) -> Result<bool> {
    let changed = conn
        .execute("DELETE FROM entries WHERE file_path = ?1", params![file_path])
        .wrap_err("Failed to delete conversation entry")?;
    Ok(changed > 0)
}

pub fn delete_thread(conn: &Connection, original_id: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "DELETE FROM entries WHERE original_id = ?1",
            params![original_id],
        )
        .wrap_err("Failed to delete thread entry")?;
    Ok(changed > 0)
}
