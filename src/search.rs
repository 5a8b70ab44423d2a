//! Full-text search over the archive, and bulk maintenance of the FTS5
//! index. Day-to-day the index is kept in sync by the triggers the schema
//! installs; the functions here cover querying it and rebuilding it
//! wholesale.

use crate::store::{ENTRY_COLUMNS, Entry, entry_from_row};
use eyre::{Context, Result};
use rusqlite::{Connection, params};

/// Run a user-typed query against title, content and project. Tokens are
/// matched whole except the trailing one, which prefix-matches so results
/// appear while a word is still being typed. Results come back newest first,
/// optionally restricted to starred entries. A blank query matches nothing.
pub fn search_entries(conn: &Connection, raw_query: &str, starred_only: bool) -> Result<Vec<Entry>> {
    let Some(match_query) = build_match_query(raw_query) else {
        return Ok(Vec::new());
    };
    let mut sql = format!(
        "SELECT {ENTRY_COLUMNS}
         FROM entries e
         JOIN entries_fts ON entries_fts.rowid = e.id
         LEFT JOIN stardb.stars s ON s.key = COALESCE(e.file_path, e.original_id)
         WHERE entries_fts MATCH ?1"
    );
    if starred_only {
        sql.push_str(" AND s.key IS NOT NULL");
    }
    sql.push_str(" ORDER BY e.timestamp DESC");

    let mut stmt = conn.prepare(&sql).wrap_err("Failed to prepare search")?;
    let entries = stmt
        .query_map(params![match_query], entry_from_row)
        .wrap_err("Failed to run search")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .wrap_err("Failed to read search results")?;
    Ok(entries)
}

/// Turn raw user input into FTS5 MATCH syntax: each whitespace-separated
/// token becomes a quoted string (embedded quotes doubled) so FTS operators
/// in the input stay inert, and the last token gets a `*` for prefix
/// matching. `None` for blank input.
fn build_match_query(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let last = tokens.len().checked_sub(1)?;
    let query = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let quoted = format!("\"{}\"", token.replace('"', "\"\""));
            if i == last { format!("{quoted}*") } else { quoted }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Some(query)
}

/// Clear the index and repopulate it from the entries table in one pass.
/// Runs after every full import; also the recovery path for an index that
/// has fallen out from under its entries.
pub fn rebuild_index(conn: &Connection) -> Result<()> {
    conn.execute("INSERT INTO entries_fts(entries_fts) VALUES ('delete-all')", [])
        .wrap_err("Failed to clear search index")?;
    conn.execute(
        "INSERT INTO entries_fts(rowid, title, content, project)
         SELECT id, title, content, project FROM entries",
        [],
    )
    .wrap_err("Failed to repopulate search index")?;
    Ok(())
}

/// Rebuild the index if it is empty while entries exist. Returns whether a
/// rebuild ran.
pub fn ensure_index(conn: &Connection) -> Result<bool> {
    if indexed_rows(conn)? > 0 {
        return Ok(false);
    }
    let entries: i64 = conn
        .query_row("SELECT count(*) FROM entries", [], |row| row.get(0))
        .wrap_err("Failed to count entries")?;
    if entries == 0 {
        return Ok(false);
    }
    rebuild_index(conn)?;
    Ok(true)
}

/// Row count of the index itself. An external-content FTS5 table answers
/// plain scans from the content table, so the docsize shadow table is the
/// only honest measure of what is actually indexed.
fn indexed_rows(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT count(*) FROM entries_fts_docsize", [], |row| row.get(0))
        .wrap_err("Failed to measure search index")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntryKind, NewEntry, Store, insert_entry, list_entries, toggle_star};

    fn seeded_store(dir: &tempfile::TempDir) -> Store {
        let store = Store::open(&dir.path().join("unified.db")).unwrap();
        let rows = [
            ("/a.zed.json", "hello world", "rust borrow checker notes", "2025-03-01T00:00:00+00:00"),
            ("/b.zed.json", "grocery list", "apples and oranges", "2025-04-01T00:00:00+00:00"),
            ("/c.zed.json", "worldly advice", "hello again", "2025-05-01T00:00:00+00:00"),
        ];
        for (key, title, content, ts) in rows {
            insert_entry(
                store.conn(),
                &NewEntry {
                    kind: EntryKind::Conversation,
                    title: title.to_owned(),
                    content: content.to_owned(),
                    full_json: "{}".to_owned(),
                    file_path: Some(key.to_owned()),
                    workspace_path: None,
                    project: None,
                    original_id: None,
                    timestamp: Some(ts.to_owned()),
                    file_mtime: Some(ts.to_owned()),
                },
            )
            .unwrap();
        }
        store
    }

    #[test]
    fn match_query_quotes_tokens_and_prefixes_the_last() {
        assert_eq!(build_match_query("hello wor").as_deref(), Some("\"hello\" \"wor\"*"));
        assert_eq!(build_match_query("one").as_deref(), Some("\"one\"*"));
        assert_eq!(build_match_query("  "), None);
        assert_eq!(build_match_query("say \"hi").as_deref(), Some("\"say\" \"\"\"hi\"*"));
    }

    #[test]
    fn trailing_token_matches_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);

        let hits = search_entries(store.conn(), "borrow check", false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "hello world");

        // "wor" prefixes both "world" and "worldly"; newest first.
        let hits = search_entries(store.conn(), "wor", false).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "worldly advice");
    }

    #[test]
    fn blank_and_unmatched_queries_return_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        assert!(search_entries(store.conn(), "   ", false).unwrap().is_empty());
        assert!(search_entries(store.conn(), "zebra", false).unwrap().is_empty());
    }

    #[test]
    fn operator_characters_are_inert() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        // Unquoted, a leading AND is a syntax error; quoted it is a plain term.
        let hits = search_entries(store.conn(), "AND", false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "grocery list");
        // Embedded quotes are escaped rather than breaking the query.
        assert!(search_entries(store.conn(), "say \"hi", false).unwrap().is_empty());
    }

    #[test]
    fn search_respects_the_star_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        let conn = store.conn();

        assert!(search_entries(conn, "hello", true).unwrap().is_empty());
        let id = list_entries(conn, false)
            .unwrap()
            .iter()
            .find(|e| e.title == "hello world")
            .unwrap()
            .id;
        toggle_star(conn, id).unwrap();

        let hits = search_entries(conn, "hello", true).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].starred);
    }

    #[test]
    fn ensure_index_recovers_an_emptied_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        let conn = store.conn();

        assert!(!ensure_index(conn).unwrap());

        conn.execute("INSERT INTO entries_fts(entries_fts) VALUES ('delete-all')", [])
            .unwrap();
        assert!(search_entries(conn, "hello", false).unwrap().is_empty());

        assert!(ensure_index(conn).unwrap());
        assert_eq!(search_entries(conn, "hello", false).unwrap().len(), 2);
    }

    #[test]
    fn rebuild_index_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);
        rebuild_index(store.conn()).unwrap();
        rebuild_index(store.conn()).unwrap();
        assert_eq!(search_entries(store.conn(), "hello", false).unwrap().len(), 2);
    }

    #[test]
    fn ensure_index_is_a_noop_on_an_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("unified.db")).unwrap();
        assert!(!ensure_index(store.conn()).unwrap());
    }
}
