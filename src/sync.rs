//! Reconciliation of the two source collections against the archive.
//!
//! A run is either a full rebuild (archive discarded and reimported inside
//! one transaction) or an incremental sync (per collection: look up what the
//! archive knows, enumerate the source, skip/update/insert by business key,
//! then delete entries whose source record is gone). Matching is always by
//! business key, never by position, so enumeration order cannot change the
//! converged result.
//!
//! One bad record never aborts a run: its error is printed with the record's
//! key and counted, and the pass moves on.

use crate::extract;
use crate::formats::{ConversationExport, ThreadDocument};
use crate::search;
use crate::store::{self, EntryKind, NewEntry, Store};
use crate::utils::{self, ImportConfig, SyncOutcome};
use eyre::{Context, Result, eyre};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-collection tally of what a pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl CollectionCounts {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Added => self.added += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// What a whole run did, per collection.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub conversations: CollectionCounts,
    pub threads: CollectionCounts,
    pub rebuilt: bool,
}

impl RunReport {
    pub fn total_errors(&self) -> usize {
        self.conversations.errors + self.threads.errors
    }
}

/// Run one import. Setup failures (missing source root, unopenable archive)
/// return an error; everything that goes wrong with individual records is
/// reported and counted instead.
pub fn execute(config: &ImportConfig) -> Result<RunReport> {
    // Validate the source before anything destructive happens to the
    // archive: a typo in the source path must not cost the existing data.
    if !config.source_dir.is_dir() {
        return Err(eyre!(
            "Source directory not found: {}",
            config.source_dir.display()
        ));
    }

    let archive_existed = config.db_path.exists();
    let full = config.full || store::needs_full_rebuild(&config.db_path)?;
    if full && !config.full && archive_existed && !config.quiet {
        eprintln!(
            "Archive schema has changed; rebuilding {} from scratch.",
            config.db_path.display()
        );
    }
    if full {
        store::remove_store_files(&config.db_path)?;
    }
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut store = Store::open(&config.db_path)?;
    let conversations_dir = config.source_dir.join("conversations");
    let threads_db = config.source_dir.join("threads").join("threads.db");

    let report = if full {
        let tx = store.transaction()?;
        let conversations = sync_conversations(&tx, &conversations_dir, true, config.verbose)?;
        let threads = sync_threads(&tx, &threads_db, true, config.verbose)?;
        search::rebuild_index(&tx)?;
        tx.commit().wrap_err("Failed to commit import")?;
        RunReport {
            conversations,
            threads,
            rebuilt: true,
        }
    } else {
        let conversations = {
            let tx = store.transaction()?;
            let counts = sync_conversations(&tx, &conversations_dir, false, config.verbose)?;
            tx.commit().wrap_err("Failed to commit conversation sync")?;
            counts
        };
        let threads = {
            let tx = store.transaction()?;
            let counts = sync_threads(&tx, &threads_db, false, config.verbose)?;
            tx.commit().wrap_err("Failed to commit thread sync")?;
            counts
        };
        if search::ensure_index(store.conn())? && !config.quiet {
            eprintln!("Search index was empty; repopulated it.");
        }
        RunReport {
            conversations,
            threads,
            rebuilt: false,
        }
    };

    if !config.quiet {
        let c = report.conversations;
        let t = report.threads;
        eprintln!(
            "\nDone. Conversations: {} added, {} updated, {} deleted, {} skipped.",
            c.added, c.updated, c.deleted, c.skipped
        );
        eprintln!(
            "      Threads: {} added, {} updated, {} deleted, {} skipped.",
            t.added, t.updated, t.deleted, t.skipped
        );
        if report.total_errors() > 0 {
            eprintln!("Completed with {} error(s).", report.total_errors());
        }
    }

    Ok(report)
}

/// Sync the `*.zed.json` files of one conversations directory. A missing
/// directory skips the pass entirely, tombstones included, so losing the
/// directory cannot wipe the collection from the archive.
fn sync_conversations(
    conn: &Connection,
    dir: &Path,
    full: bool,
    verbose: bool,
) -> Result<CollectionCounts> {
    let mut counts = CollectionCounts::default();
    if !dir.is_dir() {
        return Ok(counts);
    }

    let lookup = if full {
        HashMap::new()
    } else {
        store::conversation_mtimes(conn)?
    };
    let mut seen: HashSet<String> = HashSet::new();

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .wrap_err_with(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().ends_with(".zed.json"))
        })
        .collect();
    files.sort();

    for path in files {
        let key = path.to_string_lossy().into_owned();
        seen.insert(key.clone());
        let prior = lookup.get(&key);
        match sync_one_conversation(conn, &path, &key, prior, verbose) {
            Ok(outcome) => counts.record(outcome),
            Err(e) => {
                counts.errors += 1;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| key.clone());
                eprintln!("Error [{}]: {:#}", name, e);
            }
        }
    }

    if !full {
        for key in lookup.keys() {
            if !seen.contains(key) && store::delete_conversation(conn, key)? {
                counts.deleted += 1;
                if verbose {
                    println!("Deleted: {key}");
                }
            }
        }
    }

    Ok(counts)
}

fn sync_one_conversation(
    conn: &Connection,
    path: &Path,
    key: &str,
    prior: Option<&Option<String>>,
    verbose: bool,
) -> Result<SyncOutcome> {
    let mtime = utils::file_mtime_rfc3339(path)?;

    // Unchanged mtime means skip before the file is even read. A NULL stored
    // mtime (row migrated from an older schema) never compares equal, so
    // those re-extract exactly once.
    if let Some(prev) = prior
        && prev.as_deref() == Some(mtime.as_str())
    {
        if verbose {
            println!("Skipped: {}", display_name(path));
        }
        return Ok(SyncOutcome::Skipped);
    }

    let raw = fs::read_to_string(path).wrap_err("Failed to read conversation file")?;
    let doc: ConversationExport =
        serde_json::from_str(&raw).wrap_err("Failed to parse conversation JSON")?;

    let workspace_path = extract::conversation_workspace(&doc);
    let project = workspace_path.as_deref().and_then(extract::project_label);
    let entry = NewEntry {
        kind: EntryKind::Conversation,
        title: extract::conversation_title(&doc, path),
        content: extract::conversation_content(&doc),
        full_json: raw,
        file_path: Some(key.to_owned()),
        workspace_path,
        project,
        original_id: None,
        timestamp: Some(mtime.clone()),
        file_mtime: Some(mtime),
    };

    if prior.is_some() {
        store::update_conversation(conn, key, &entry)?;
        if verbose {
            println!("Updated: {}", display_name(path));
        }
        Ok(SyncOutcome::Updated)
    } else {
        store::insert_entry(conn, &entry)?;
        if verbose {
            println!("Added: {}", display_name(path));
        }
        Ok(SyncOutcome::Added)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Sync the rows of one `threads.db`. The live store is snapshotted first so
/// a running Zed instance never sees our read locks. A missing store file
/// skips the pass, tombstones included.
fn sync_threads(
    conn: &Connection,
    threads_db: &Path,
    full: bool,
    verbose: bool,
) -> Result<CollectionCounts> {
    let mut counts = CollectionCounts::default();
    if !threads_db.is_file() {
        return Ok(counts);
    }

    let snapshot = utils::backup_database(threads_db)?;
    let source = Connection::open(snapshot.path()).wrap_err("Failed to open threads snapshot")?;

    let lookup = if full {
        HashMap::new()
    } else {
        store::thread_timestamps(conn)?
    };
    let mut seen: HashSet<String> = HashSet::new();

    let mut stmt = source
        .prepare("SELECT id, summary, updated_at, data_type, data FROM threads ORDER BY updated_at DESC")
        .wrap_err("Failed to query threads")?;
    let mut rows = stmt.query([]).wrap_err("Failed to query threads")?;
    while let Some(row) = rows.next().wrap_err("Failed to read thread row")? {
        let id: String = row.get(0)?;
        let summary: String = row.get(1)?;
        let updated_at: String = row.get(2)?;
        seen.insert(id.clone());

        let prior = lookup.get(&id);
        // Unchanged updated_at means skip before the blob is touched.
        if let Some(prev) = prior
            && prev.as_deref() == Some(updated_at.as_str())
        {
            counts.skipped += 1;
            if verbose {
                println!("Skipped: {}", short_id(&id));
            }
            continue;
        }

        let exists = prior.is_some();
        match sync_one_thread(conn, row, &id, &summary, &updated_at, exists, verbose) {
            Ok(outcome) => counts.record(outcome),
            Err(e) => {
                counts.errors += 1;
                eprintln!("Error [{}]: {:#}", short_id(&id), e);
            }
        }
    }
    drop(rows);
    drop(stmt);

    if !full {
        for key in lookup.keys() {
            if !seen.contains(key) && store::delete_thread(conn, key)? {
                counts.deleted += 1;
                if verbose {
                    println!("Deleted: {}", short_id(key));
                }
            }
        }
    }

    Ok(counts)
}

fn sync_one_thread(
    conn: &Connection,
    row: &rusqlite::Row<'_>,
    id: &str,
    summary: &str,
    updated_at: &str,
    exists: bool,
    verbose: bool,
) -> Result<SyncOutcome> {
    let data_type: String = row.get(3)?;
    let data: Vec<u8> = row.get(4)?;
    let json = utils::decompress(&data_type, &data)?;
    let doc: ThreadDocument =
        serde_json::from_slice(&json).wrap_err("Failed to parse thread document")?;
    let full_json = String::from_utf8(json).wrap_err("Thread document is not valid UTF-8")?;

    let workspace_path = extract::thread_workspace(&doc);
    let project = workspace_path.as_deref().and_then(extract::project_label);
    let entry = NewEntry {
        kind: EntryKind::Thread,
        title: extract::thread_title(&doc, summary),
        content: extract::thread_content(&doc),
        full_json,
        file_path: None,
        workspace_path,
        project,
        original_id: Some(id.to_owned()),
        timestamp: Some(updated_at.to_owned()),
        file_mtime: None,
    };

    if exists {
        store::update_thread(conn, id, &entry)?;
        if verbose {
            println!("Updated: {}", entry.title);
        }
        Ok(SyncOutcome::Updated)
    } else {
        store::insert_entry(conn, &entry)?;
        if verbose {
            println!("Added: {}", entry.title);
        }
        Ok(SyncOutcome::Added)
    }
}

fn short_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}
