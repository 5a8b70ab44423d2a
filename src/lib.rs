//! # zed-chat-archive
//!
//! A CLI tool that imports archived [Zed](https://zed.dev) AI chat history into a
//! single searchable SQLite database.
//!
//! ## What it does
//!
//! Zed keeps AI history in two shapes: text-thread "conversations" as individual
//! `*.zed.json` files, and agent threads as rows of a SQLite database
//! (`threads.db`) with Zstd-compressed message bodies. This tool walks an
//! archived copy of both, extracts a title, readable text, and project context
//! from every record, and stores them as uniform entries in one database with a
//! full-text index over titles, content, and project names.
//!
//! The source data is only ever read. `threads.db` is snapshotted before any
//! query, so a running Zed instance is never blocked.
//!
//! ## Incremental import
//!
//! On repeated runs, records are matched by stable identity (the conversation's
//! file path, the thread's id) and compared by their change markers (file mtime,
//! `updated_at`). Unchanged records are skipped without reading their bodies,
//! and records that disappeared from the source are removed from the archive.
//! Starred entries keep their stars, even across `--full` rebuilds.
//!
//! ## Usage
//!
//! ```sh
//! # Import ./datasources into ./datasources/unified.db
//! zed-chat-archive
//!
//! # Explicit paths, rebuilt from scratch
//! zed-chat-archive ~/backups/zed ~/backups/zed/unified.db --full
//! ```
//!
//! Preferences can be persisted in `~/.config/zed-chat-archive/config.toml`.
//!
//! ## Compatibility
//!
//! Tracks Zed's internal (undocumented) data formats. Last verified against Zed
//! `0.225.9`. If a Zed update breaks the import, please
//! [open an issue](https://github.com/egemengol/zed-chat-archive/issues).

pub mod extract;
pub mod formats;
pub mod search;
pub mod store;
pub mod sync;
pub mod utils;

// Re-export the read surface a serving layer consumes
pub use search::search_entries;
pub use store::{Entry, EntryKind, Store, get_entry, list_entries, toggle_star};
