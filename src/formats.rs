//! Type definitions for the two source formats the archive ingests.
//!
//! Thread documents are stored Zstd-compressed (level 3) or as raw JSON in a
//! SQLite `threads` table. Conversation exports are flat `*.zed.json` files.
//! Current thread JSON version: `0.3.0`, with `0.2.0` still found in older
//! stores. Current Zed version: `0.225.9`.
//!
//! Thread table schema:
//! ```sql
//! CREATE TABLE IF NOT EXISTS threads (
//!     id        TEXT PRIMARY KEY,
//!     parent_id TEXT,
//!     summary   TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     data_type  TEXT NOT NULL,   -- "json" | "zstd"
//!     data       BLOB NOT NULL
//! );
//! ```
//!
//! Source files:
//! - `crates/agent/src/db.rs`            – `DbThread`
//! - `crates/agent/src/thread.rs`        – `Message`, `UserMessageContent`, `AgentMessageContent`
//! - `crates/agent/src/legacy_thread.rs` – `SerializedThread` (v0.2.0), `SerializedMessage`, `SerializedMessageSegment`
//! - `crates/agent/src/agent.rs`         – `ProjectSnapshot`
//! - `crates/project/src/telemetry_snapshot.rs` – `TelemetryWorktreeSnapshot`
//! - `crates/assistant_context/src/assistant_context.rs` – `SavedContext` (the `.zed.json` export)
//!
//! Only the fields the archive extracts are modeled here; everything else in
//! a document is ignored on deserialization and preserved verbatim through
//! the stored `full_json` column.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Thread documents
// ---------------------------------------------------------------------------

/// A decompressed thread document, dispatched on its `version` field.
///
/// Documents with a version other than `0.3.0` or `0.2.0` deserialize as
/// [`ThreadDocument::Unsupported`]: they still get an entry (titled from the
/// row's `summary` column) but contribute no message content. A document
/// missing the `version` field altogether fails to parse and is reported as
/// a malformed record.
#[derive(Debug, Deserialize)]
#[serde(tag = "version")]
pub enum ThreadDocument {
    #[serde(rename = "0.3.0")]
    Current(CurrentThread),
    #[serde(rename = "0.2.0")]
    Legacy(LegacyThread),
    #[serde(other)]
    Unsupported,
}

/// Version `0.3.0` thread body.
///
/// Source: `crates/agent/src/db.rs` – `DbThread`
#[derive(Debug, Deserialize)]
pub struct CurrentThread {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    #[serde(default)]
    pub initial_project_snapshot: Option<ProjectSnapshot>,
}

/// One message in a `0.3.0` thread. Serialized externally tagged, so a user
/// turn is `{"User": {...}}` and an agent turn `{"Agent": {...}}`. The
/// fallback variant absorbs `"Resume"` markers and future message kinds.
///
/// Source: `crates/agent/src/thread.rs` – `Message`
#[derive(Debug, Deserialize)]
pub enum ThreadMessage {
    User(MessageBody),
    Agent(MessageBody),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// The shared part of user and agent messages: the ordered content items.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

/// One content item of a `0.3.0` message.
///
/// The archive renders `Text` verbatim and `ToolUse` as an inline marker;
/// thinking blocks, mentions, images and anything newer fall into the
/// untagged variant and render as nothing.
///
/// Source: `crates/agent/src/thread.rs` – `UserMessageContent`, `AgentMessageContent`
#[derive(Debug, Deserialize)]
pub enum ContentItem {
    Text(String),
    ToolUse(ToolUseItem),
    #[serde(untagged)]
    Other(serde_json::Value),
}

/// Tool invocation payload; only the tool name is displayed.
#[derive(Debug, Deserialize)]
pub struct ToolUseItem {
    #[serde(default)]
    pub name: Option<String>,
}

/// Version `0.2.0` thread body.
///
/// Source: `crates/agent/src/legacy_thread.rs` – `SerializedThread`
#[derive(Debug, Deserialize)]
pub struct LegacyThread {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<LegacyMessage>,
    #[serde(default)]
    pub initial_project_snapshot: Option<ProjectSnapshot>,
}

/// One message in a legacy thread: a lowercase role string plus segments.
///
/// Source: `crates/agent/src/legacy_thread.rs` – `SerializedMessage`
#[derive(Debug, Deserialize)]
pub struct LegacyMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub segments: Vec<LegacySegment>,
}

/// A legacy message segment. Plain text and thinking segments both carry a
/// `text` field; redacted thinking carries `data` instead and so reads as
/// empty here.
#[derive(Debug, Deserialize)]
pub struct LegacySegment {
    #[serde(default)]
    pub text: String,
}

/// Project state captured when a thread was started.
///
/// Source: `crates/agent/src/agent.rs` – `ProjectSnapshot`
#[derive(Debug, Deserialize)]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub worktree_snapshots: Vec<WorktreeSnapshot>,
}

/// Source: `crates/project/src/telemetry_snapshot.rs` – `TelemetryWorktreeSnapshot`
#[derive(Debug, Deserialize)]
pub struct WorktreeSnapshot {
    pub worktree_path: String,
}

// ---------------------------------------------------------------------------
// Conversation exports
// ---------------------------------------------------------------------------

/// A flat `*.zed.json` conversation export.
///
/// Source: `crates/assistant_context/src/assistant_context.rs` – `SavedContext`
#[derive(Debug, Deserialize)]
pub struct ConversationExport {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub slash_command_output_sections: Vec<OutputSection>,
}

/// Output region of a slash command invocation inside a conversation. The
/// metadata path, when present, points at the file the command ran against.
#[derive(Debug, Deserialize)]
pub struct OutputSection {
    #[serde(default)]
    pub metadata: Option<SectionMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct SectionMetadata {
    #[serde(default)]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_thread_parses_with_version_tag() {
        let json = r#"{
            "version": "0.3.0",
            "title": "Fix the parser",
            "messages": [
                {"User": {"id": "u1", "content": [{"Text": "hello"}]}},
                {"Agent": {"content": [{"Text": "hi"}], "tool_results": {}}},
                "Resume"
            ]
        }"#;
        let doc: ThreadDocument = serde_json::from_str(json).unwrap();
        match doc {
            ThreadDocument::Current(t) => {
                assert_eq!(t.title, "Fix the parser");
                assert_eq!(t.messages.len(), 3);
                assert!(matches!(t.messages[2], ThreadMessage::Other(_)));
            }
            _ => panic!("expected current thread"),
        }
    }

    #[test]
    fn legacy_thread_parses_with_version_tag() {
        let json = r#"{
            "version": "0.2.0",
            "summary": "Old chat",
            "messages": [
                {"id": 0, "role": "user", "segments": [{"type": "text", "text": "hey"}]}
            ]
        }"#;
        let doc: ThreadDocument = serde_json::from_str(json).unwrap();
        match doc {
            ThreadDocument::Legacy(t) => {
                assert_eq!(t.summary, "Old chat");
                assert_eq!(t.messages[0].role.as_deref(), Some("user"));
            }
            _ => panic!("expected legacy thread"),
        }
    }

    #[test]
    fn unknown_version_becomes_unsupported() {
        let doc: ThreadDocument = serde_json::from_str(r#"{"version": "9.9.9"}"#).unwrap();
        assert!(matches!(doc, ThreadDocument::Unsupported));
    }

    #[test]
    fn missing_version_is_a_parse_error() {
        assert!(serde_json::from_str::<ThreadDocument>(r#"{"title": "x"}"#).is_err());
    }

    #[test]
    fn unknown_content_items_fall_through() {
        let json = r#"{
            "version": "0.3.0",
            "title": "t",
            "messages": [
                {"Agent": {"content": [
                    {"Thinking": {"text": "hmm", "signature": null}},
                    {"RedactedThinking": "xxxx"},
                    {"ToolUse": {"id": "1", "name": "grep", "raw_input": "{}"}}
                ]}}
            ]
        }"#;
        let doc: ThreadDocument = serde_json::from_str(json).unwrap();
        let ThreadDocument::Current(t) = doc else {
            panic!("expected current thread");
        };
        let ThreadMessage::Agent(body) = &t.messages[0] else {
            panic!("expected agent message");
        };
        assert!(matches!(body.content[0], ContentItem::Other(_)));
        assert!(matches!(body.content[1], ContentItem::Other(_)));
        match &body.content[2] {
            ContentItem::ToolUse(tool) => assert_eq!(tool.name.as_deref(), Some("grep")),
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn conversation_export_tolerates_sparse_documents() {
        let doc: ConversationExport = serde_json::from_str("{}").unwrap();
        assert!(doc.summary.is_none());
        assert!(doc.text.is_none());
        assert!(doc.slash_command_output_sections.is_empty());

        let doc: ConversationExport = serde_json::from_str(
            r#"{
                "version": "0.4.0",
                "summary": "s",
                "text": "body",
                "slash_command_output_sections": [
                    {"range": {"start": 0, "end": 4}, "label": "file", "metadata": {"path": "/tmp/a"}},
                    {"range": {"start": 5, "end": 9}, "label": "now"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.text.as_deref(), Some("body"));
        let paths: Vec<_> = doc
            .slash_command_output_sections
            .iter()
            .filter_map(|s| s.metadata.as_ref()?.path.as_deref())
            .collect();
        assert_eq!(paths, vec!["/tmp/a"]);
    }
}
