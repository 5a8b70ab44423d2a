//! Derivation of the display/search fields of an entry from a parsed source
//! document: title, content, workspace path and project label.
//!
//! Everything here is a pure function over [`crate::formats`] types; I/O and
//! error reporting stay in the sync engine.

use crate::formats::{ContentItem, ConversationExport, ThreadDocument, ThreadMessage};
use std::path::Path;

const UNTITLED_THREAD: &str = "Untitled Thread";
const UNTITLED_CONVERSATION: &str = "Untitled Conversation";

/// Title of a conversation: its non-empty `summary`, otherwise the file name
/// with the `.zed.json` suffix, one leading `- ` and surrounding whitespace
/// removed. Falls back to a placeholder so titles are never empty.
pub fn conversation_title(doc: &ConversationExport, path: &Path) -> String {
    if let Some(summary) = doc.summary.as_deref()
        && !summary.is_empty()
    {
        return summary.to_owned();
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".zed.json").unwrap_or(&name);
    let stem = stem.trim_start();
    let stem = stem.strip_prefix('-').map_or(stem, str::trim_start);
    let title = stem.trim_end();
    if title.is_empty() {
        UNTITLED_CONVERSATION.to_owned()
    } else {
        title.to_owned()
    }
}

/// Searchable text of a conversation: the export's `text` field verbatim.
pub fn conversation_content(doc: &ConversationExport) -> String {
    doc.text.clone().unwrap_or_default()
}

/// Workspace a conversation belongs to, derived from the file paths its slash
/// command sections reference: a single path is used as-is, several paths
/// collapse to their longest common component-wise prefix.
pub fn conversation_workspace(doc: &ConversationExport) -> Option<String> {
    let paths: Vec<&str> = doc
        .slash_command_output_sections
        .iter()
        .filter_map(|s| s.metadata.as_ref()?.path.as_deref())
        .collect();
    match paths.as_slice() {
        [] => None,
        [only] => Some((*only).to_owned()),
        _ => common_path_prefix(&paths),
    }
}

/// Longest shared leading run of `/`-separated components. `None` when the
/// paths diverge immediately or share only the leading slash.
fn common_path_prefix(paths: &[&str]) -> Option<String> {
    let mut common: Vec<&str> = paths.first()?.split('/').collect();
    for path in &paths[1..] {
        let parts: Vec<&str> = path.split('/').collect();
        let shared = common
            .iter()
            .zip(parts.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
        if common.is_empty() {
            return None;
        }
    }
    let joined = common.join("/");
    if joined.is_empty() { None } else { Some(joined) }
}

/// Title of a thread: the document's own `title` (current schema) or
/// `summary` (legacy schema); for unsupported versions the `summary` column
/// of the source row. Empty results become a placeholder.
pub fn thread_title(doc: &ThreadDocument, row_summary: &str) -> String {
    let title = match doc {
        ThreadDocument::Current(t) => t.title.as_str(),
        ThreadDocument::Legacy(t) => t.summary.as_str(),
        ThreadDocument::Unsupported => row_summary,
    };
    if title.is_empty() {
        UNTITLED_THREAD.to_owned()
    } else {
        title.to_owned()
    }
}

/// Flatten a thread's messages into display text: one paragraph per non-empty
/// message, prefixed with a bold role label, paragraphs separated by blank
/// lines. Unsupported versions flatten to an empty string.
pub fn thread_content(doc: &ThreadDocument) -> String {
    let mut parts: Vec<String> = Vec::new();
    match doc {
        ThreadDocument::Current(thread) => {
            for message in &thread.messages {
                let (label, body) = match message {
                    ThreadMessage::User(body) => ("User", body),
                    ThreadMessage::Agent(body) => ("Agent", body),
                    ThreadMessage::Other(_) => continue,
                };
                let text = render_content_items(&body.content);
                if !text.is_empty() {
                    parts.push(format!("**{label}:** {text}"));
                }
            }
        }
        ThreadDocument::Legacy(thread) => {
            for message in &thread.messages {
                let role = capitalize(message.role.as_deref().unwrap_or("unknown"));
                let text: String = message.segments.iter().map(|s| s.text.as_str()).collect();
                // Legacy segments store newlines as literal backslash-n.
                let text = text.replace("\\n", "\n");
                if !text.is_empty() {
                    parts.push(format!("**{role}:** {text}"));
                }
            }
        }
        ThreadDocument::Unsupported => {}
    }
    parts.join("\n\n")
}

/// Workspace a thread was started in: the first worktree of its initial
/// project snapshot.
pub fn thread_workspace(doc: &ThreadDocument) -> Option<String> {
    let snapshot = match doc {
        ThreadDocument::Current(t) => t.initial_project_snapshot.as_ref(),
        ThreadDocument::Legacy(t) => t.initial_project_snapshot.as_ref(),
        ThreadDocument::Unsupported => None,
    }?;
    snapshot
        .worktree_snapshots
        .first()
        .map(|w| w.worktree_path.clone())
}

/// Short project label: the final component of a workspace path.
pub fn project_label(workspace_path: &str) -> Option<String> {
    Path::new(workspace_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn render_content_items(items: &[ContentItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            ContentItem::Text(text) => Some(text.clone()),
            ContentItem::ToolUse(tool) => Some(format!(
                "`[Tool: {}]`",
                tool.name.as_deref().unwrap_or("unknown")
            )),
            ContentItem::Other(_) => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase the first letter, lowercase the rest ("user" -> "User").
fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::ConversationExport;

    fn conversation(json: &str) -> ConversationExport {
        serde_json::from_str(json).unwrap()
    }

    fn thread(json: &str) -> ThreadDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn conversation_title_prefers_summary() {
        let doc = conversation(r#"{"summary": "Refactor plan"}"#);
        let title = conversation_title(&doc, Path::new("/x/- whatever.zed.json"));
        assert_eq!(title, "Refactor plan");
    }

    #[test]
    fn conversation_title_falls_back_to_cleaned_file_name() {
        let doc = conversation(r#"{"summary": ""}"#);
        let title = conversation_title(&doc, Path::new("/x/- foo.zed.json"));
        assert_eq!(title, "foo");

        let title = conversation_title(&doc, Path::new("/x/  - spaced name .zed.json"));
        assert_eq!(title, "spaced name");

        let title = conversation_title(&doc, Path::new("/x/plain.zed.json"));
        assert_eq!(title, "plain");
    }

    #[test]
    fn conversation_title_is_never_empty() {
        let doc = conversation("{}");
        let title = conversation_title(&doc, Path::new("/x/- .zed.json"));
        assert_eq!(title, "Untitled Conversation");
    }

    #[test]
    fn workspace_from_single_section_path() {
        let doc = conversation(
            r#"{"slash_command_output_sections": [{"metadata": {"path": "/home/u/proj/src/a.rs"}}]}"#,
        );
        assert_eq!(
            conversation_workspace(&doc).as_deref(),
            Some("/home/u/proj/src/a.rs")
        );
    }

    #[test]
    fn workspace_from_common_prefix() {
        let doc = conversation(
            r#"{"slash_command_output_sections": [
                {"metadata": {"path": "/a/b/c"}},
                {"metadata": {"path": "/a/b/d"}},
                {"metadata": {"path": "/a/b/c/e"}}
            ]}"#,
        );
        assert_eq!(conversation_workspace(&doc).as_deref(), Some("/a/b"));
    }

    #[test]
    fn workspace_none_without_common_prefix() {
        let doc = conversation(
            r#"{"slash_command_output_sections": [
                {"metadata": {"path": "/a/x"}},
                {"metadata": {"path": "/b/y"}}
            ]}"#,
        );
        assert_eq!(conversation_workspace(&doc), None);

        let doc = conversation(r#"{"slash_command_output_sections": [{"label": "now"}]}"#);
        assert_eq!(conversation_workspace(&doc), None);
    }

    #[test]
    fn thread_title_per_version() {
        let doc = thread(r#"{"version": "0.3.0", "title": "Current title"}"#);
        assert_eq!(thread_title(&doc, "row summary"), "Current title");

        let doc = thread(r#"{"version": "0.2.0", "summary": "Legacy summary"}"#);
        assert_eq!(thread_title(&doc, "row summary"), "Legacy summary");

        let doc = thread(r#"{"version": "9.9.9"}"#);
        assert_eq!(thread_title(&doc, "row summary"), "row summary");
    }

    #[test]
    fn thread_title_is_never_empty() {
        let doc = thread(r#"{"version": "0.3.0", "title": ""}"#);
        assert_eq!(thread_title(&doc, ""), "Untitled Thread");

        let doc = thread(r#"{"version": "0.2.0", "summary": ""}"#);
        assert_eq!(thread_title(&doc, ""), "Untitled Thread");
    }

    #[test]
    fn current_content_renders_roles_and_tool_markers() {
        let doc = thread(
            r#"{
                "version": "0.3.0",
                "title": "t",
                "messages": [
                    {"User": {"content": [{"Text": "run the tests"}]}},
                    {"Agent": {"content": [
                        {"Text": "on it"},
                        {"ToolUse": {"name": "terminal"}}
                    ]}},
                    "Resume",
                    {"Agent": {"content": [{"Thinking": {"text": "private"}}]}}
                ]
            }"#,
        );
        let content = thread_content(&doc);
        assert_eq!(
            content,
            "**User:** run the tests\n\n**Agent:** on it `[Tool: terminal]`"
        );
        assert!(!content.contains("private"));
    }

    #[test]
    fn tool_marker_without_name_says_unknown() {
        let doc = thread(
            r#"{"version": "0.3.0", "messages": [{"Agent": {"content": [{"ToolUse": {}}]}}]}"#,
        );
        assert_eq!(thread_content(&doc), "**Agent:** `[Tool: unknown]`");
    }

    #[test]
    fn legacy_content_capitalizes_roles_and_unescapes_newlines() {
        let doc = thread(
            r#"{
                "version": "0.2.0",
                "summary": "s",
                "messages": [
                    {"role": "user", "segments": [{"type": "text", "text": "line1\\nline2"}]},
                    {"role": "assistant", "segments": [
                        {"type": "text", "text": "first "},
                        {"type": "thinking", "text": "second"}
                    ]},
                    {"segments": []}
                ]
            }"#,
        );
        assert_eq!(
            thread_content(&doc),
            "**User:** line1\nline2\n\n**Assistant:** first second"
        );
    }

    #[test]
    fn unsupported_version_has_empty_content() {
        let doc = thread(r#"{"version": "0.1.0", "messages": [{"whatever": 1}]}"#);
        assert_eq!(thread_content(&doc), "");
    }

    #[test]
    fn thread_workspace_takes_first_worktree() {
        let doc = thread(
            r#"{
                "version": "0.3.0",
                "initial_project_snapshot": {
                    "worktree_snapshots": [
                        {"worktree_path": "/home/u/alpha"},
                        {"worktree_path": "/home/u/beta"}
                    ],
                    "timestamp": "2025-11-02T10:00:00Z"
                }
            }"#,
        );
        assert_eq!(thread_workspace(&doc).as_deref(), Some("/home/u/alpha"));

        let doc = thread(r#"{"version": "0.3.0"}"#);
        assert_eq!(thread_workspace(&doc), None);
    }

    #[test]
    fn project_label_is_the_basename() {
        assert_eq!(project_label("/home/u/proj").as_deref(), Some("proj"));
        assert_eq!(project_label("relative/dir").as_deref(), Some("dir"));
        assert_eq!(project_label("/"), None);
    }
}
