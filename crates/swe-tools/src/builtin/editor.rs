// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use swe_state::{detect_language, FileChanges, FileMeta};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Create, view and edit files, recording every write in the task state.
pub struct StrReplaceEditorTool;

fn line_count(s: &str) -> usize {
    s.matches('\n').count() + 1
}

#[async_trait]
impl Tool for StrReplaceEditorTool {
    fn name(&self) -> &str {
        "str_replace_editor"
    }

    fn description(&self) -> &str {
        "Create, read, and edit files with tracking.\n\
         Commands:\n\
         - create: write file_text to path (parent directories are created)\n\
         - view: return the whole file\n\
         - view_range: return lines view_range=[start, end], 1-based inclusive\n\
         - str_replace: replace every occurrence of old_str with new_str"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["create", "str_replace", "view", "view_range"],
                    "description": "The command to execute"
                },
                "path": { "type": "string", "description": "Path to the file" },
                "file_text": { "type": "string", "description": "Content for create command" },
                "old_str": { "type": "string", "description": "String to replace" },
                "new_str": { "type": "string", "description": "Replacement string" },
                "view_range": {
                    "type": "array",
                    "items": { "type": "number" },
                    "description": "[start_line, end_line]"
                }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        let full = ctx.resolve(&path);

        debug!(command = %command, path = %path, "str_replace_editor tool");

        match command.as_str() {
            "create" => {
                let text = call
                    .args
                    .get("file_text")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if let Some(parent) = full.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return ToolOutput::err(&call.id, e.to_string());
                    }
                }
                if let Err(e) = tokio::fs::write(&full, text).await {
                    return ToolOutput::err(&call.id, e.to_string());
                }
                let lines = line_count(text);
                ctx.state.track_file(
                    path.clone(),
                    FileMeta::created(text.len() as u64, Some(lines), detect_language(&path)),
                );
                ctx.state.last_successful_operation = format!("Created: {path}");
                ToolOutput::ok(
                    &call.id,
                    format!(
                        "Created file: {path} ({} chars, {lines} lines)",
                        text.chars().count()
                    ),
                )
            }
            "view" => match tokio::fs::read_to_string(&full).await {
                Ok(content) => {
                    let size = content.len();
                    let lines = line_count(&content);
                    ToolOutput::ok(&call.id, content)
                        .with_field("size", size)
                        .with_field("lines", lines)
                        .with_field("language", detect_language(&path))
                }
                Err(e) => ToolOutput::err(&call.id, e.to_string()),
            },
            "view_range" => {
                let range: Vec<i64> = call
                    .args
                    .get("view_range")
                    .and_then(|v| v.as_array())
                    .map(|a| a.iter().filter_map(|n| n.as_f64()).map(|n| n as i64).collect())
                    .unwrap_or_default();
                let (start, end) = match range.as_slice() {
                    [s, e] => (*s, *e),
                    _ => (1, 1),
                };
                let content = match tokio::fs::read_to_string(&full).await {
                    Ok(c) => c,
                    Err(e) => return ToolOutput::err(&call.id, e.to_string()),
                };
                let start = start.max(1) as usize;
                let end = end.max(0) as usize;
                let selected: String = content
                    .split_inclusive('\n')
                    .enumerate()
                    .filter(|(i, _)| *i + 1 >= start && *i < end)
                    .map(|(_, l)| l)
                    .collect();
                ToolOutput::ok(&call.id, selected)
            }
            "str_replace" => {
                let original = match tokio::fs::read_to_string(&full).await {
                    Ok(c) => c,
                    Err(e) => return ToolOutput::err(&call.id, e.to_string()),
                };
                let old = call.args.get("old_str").and_then(|v| v.as_str()).unwrap_or("");
                let new = call.args.get("new_str").and_then(|v| v.as_str()).unwrap_or("");
                if old.is_empty() || !original.contains(old) {
                    let head: String = old.chars().take(50).collect();
                    return ToolOutput::err(&call.id, format!("Text not found in {path}: {head}..."));
                }
                let updated = original.replace(old, new);
                if let Err(e) = tokio::fs::write(&full, &updated).await {
                    return ToolOutput::err(&call.id, e.to_string());
                }
                let diff = updated.len() as i64 - original.len() as i64;
                ctx.state.track_file(
                    path.clone(),
                    FileMeta::modified(
                        updated.len() as u64,
                        Some(line_count(&updated)),
                        detect_language(&path),
                        Some(FileChanges {
                            old_size: original.len() as u64,
                            new_size: updated.len() as u64,
                            diff,
                        }),
                    ),
                );
                ctx.state.last_successful_operation = format!("Modified: {path}");
                ToolOutput::ok(&call.id, format!("Updated {path} (size changed by {diff} chars)"))
            }
            other => ToolOutput::err(&call.id, format!("Unknown command: {other}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;
    use swe_state::TaskState;
    use tempfile::TempDir;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "str_replace_editor".into(), args }
    }

    async fn exec(tmp: &TempDir, state: &mut TaskState, args: Value) -> ToolOutput {
        let mut ctx = ToolContext::new(state, tmp.path());
        StrReplaceEditorTool.execute(&call(args), &mut ctx).await
    }

    #[tokio::test]
    async fn create_writes_and_tracks() {
        let tmp = TempDir::new().unwrap();
        let mut state = TaskState::new("t");
        let out = exec(
            &tmp,
            &mut state,
            json!({"command": "create", "path": "hello.txt", "file_text": "hi"}),
        )
        .await;
        assert!(out.success, "{:?}", out.error);
        assert_eq!(out.content(), "Created file: hello.txt (2 chars, 1 lines)");
        assert_eq!(std::fs::read_to_string(tmp.path().join("hello.txt")).unwrap(), "hi");
        let meta = &state.files_tracking["hello.txt"];
        assert_eq!(meta.action, "created");
        assert_eq!(meta.size, 2);
        assert_eq!(state.last_successful_operation, "Created: hello.txt");
    }

    #[tokio::test]
    async fn create_makes_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let mut state = TaskState::new("t");
        let out = exec(
            &tmp,
            &mut state,
            json!({"command": "create", "path": "src/deep/lib.rs", "file_text": "fn a() {}\n"}),
        )
        .await;
        assert!(out.success);
        assert_eq!(state.files_tracking["src/deep/lib.rs"].language, "rust");
        assert_eq!(state.files_tracking["src/deep/lib.rs"].lines, Some(2));
    }

    #[tokio::test]
    async fn view_range_is_one_based_inclusive() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("f.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let mut state = TaskState::new("t");
        let out = exec(
            &tmp,
            &mut state,
            json!({"command": "view_range", "path": "f.txt", "view_range": [2, 3]}),
        )
        .await;
        assert_eq!(out.content(), "two\nthree\n");
    }

    #[tokio::test]
    async fn str_replace_replaces_all_and_records_diff() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.py"), "x = 1\ny = x\n").unwrap();
        let mut state = TaskState::new("t");
        let out = exec(
            &tmp,
            &mut state,
            json!({"command": "str_replace", "path": "a.py", "old_str": "x", "new_str": "value"}),
        )
        .await;
        assert_eq!(out.content(), "Updated a.py (size changed by 8 chars)");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("a.py")).unwrap(),
            "value = 1\ny = value\n"
        );
        let meta = &state.files_tracking["a.py"];
        assert_eq!(meta.action, "modified");
        assert_eq!(meta.changes.as_ref().unwrap().diff, 8);
        assert_eq!(state.last_successful_operation, "Modified: a.py");
    }

    #[tokio::test]
    async fn str_replace_missing_text_fails() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "abc").unwrap();
        let mut state = TaskState::new("t");
        let out = exec(
            &tmp,
            &mut state,
            json!({"command": "str_replace", "path": "a.txt", "old_str": "zzz", "new_str": "y"}),
        )
        .await;
        assert_eq!(out.content(), "Error: Text not found in a.txt: zzz...");
        assert!(state.files_tracking.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let tmp = TempDir::new().unwrap();
        let mut state = TaskState::new("t");
        let out = exec(&tmp, &mut state, json!({"command": "delete", "path": "a"})).await;
        assert_eq!(out.error.as_deref(), Some("Unknown command: delete"));
    }

    #[tokio::test]
    async fn view_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut state = TaskState::new("t");
        let out = exec(&tmp, &mut state, json!({"command": "view", "path": "nope"})).await;
        assert!(out.is_error());
    }
}
