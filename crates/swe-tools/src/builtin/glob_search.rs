// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

const LISTED: usize = 20;

/// Built-in tool for file search using glob patterns.
pub struct GlobSearchTool;

#[async_trait]
impl Tool for GlobSearchTool {
    fn name(&self) -> &str {
        "glob_search"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (*, **, ?, [abc]).\n\
         Recursive by default: patterns without ** are prefixed with **/.\n\
         Results are files only, newest first; the first 20 are listed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern, e.g. '*.rs'" },
                "path": { "type": "string", "description": "Base directory (default: working directory)" },
                "recursive": { "type": "boolean", "description": "Search subdirectories (default true)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let mut pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'pattern'"),
        };
        let base = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let recursive = call.args.get("recursive").and_then(|v| v.as_bool()).unwrap_or(true);
        if recursive && !pattern.contains("**") {
            pattern = format!("**/{pattern}");
        }
        let root = ctx.resolve(base);
        let search = root.join(&pattern);

        debug!(pattern = %pattern, root = %root.display(), "glob_search tool");

        let paths = match glob::glob(&search.to_string_lossy()) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid pattern: {e}")),
        };
        let mut files: Vec<(SystemTime, String)> = paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .map(|p| {
                let mtime = p
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                let shown = p
                    .strip_prefix(ctx.working_dir)
                    .unwrap_or(&p)
                    .to_string_lossy()
                    .to_string();
                (mtime, shown)
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (_, f) in &files {
            let ext = std::path::Path::new(f)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default();
            categories.entry(ext).or_default().push(f.clone());
        }

        let listed: Vec<&str> = files.iter().take(LISTED).map(|(_, f)| f.as_str()).collect();
        let mut text = format!("Found {} files matching '{pattern}':\n{}", files.len(), listed.join("\n"));
        if files.len() > LISTED {
            text.push_str(&format!("\n... and {} more files", files.len() - LISTED));
        }
        ToolOutput::ok(&call.id, text)
            .with_field("file_count", files.len())
            .with_field("categories", json!(categories))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
