// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use swe_state::detect_language;
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

const PRINTED: usize = 15;

pub struct GrepSearchTool;

struct Match {
    file: String,
    line_number: usize,
    line: String,
    context: Vec<String>,
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression (e.g. 'fn\\s+\\w+').\n\
         Filter files by name with file_pattern (e.g. '*.py'). Optional \
         context_lines shows surrounding lines. The first 15 matches are printed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": { "type": "string", "description": "File or directory to search (default: working directory)" },
                "file_pattern": { "type": "string", "description": "Glob on file names (default '*')" },
                "case_sensitive": { "type": "boolean", "description": "Case-sensitive search (default true)" },
                "context_lines": { "type": "number", "description": "Lines of context around each match (default 0)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'pattern'"),
        };
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let file_pattern = call.args.get("file_pattern").and_then(|v| v.as_str()).unwrap_or("*");
        let case_sensitive = call
            .args
            .get("case_sensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let context_lines = call
            .args
            .get("context_lines")
            .and_then(|v| v.as_f64())
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(0);

        let regex = match RegexBuilder::new(&pattern).case_insensitive(!case_sensitive).build() {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid regex: {e}")),
        };
        let name_glob = match glob::Pattern::new(file_pattern) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid file_pattern: {e}")),
        };

        let root = ctx.resolve(path);
        debug!(pattern = %pattern, root = %root.display(), "grep_search tool");

        let files: Vec<std::path::PathBuf> = if root.is_file() {
            vec![root.clone()]
        } else {
            WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e))
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| name_glob.matches(&e.file_name().to_string_lossy()))
                .map(|e| e.into_path())
                .collect()
        };

        let mut matches: Vec<Match> = Vec::new();
        let mut files_searched = 0usize;
        for file in &files {
            let Ok(bytes) = tokio::fs::read(file).await else { continue };
            files_searched += 1;
            let text = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = text.lines().collect();
            let shown = display_path(file, ctx.working_dir);
            for (i, line) in lines.iter().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                let mut context = Vec::new();
                if context_lines > 0 {
                    let start = i.saturating_sub(context_lines);
                    let end = i.saturating_add(context_lines).saturating_add(1).min(lines.len());
                    for (j, l) in lines.iter().enumerate().take(end).skip(start) {
                        if j != i {
                            context.push(format!("{}: {}", j + 1, l.trim()));
                        }
                    }
                }
                matches.push(Match {
                    file: shown.clone(),
                    line_number: i + 1,
                    line: line.trim().to_string(),
                    context,
                });
            }
        }

        let mut out = format!(
            "Pattern: '{pattern}' (case {})\nFiles searched: {files_searched}, Matches found: {}\n\n",
            if case_sensitive { "sensitive" } else { "insensitive" },
            matches.len()
        );
        for m in matches.iter().take(PRINTED) {
            out.push_str(&format!("{}:{}: {}\n", m.file, m.line_number, m.line));
            if !m.context.is_empty() {
                for c in &m.context {
                    out.push_str(&format!("     {c}\n"));
                }
                out.push('\n');
            }
        }
        if matches.len() > PRINTED {
            out.push_str(&format!("... and {} more matches", matches.len() - PRINTED));
        }

        let structured: Vec<Value> = matches
            .iter()
            .map(|m| {
                json!({
                    "file": m.file,
                    "line_number": m.line_number,
                    "line": m.line,
                    "language": detect_language(&m.file),
                })
            })
            .collect();
        ToolOutput::ok(&call.id, out)
            .with_field("files_searched", files_searched)
            .with_field("matches", structured)
    }
}

/// Hidden entries and build output are not searched.
fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || (entry.file_type().is_dir() && matches!(name.as_ref(), "target" | "node_modules"))
}

fn display_path(path: &Path, working_dir: &Path) -> String {
    path.strip_prefix(working_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
