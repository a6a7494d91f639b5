// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use swe_state::{detect_language, FileMeta, TaskState};
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Files touched this recently after a file-creating command are tracked.
const RECENT_FILE_WINDOW: Duration = Duration::from_secs(10);

/// Built-in tool that runs a shell command with a class-scaled timeout.
pub struct BashTool {
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Upper bound on a caller-supplied base timeout.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Timeout for `command` given the base timeout `base`.
///
/// Package installs get up to 10× (cap 300 s), downloads 6× (cap 180 s) and
/// test runs 4× (cap 120 s).  Anything else uses the base.
pub fn effective_timeout(command: &str, base: u64) -> u64 {
    let lower = command.to_lowercase();
    if contains_any(&lower, &["install", "pip", "npm", "apt", "yum", "brew"]) {
        300.min(base.saturating_mul(10))
    } else if contains_any(&lower, &["git clone", "wget", "curl", "download"]) {
        180.min(base.saturating_mul(6))
    } else if contains_any(&lower, &["test", "pytest", "npm test", "make test"]) {
        120.min(base.saturating_mul(4))
    } else {
        base
    }
}

/// Coarse purpose of a shell command, used in progress records.
pub fn classify_command(command: &str) -> &'static str {
    let lower = command.trim().to_lowercase();
    if contains_any(&lower, &["install", "pip", "npm", "apt", "brew"]) {
        "package_management"
    } else if contains_any(&lower, &["git", "clone", "commit", "push", "pull"]) {
        "version_control"
    } else if contains_any(&lower, &["test", "pytest", "npm test", "make test"]) {
        "testing"
    } else if contains_any(&lower, &["build", "compile", "make", "webpack"]) {
        "build"
    } else if contains_any(&lower, &["ls", "dir", "pwd", "whoami", "date"]) {
        "system_info"
    } else {
        "general"
    }
}

fn creates_files(command: &str) -> bool {
    contains_any(
        &command.to_lowercase(),
        &["touch", "echo >", "cat >", "mkdir", "cp", "mv"],
    )
}

/// Track files under `root` modified within the last few seconds that the
/// state does not know about yet.  Hidden entries are skipped.
pub fn scan_for_new_files(root: &Path, state: &mut TaskState) {
    let now = SystemTime::now();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
    });
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        let fresh = now
            .duration_since(mtime)
            .map(|age| age < RECENT_FILE_WINDOW)
            .unwrap_or(true);
        if !fresh {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        if state.files_tracking.contains_key(&rel) {
            continue;
        }
        let mut fm = FileMeta::created(meta.len(), None, detect_language(&rel));
        fm.action = "created_by_command".into();
        fm.created = Some(DateTime::<Utc>::from(mtime));
        state.track_file(rel, fm);
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command in the working directory and return stdout, \
         followed by stderr when present.\n\
         Timeouts scale with the kind of command: package installs, downloads \
         and test runs get longer limits than the base timeout.\n\
         Prefer non-interactive commands. Avoid commands that require a TTY."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Base timeout in seconds (optional)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        let base = call
            .args
            .get("timeout")
            .and_then(|v| v.as_f64())
            .map(|t| t.clamp(1.0, MAX_TIMEOUT_SECS as f64) as u64)
            .unwrap_or(self.timeout_secs);
        let timeout = effective_timeout(&command, base);
        let command_type = classify_command(&command);

        debug!(cmd = %command, timeout, command_type, "executing bash tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.current_dir(ctx.working_dir);
        cmd.stdin(Stdio::null());
        // A timed-out child is killed when the future is dropped.
        cmd.kill_on_drop(true);

        let result = tokio::time::timeout(Duration::from_secs(timeout), cmd.output()).await;
        match result {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                if !output.stderr.is_empty() {
                    text.push_str("\nSTDERR: ");
                    text.push_str(&String::from_utf8_lossy(&output.stderr));
                }
                if text.is_empty() {
                    text = "(No output)".into();
                }
                let code = output.status.code().unwrap_or(-1);
                let out = if output.status.success() {
                    let head: String = command.chars().take(50).collect();
                    ctx.state.last_successful_operation = format!("bash: {head}...");
                    if creates_files(&command) {
                        scan_for_new_files(ctx.working_dir, ctx.state);
                    }
                    ToolOutput::ok(&call.id, text)
                } else {
                    ToolOutput::err(&call.id, format!("[exit {code}]\n{text}"))
                };
                out.with_field("returncode", code)
                    .with_field("command_type", command_type)
                    .with_field("timeout_used", timeout)
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("Command timed out after {timeout}s")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
