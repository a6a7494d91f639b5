// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Human-readable Markdown progress report.
//!
//! The report is a pure rendering of [`TaskState`]; it is rewritten in full
//! on each update so it never drifts from the persisted record.
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::state::{StepStatus, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    InProgress,
    Completed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::InProgress => write!(f, "In Progress"),
            ReportStatus::Completed => write!(f, "Completed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressReport {
    path: PathBuf,
    /// Number of capabilities in the registry, shown in the header.
    pub tools_available: usize,
    pub enable_web: bool,
    pub enable_notebooks: bool,
}

fn stamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn status_mark(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Completed => "✅",
        StepStatus::Failed => "❌",
        StepStatus::Skipped => "⏭️",
        StepStatus::InProgress => "🔄",
    }
}

impl ProgressReport {
    pub fn new(path: impl Into<PathBuf>, tools_available: usize) -> Self {
        Self {
            path: path.into(),
            tools_available,
            enable_web: true,
            enable_notebooks: true,
        }
    }

    pub fn with_namespaces(mut self, enable_web: bool, enable_notebooks: bool) -> Self {
        self.enable_web = enable_web;
        self.enable_notebooks = enable_notebooks;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the full report for `state`.
    pub fn render(&self, state: &TaskState, status: ReportStatus) -> String {
        let mut out = String::new();
        let started = state
            .progress_entries
            .first()
            .map(|e| stamp(&e.timestamp))
            .unwrap_or_else(|| stamp(&state.started_at));

        let _ = writeln!(out, "# SWE Agent Progress Report\n");
        let _ = writeln!(out, "**Task ID:** {}  ", state.task_id);
        let _ = writeln!(out, "**Started:** {started}  ");
        let _ = writeln!(out, "**Last Updated:** {}  ", stamp(&Utc::now()));
        let _ = writeln!(out, "**Tools Available:** {}  ", self.tools_available);
        let _ = writeln!(out, "**Status:** {status}  ");
        let _ = writeln!(out, "**Iterations:** {}\n", state.iteration_count);

        let _ = writeln!(out, "## Task Description\n{}\n", state.original_task);

        out.push_str("## Agent Capabilities\n");
        out.push_str("✅ **File Operations:** str_replace_editor, glob_search, list_directory  \n");
        out.push_str("✅ **Search & Analysis:** grep_search, task_agent spawning  \n");
        out.push_str("✅ **Execution:** bash with class-scaled timeouts  \n");
        out.push_str("✅ **Project Management:** todo_write, create_summary, update_progress_md  \n");
        out.push_str("✅ **User Interaction:** ask_user_step for error recovery guidance  \n");
        out.push_str(if self.enable_web {
            "✅ **Web Research:** web_fetch, web_search\n"
        } else {
            "❌ **Web Research:** Disabled\n"
        });
        out.push_str(if self.enable_notebooks {
            "✅ **Jupyter Notebooks:** notebook_edit\n"
        } else {
            "❌ **Jupyter Notebooks:** Disabled\n"
        });

        out.push_str("\n## Summaries\n");
        for s in &state.conversation_summaries {
            let _ = writeln!(out, "\n### {} ({})", s.summary_id, stamp(&s.timestamp));
            let _ = writeln!(
                out,
                "**Iterations:** {}-{}\n",
                s.iterations_covered.0, s.iterations_covered.1
            );
            out.push_str("**Key Accomplishments:**\n");
            for acc in &s.key_accomplishments {
                let _ = writeln!(out, "- {acc}");
            }
            let _ = writeln!(out, "\n**Current Focus:** {}", s.current_focus);
            if !s.next_steps.is_empty() {
                out.push_str("**Next Steps:**\n");
                for step in &s.next_steps {
                    let _ = writeln!(out, "- {step}");
                }
            }
            out.push('\n');
        }

        out.push_str("\n## Files Created/Modified\n\n");
        for (path, meta) in &state.files_tracking {
            let when = meta.when().map(|t| stamp(&t)).unwrap_or_else(|| "unknown".into());
            let lines = meta
                .lines
                .map(|l| l.to_string())
                .unwrap_or_else(|| "N/A".into());
            let _ = writeln!(
                out,
                "- **{path}** - {} ({when}, {} bytes, {lines} lines, {})",
                meta.action, meta.size, meta.language
            );
        }

        let _ = writeln!(out, "\n## Sub-Agent Results ({})\n", state.sub_agent_results.len());
        for (i, r) in state.sub_agent_results.iter().enumerate() {
            let mark = if r.success { "✅" } else { "❌" };
            let _ = writeln!(
                out,
                "{}. {mark} **{}** - {} ({} iterations)",
                i + 1,
                r.agent_type,
                r.description,
                r.iterations
            );
            let _ = writeln!(out, "   Response: {}\n", clip(&r.response, 100));
        }

        out.push_str("\n## Timeline\n\n");
        for e in &state.progress_entries {
            let _ = writeln!(out, "### {} {}", stamp(&e.timestamp), status_mark(e.status));
            let _ = writeln!(out, "**Action:** {}", e.action);
            let _ = writeln!(out, "**Details:** {}", e.details);
            if !e.files_affected.is_empty() {
                let _ = writeln!(out, "**Files:** {}", e.files_affected.join(", "));
            }
            out.push('\n');
        }

        if !state.error_history.is_empty() {
            out.push_str("## Error History\n\n");
            for e in &state.error_history {
                let _ = writeln!(out, "- **{}** - Iteration {}", stamp(&e.timestamp), e.iteration);
                let _ = writeln!(out, "  - **Step:** {}", e.step);
                let _ = writeln!(out, "  - **Error:** {}", clip(&e.error, 100));
                let context = if e.context.is_empty() { "No context" } else { &e.context };
                let _ = writeln!(out, "  - **Context:** {context}\n");
            }
        }

        out.push_str("## Tool Usage Statistics\n\n");
        let _ = writeln!(out, "- **Total Tools Available:** {}", self.tools_available);
        let _ = writeln!(out, "- **Files Tracked:** {}", state.files_tracking.len());
        let _ = writeln!(out, "- **Sub-Agents Spawned:** {}", state.sub_agent_results.len());
        let _ = writeln!(out, "- **Summaries Created:** {}", state.conversation_summaries.len());
        let _ = writeln!(out, "- **Errors Encountered:** {}", state.error_history.len());
        let _ = writeln!(out, "- **Progress Entries:** {}", state.progress_entries.len());
        out
    }

    /// Rewrite the report file.  Failures are logged, never raised.
    pub async fn write(&self, state: &TaskState, status: ReportStatus) {
        let content = self.render(state, status);
        if let Err(e) = tokio::fs::write(&self.path, content).await {
            debug!(path = %self.path.display(), error = %e, "could not update progress report");
        }
    }

    /// Write the final report with completion statistics appended.
    pub async fn finalize(&self, state: &TaskState) {
        let mut content = self.render(state, ReportStatus::Completed);
        content.push_str("\n\n## Task Completed Successfully\n");
        let _ = writeln!(content, "**Completion Time:** {}", stamp(&Utc::now()));
        let _ = writeln!(content, "- **Total Files Created/Modified:** {}", state.files_tracking.len());
        let _ = writeln!(content, "- **Total Steps Completed:** {}", state.completed_steps.len());
        let _ = writeln!(content, "- **Sub-Agents Utilized:** {}", state.sub_agent_results.len());
        let _ = writeln!(content, "- **Summaries:** {}", state.conversation_summaries.len());
        let _ = writeln!(content, "- **Tools Available:** {}", self.tools_available);
        let _ = writeln!(content, "- **Error Recovery Events:** {}", state.error_history.len());
        if let Err(e) = tokio::fs::write(&self.path, content).await {
            debug!(path = %self.path.display(), error = %e, "could not finalize progress report");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FileMeta, ProgressEntry, SubAgentResult};
    use tempfile::TempDir;

    fn sample_state() -> TaskState {
        let mut s = TaskState::new("write hello.txt");
        s.iteration_count = 2;
        s.track_file("hello.txt", FileMeta::created(2, Some(1), "unknown"));
        s.progress_entries.push(ProgressEntry {
            timestamp: Utc::now(),
            action: "Created hello.txt".into(),
            details: "Action completed".into(),
            files_affected: vec!["hello.txt".into()],
            status: StepStatus::Completed,
        });
        s
    }

    // ── Rendering ────────────────────────────────────────────────────────────

    #[test]
    fn header_reflects_state() {
        let r = ProgressReport::new("progress.md", 11);
        let md = r.render(&sample_state(), ReportStatus::InProgress);
        assert!(md.contains("**Status:** In Progress"));
        assert!(md.contains("**Tools Available:** 11"));
        assert!(md.contains("**Iterations:** 2"));
        assert!(md.contains("## Task Description\nwrite hello.txt"));
    }

    #[test]
    fn files_section_lists_size_lines_language() {
        let r = ProgressReport::new("progress.md", 1);
        let md = r.render(&sample_state(), ReportStatus::InProgress);
        assert!(md.contains("- **hello.txt** - created ("));
        assert!(md.contains("2 bytes, 1 lines, unknown)"));
    }

    #[test]
    fn disabled_namespaces_are_marked() {
        let r = ProgressReport::new("progress.md", 1).with_namespaces(false, true);
        let md = r.render(&sample_state(), ReportStatus::InProgress);
        assert!(md.contains("❌ **Web Research:** Disabled"));
        assert!(md.contains("✅ **Jupyter Notebooks:**"));
    }

    #[test]
    fn long_sub_agent_response_is_clipped() {
        let mut s = sample_state();
        s.sub_agent_results.push(SubAgentResult {
            agent_type: "coder".into(),
            description: "write tests".into(),
            success: true,
            iterations: 3,
            response: "r".repeat(150),
            timestamp: Utc::now(),
        });
        let md = ProgressReport::new("p.md", 1).render(&s, ReportStatus::InProgress);
        assert!(md.contains(&format!("Response: {}...", "r".repeat(100))));
        assert!(md.contains("## Sub-Agent Results (1)"));
    }

    #[test]
    fn error_section_only_when_errors_exist() {
        let mut s = sample_state();
        let r = ProgressReport::new("p.md", 1);
        assert!(!r.render(&s, ReportStatus::InProgress).contains("## Error History"));
        s.record_error("exit 1", "", vec![]);
        let md = r.render(&s, ReportStatus::InProgress);
        assert!(md.contains("## Error History"));
        assert!(md.contains("**Context:** No context"));
    }

    // ── File output ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn finalize_marks_completed() {
        let tmp = TempDir::new().unwrap();
        let r = ProgressReport::new(tmp.path().join("progress.md"), 4);
        r.write(&sample_state(), ReportStatus::InProgress).await;
        r.finalize(&sample_state()).await;
        let md = tokio::fs::read_to_string(r.path()).await.unwrap();
        assert!(md.contains("**Status:** Completed"));
        assert!(md.contains("## Task Completed Successfully"));
        assert!(md.contains("**Total Files Created/Modified:** 1"));
    }

    #[tokio::test]
    async fn write_to_missing_directory_is_silent() {
        let tmp = TempDir::new().unwrap();
        let r = ProgressReport::new(tmp.path().join("nope/progress.md"), 1);
        r.write(&sample_state(), ReportStatus::InProgress).await;
        assert!(!r.path().exists());
    }
}
