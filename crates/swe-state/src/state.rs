// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a task: the first 8 hex chars of the SHA-256 of its text.
///
/// Identical task text always maps to the same record, which is what makes
/// `--resume <id>` work across process restarts.
pub fn task_id_for(task: &str) -> String {
    let digest = Sha256::digest(task.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Everything the orchestration loop knows about one task.
///
/// Owned by exactly one loop.  Sub-agents get their own instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub original_task: String,
    pub started_at: DateTime<Utc>,
    pub current_step: String,
    /// Completed loop passes.  Only ever incremented by the loop.
    pub iteration_count: u32,
    /// Append-only; exact duplicates are dropped.
    pub completed_steps: Vec<String>,
    pub error_history: Vec<ErrorRecord>,
    /// Path to latest metadata; last write wins.
    pub files_tracking: BTreeMap<String, FileMeta>,
    pub progress_entries: Vec<ProgressEntry>,
    pub conversation_summaries: Vec<ConversationSummary>,
    pub sub_agent_results: Vec<SubAgentResult>,
    pub last_successful_operation: String,
    /// Free-form scratch values tools may stash between passes.
    #[serde(default)]
    pub working_context: BTreeMap<String, serde_json::Value>,
}

impl TaskState {
    pub fn new(task: impl Into<String>) -> Self {
        let original_task = task.into();
        Self {
            task_id: task_id_for(&original_task),
            original_task,
            started_at: Utc::now(),
            current_step: "Initializing".into(),
            iteration_count: 0,
            completed_steps: Vec::new(),
            error_history: Vec::new(),
            files_tracking: BTreeMap::new(),
            progress_entries: Vec::new(),
            conversation_summaries: Vec::new(),
            sub_agent_results: Vec::new(),
            last_successful_operation: String::new(),
            working_context: BTreeMap::new(),
        }
    }

    /// Append `step` unless the exact same text is already recorded.
    /// Returns whether it was appended.
    pub fn record_step(&mut self, step: impl Into<String>) -> bool {
        let step = step.into();
        if self.completed_steps.contains(&step) {
            return false;
        }
        self.completed_steps.push(step);
        true
    }

    pub fn record_error(
        &mut self,
        error: impl Into<String>,
        context: impl Into<String>,
        tools_available: Vec<String>,
    ) {
        self.error_history.push(ErrorRecord {
            iteration: self.iteration_count,
            error: error.into(),
            step: self.current_step.clone(),
            context: context.into(),
            tools_available,
            timestamp: Utc::now(),
        });
    }

    pub fn track_file(&mut self, path: impl Into<String>, meta: FileMeta) {
        self.files_tracking.insert(path.into(), meta);
    }

    pub fn latest_summary(&self) -> Option<&ConversationSummary> {
        self.conversation_summaries.last()
    }

    /// Short multi-line snapshot attached to error records.
    pub fn context_snapshot(&self, tool_count: usize) -> String {
        format!(
            "Step: {}\nFiles: {}\nCompleted: {}\nSub-agents: {}\nTools: {}\nSummaries: {}",
            self.current_step,
            self.files_tracking.len(),
            self.completed_steps.len(),
            self.sub_agent_results.len(),
            tool_count,
            self.conversation_summaries.len(),
        )
    }

    /// Prior-progress block used when a resumed task rebuilds its prompt.
    pub fn summary_context(&self) -> Option<String> {
        let latest = self.latest_summary()?;
        Some(format!(
            "PREVIOUS PROGRESS:\n\
             Accomplishments: {}\n\
             Current focus: {}\n\
             Files: {}\n\
             Sub-agents: {} completed\n\
             Errors resolved: {}\n\
             Next: {}",
            latest.key_accomplishments.join(", "),
            latest.current_focus,
            latest.files_created_modified.join(", "),
            self.sub_agent_results.len(),
            latest.errors_resolved.join(", "),
            latest.next_steps.join(", "),
        ))
    }

    /// First 50 chars of the most recent `n` errors.
    pub fn recent_error_heads(&self, n: usize) -> Vec<String> {
        let skip = self.error_history.len().saturating_sub(n);
        self.error_history
            .iter()
            .skip(skip)
            .map(|e| e.error.chars().take(50).collect())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub iteration: u32,
    pub error: String,
    pub step: String,
    pub context: String,
    pub tools_available: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChanges {
    pub old_size: u64,
    pub new_size: u64,
    pub diff: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// `created`, `modified`, `created_by_command`, or a caller-chosen label.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<FileChanges>,
    /// Content kind when it is not plain source, e.g. `jupyter_notebook`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl FileMeta {
    pub fn created(size: u64, lines: Option<usize>, language: impl Into<String>) -> Self {
        Self {
            action: "created".into(),
            created: Some(Utc::now()),
            modified: None,
            size,
            lines,
            language: language.into(),
            changes: None,
            kind: None,
        }
    }

    pub fn modified(
        size: u64,
        lines: Option<usize>,
        language: impl Into<String>,
        changes: Option<FileChanges>,
    ) -> Self {
        Self {
            action: "modified".into(),
            created: None,
            modified: Some(Utc::now()),
            size,
            lines,
            language: language.into(),
            changes,
            kind: None,
        }
    }

    /// Timestamp shown in reports: creation time, else modification time.
    pub fn when(&self) -> Option<DateTime<Utc>> {
        self.created.or(self.modified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: String,
    pub files_affected: Vec<String>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub summary_id: String,
    /// Inclusive iteration range.
    pub iterations_covered: (u32, u32),
    pub key_accomplishments: Vec<String>,
    pub current_focus: String,
    pub next_steps: Vec<String>,
    pub files_created_modified: Vec<String>,
    pub errors_resolved: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub agent_type: String,
    pub description: String,
    pub success: bool,
    pub iterations: u32,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_stable_and_short() {
        let a = task_id_for("build a parser");
        let b = task_id_for("build a parser");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, task_id_for("build a lexer"));
    }

    #[test]
    fn new_state_starts_at_iteration_zero() {
        let s = TaskState::new("t");
        assert_eq!(s.iteration_count, 0);
        assert_eq!(s.task_id, task_id_for("t"));
        assert!(s.completed_steps.is_empty());
    }

    #[test]
    fn record_step_drops_exact_duplicates() {
        let mut s = TaskState::new("t");
        assert!(s.record_step("File create: a.txt"));
        assert!(!s.record_step("File create: a.txt"));
        assert!(s.record_step("File create: b.txt"));
        assert_eq!(s.completed_steps, vec!["File create: a.txt", "File create: b.txt"]);
    }

    #[test]
    fn record_error_captures_step_and_iteration() {
        let mut s = TaskState::new("t");
        s.iteration_count = 4;
        s.current_step = "Executing bash".into();
        s.record_error("boom", "ctx", vec!["bash".into()]);
        let e = &s.error_history[0];
        assert_eq!(e.iteration, 4);
        assert_eq!(e.step, "Executing bash");
        assert_eq!(e.tools_available, vec!["bash"]);
    }

    #[test]
    fn track_file_last_write_wins() {
        let mut s = TaskState::new("t");
        s.track_file("a.rs", FileMeta::created(2, Some(1), "rust"));
        s.track_file("a.rs", FileMeta::modified(5, Some(1), "rust", None));
        assert_eq!(s.files_tracking.len(), 1);
        assert_eq!(s.files_tracking["a.rs"].action, "modified");
        assert_eq!(s.files_tracking["a.rs"].size, 5);
    }

    #[test]
    fn summary_context_uses_latest_summary() {
        let mut s = TaskState::new("t");
        assert!(s.summary_context().is_none());
        for (i, focus) in ["first", "second"].iter().enumerate() {
            s.conversation_summaries.push(ConversationSummary {
                summary_id: format!("summary_{}", i + 1),
                iterations_covered: (0, 4),
                key_accomplishments: vec!["did x".into()],
                current_focus: focus.to_string(),
                next_steps: vec!["do y".into()],
                files_created_modified: vec![],
                errors_resolved: vec![],
                timestamp: Utc::now(),
            });
        }
        let ctx = s.summary_context().unwrap();
        assert!(ctx.contains("Current focus: second"));
        assert!(ctx.contains("Next: do y"));
    }

    #[test]
    fn recent_error_heads_truncates_and_limits() {
        let mut s = TaskState::new("t");
        for i in 0..5 {
            s.record_error(format!("{i}{}", "x".repeat(80)), "", vec![]);
        }
        let heads = s.recent_error_heads(3);
        assert_eq!(heads.len(), 3);
        assert!(heads[0].starts_with('2'));
        assert!(heads.iter().all(|h| h.chars().count() == 50));
    }

    #[test]
    fn context_snapshot_lists_counts() {
        let s = TaskState::new("t");
        let snap = s.context_snapshot(11);
        assert!(snap.contains("Tools: 11"));
        assert!(snap.starts_with("Step: Initializing"));
    }
}
