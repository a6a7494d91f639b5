// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tools through which the model records its own progress: summaries,
//! report updates, and step status for the human in the loop.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use swe_state::{
    detect_language, ConversationSummary, FileMeta, ProgressEntry, ReportStatus, StepStatus,
};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

// ── create_summary ───────────────────────────────────────────────────────────

pub struct CreateSummaryTool;

#[async_trait]
impl Tool for CreateSummaryTool {
    fn name(&self) -> &str {
        "create_summary"
    }

    fn description(&self) -> &str {
        "Record a summary of recent progress: accomplishments, current focus and next steps."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Why the summary is being created" },
                "key_accomplishments": { "type": "array", "items": { "type": "string" } },
                "current_focus": { "type": "string" },
                "next_steps": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["reason", "key_accomplishments", "current_focus"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let reason = match call.args.get("reason").and_then(|v| v.as_str()) {
            Some(r) => r.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'reason'"),
        };
        let current_focus = match call.args.get("current_focus").and_then(|v| v.as_str()) {
            Some(f) => f.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'current_focus'"),
        };
        if call.args.get("key_accomplishments").and_then(|v| v.as_array()).is_none() {
            return ToolOutput::err(&call.id, "missing 'key_accomplishments' array");
        }
        let accomplishments = string_list(call.args.get("key_accomplishments"));
        let next_steps = string_list(call.args.get("next_steps"));

        let state = &mut *ctx.state;
        let n = state.iteration_count;
        let summary = ConversationSummary {
            summary_id: format!("summary_{}", state.conversation_summaries.len() + 1),
            iterations_covered: (n.saturating_sub(8), n),
            key_accomplishments: accomplishments.clone(),
            current_focus,
            next_steps,
            files_created_modified: state.files_tracking.keys().cloned().collect(),
            errors_resolved: state.recent_error_heads(3),
            timestamp: Utc::now(),
        };
        debug!(id = %summary.summary_id, "create_summary tool");
        state.conversation_summaries.push(summary);

        ToolOutput::ok(
            &call.id,
            format!(
                "Summary Created\nReason: {reason}\nAccomplishments: {}\nFiles tracked: {}\nSub-agents used: {}",
                accomplishments.len(),
                state.files_tracking.len(),
                state.sub_agent_results.len()
            ),
        )
    }
}

// ── update_progress_md ───────────────────────────────────────────────────────

pub struct UpdateProgressTool;

#[async_trait]
impl Tool for UpdateProgressTool {
    fn name(&self) -> &str {
        "update_progress_md"
    }

    fn description(&self) -> &str {
        "Record a completed action in the progress report, optionally with the files it touched."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "description": "What was done" },
                "files_modified": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let action = match call.args.get("action").and_then(|v| v.as_str()) {
            Some(a) => a.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'action'"),
        };
        let files = string_list(call.args.get("files_modified"));

        debug!(action = %action, files = files.len(), "update_progress_md tool");

        for f in &files {
            let Ok(meta) = tokio::fs::metadata(ctx.resolve(f)).await else {
                continue;
            };
            let modified = meta.modified().ok().map(DateTime::<Utc>::from);
            let entry = FileMeta {
                action: action.clone(),
                created: None,
                modified,
                size: meta.len(),
                lines: None,
                language: detect_language(f).to_string(),
                changes: None,
                kind: None,
            };
            ctx.state.track_file(f.clone(), entry);
        }

        let details = if files.is_empty() {
            "Action completed".to_string()
        } else {
            format!("Modified {} files", files.len())
        };
        ctx.state.progress_entries.push(ProgressEntry {
            timestamp: Utc::now(),
            action: action.clone(),
            details,
            files_affected: files.clone(),
            status: StepStatus::Completed,
        });
        if let Some(report) = ctx.progress {
            report.write(&*ctx.state, ReportStatus::InProgress).await;
        }

        ToolOutput::ok(
            &call.id,
            format!(
                "Progress Updated: {action}\nFiles tracked: {}\nTotal files: {}\nSub-agents: {}",
                files.len(),
                ctx.state.files_tracking.len(),
                ctx.state.sub_agent_results.len()
            ),
        )
    }
}

// ── ask_user_step ────────────────────────────────────────────────────────────

/// Reports step status.  The loop intercepts `failed` and `needs_guidance`
/// results and replaces the output with the operator's guidance.
pub struct AskUserStepTool;

pub const GUIDANCE_STATUSES: [&str; 2] = ["failed", "needs_guidance"];

#[async_trait]
impl Tool for AskUserStepTool {
    fn name(&self) -> &str {
        "ask_user_step"
    }

    fn description(&self) -> &str {
        "Report the status of a step. Use status 'failed' or 'needs_guidance' \
         to ask the user how to proceed; their answer is returned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "step_description": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["completed", "failed", "needs_guidance", "in_progress"]
                },
                "error_details": { "type": "string" },
                "suggested_next_action": { "type": "string" }
            },
            "required": ["step_description", "status"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let step = match call.args.get("step_description").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'step_description'"),
        };
        let status = match call.args.get("status").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'status'"),
        };
        ctx.state.current_step = step.clone();
        ToolOutput::ok(&call.id, format!("Step '{step}' status: {status}"))
            .with_field("status", status)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
