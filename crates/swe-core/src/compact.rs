// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use futures::StreamExt;

use swe_model::{CompletionRequest, Message, MessageContent, ModelProvider, ResponseEvent, Role};
use swe_state::{ConversationSummary, TaskState};

/// Messages fed to the summariser.
pub const SUMMARY_WINDOW: usize = 10;

const DEFAULT_FOCUS: &str = "Continuing comprehensive task execution";

// ─── Summarisation prompt ─────────────────────────────────────────────────────

const SUMMARIZE_PROMPT: &str = "\
Analyze this software engineering agent conversation and create a summary:
1. Key accomplishments with technical details
2. Current focus and technical context
3. Files created/modified and their purposes
4. Any errors resolved and solutions found
5. Next logical steps with specific actions
6. Tool usage patterns and effectiveness

Use bullet points. Put the next steps under a heading containing the word \
\"Next\". Be concise: this summary will guide future work.";

// ─── Public API ───────────────────────────────────────────────────────────────

/// One user message asking for a digest of `recent`.
pub fn summary_request(recent: &[Message]) -> Message {
    Message::user(format!("{SUMMARIZE_PROMPT}\n\n---\n\n{}", serialize_history(recent)))
}

/// Ask the model for a digest of the trailing [`SUMMARY_WINDOW`] messages.
/// No tool catalog is sent.
pub async fn summarize(
    model: &dyn ModelProvider,
    messages: &[Message],
    max_tokens: Option<u32>,
) -> anyhow::Result<String> {
    let start = messages.len().saturating_sub(SUMMARY_WINDOW);
    let req = CompletionRequest {
        messages: vec![summary_request(&messages[start..])],
        tools: Vec::new(),
        max_tokens,
        native_tools: false,
    };
    let mut stream = model.complete(req).await?;
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta(delta) => text.push_str(&delta),
            ResponseEvent::Error(e) => anyhow::bail!("summary stream error: {e}"),
            ResponseEvent::Done => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Parse summariser output into a [`ConversationSummary`] for `state`.
pub fn build_summary(state: &TaskState, text: &str) -> ConversationSummary {
    let n = state.iteration_count;
    ConversationSummary {
        summary_id: format!("summary_{}", state.conversation_summaries.len() + 1),
        iterations_covered: (n.saturating_sub(SUMMARY_WINDOW as u32), n),
        key_accomplishments: extract_accomplishments(text),
        current_focus: extract_current_focus(text),
        next_steps: extract_next_steps(text),
        files_created_modified: state.files_tracking.keys().cloned().collect(),
        errors_resolved: state.recent_error_heads(5),
        timestamp: Utc::now(),
    }
}

fn is_bullet(line: &str) -> bool {
    if line.starts_with(['-', '*', '•']) {
        return true;
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && line[digits..].starts_with('.')
}

fn strip_bullet(line: &str) -> String {
    line.trim_start_matches(|c: char| "-*•0123456789. ".contains(c)).to_string()
}

/// Bullet and numbered lines, marker stripped, first 5.
pub fn extract_accomplishments(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| is_bullet(l))
        .map(strip_bullet)
        .take(5)
        .collect()
}

/// First line mentioning what is being worked on, lower-cased and clipped to
/// 100 chars.
pub fn extract_current_focus(text: &str) -> String {
    const KEYWORDS: [&str; 4] = ["current", "focus", "working on", "now"];
    text.to_lowercase()
        .lines()
        .find(|l| KEYWORDS.iter().any(|k| l.contains(k)))
        .map(|l| l.trim().chars().take(100).collect())
        .unwrap_or_else(|| DEFAULT_FOCUS.to_string())
}

/// Bullets following the first line that mentions next steps, first 3.
pub fn extract_next_steps(text: &str) -> Vec<String> {
    const KEYWORDS: [&str; 4] = ["next", "upcoming", "plan", "todo"];
    let mut in_section = false;
    let mut steps = Vec::new();
    for line in text.lines() {
        let lower = line.to_lowercase();
        if KEYWORDS.iter().any(|k| lower.contains(k)) {
            in_section = true;
            continue;
        }
        let trimmed = line.trim();
        if in_section && is_bullet(trimmed) {
            steps.push(strip_bullet(trimmed));
        }
    }
    steps.truncate(3);
    steps
}

/// The synthetic context block that replaces compacted history.
pub fn summary_block(summary: &ConversationSummary, sub_agents: usize, tool_count: usize) -> String {
    let files = &summary.files_created_modified;
    let shown: Vec<&str> = files.iter().take(5).map(String::as_str).collect();
    let more = if files.len() > 5 { " ..." } else { "" };
    format!(
        "AGENT SUMMARY:\n\
         Key accomplishments: {}\n\
         Current focus: {}\n\
         Files tracked: {} ({}{more})\n\
         Sub-agents used: {sub_agents}\n\
         Errors resolved: {}\n\
         Next steps: {}\n\
         Tools available: {tool_count}",
        summary.key_accomplishments.join(", "),
        summary.current_focus,
        files.len(),
        shown.join(", "),
        summary.errors_resolved.join(", "),
        summary.next_steps.join(", "),
    )
}

/// `[first, CONTEXT SUMMARY, last retain]`.
///
/// The retained tail is widened backwards until it starts at a text message
/// so no tool result loses the call it answers.
pub fn compact_messages(messages: &[Message], block: &str, retain: usize) -> Vec<Message> {
    let summary = Message::user(format!("CONTEXT SUMMARY: {block}"));
    let Some(first) = messages.first() else {
        return vec![summary];
    };
    let mut start = messages.len().saturating_sub(retain).max(1);
    while start > 1
        && start < messages.len()
        && matches!(
            messages[start].content,
            MessageContent::ToolResult { .. } | MessageContent::ToolCall { .. }
        )
    {
        start -= 1;
    }
    let mut out = Vec::with_capacity(messages.len() - start + 2);
    out.push(first.clone());
    out.push(summary);
    out.extend_from_slice(&messages[start..]);
    out
}

fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System))
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
                Role::System => "System",
            };
            let text = match &m.content {
                MessageContent::Text(t) => t.clone(),
                MessageContent::ToolCall { function, .. } => {
                    format!("[tool_call: {}({})]", function.name, function.arguments)
                }
                MessageContent::ToolResult { content, .. } => format!("[tool_result: {content}]"),
            };
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use swe_model::{text_turn, FailingProvider, ScriptedMockProvider};
    use swe_state::FileMeta;

    use super::*;

    const DIGEST: &str = "\
Summary of work:
- Created hello.txt
* Ran the test suite
1. Fixed the import error
Currently working on the parser module
Next steps:
- Add error handling
- Write docs
- Benchmark
- Release";

    // ── Parsing ──────────────────────────────────────────────────────────────

    #[test]
    fn accomplishments_strip_markers_and_cap_at_five() {
        let acc = extract_accomplishments(DIGEST);
        assert_eq!(acc.len(), 5);
        assert_eq!(acc[0], "Created hello.txt");
        assert_eq!(acc[1], "Ran the test suite");
        assert_eq!(acc[2], "Fixed the import error");
    }

    #[test]
    fn focus_is_lowercased_first_match() {
        assert_eq!(extract_current_focus(DIGEST), "currently working on the parser module");
    }

    #[test]
    fn focus_is_clipped_and_defaults() {
        let long = format!("Now {}", "x".repeat(200));
        assert_eq!(extract_current_focus(&long).chars().count(), 100);
        assert_eq!(extract_current_focus("- did things"), DEFAULT_FOCUS);
    }

    #[test]
    fn next_steps_follow_heading_and_cap_at_three() {
        assert_eq!(
            extract_next_steps(DIGEST),
            vec!["Add error handling", "Write docs", "Benchmark"]
        );
        assert!(extract_next_steps("- a\n- b").is_empty());
    }

    #[test]
    fn multi_digit_numbering_is_a_bullet() {
        assert_eq!(extract_accomplishments("12. twelfth"), vec!["twelfth"]);
        assert!(extract_accomplishments("2024 was a year").is_empty());
    }

    #[test]
    fn build_summary_covers_last_ten_iterations() {
        let mut state = TaskState::new("t");
        state.iteration_count = 24;
        state.track_file("a.rs", FileMeta::created(1, Some(1), "rust"));
        state.record_error("boom", "", vec![]);
        let s = build_summary(&state, DIGEST);
        assert_eq!(s.summary_id, "summary_1");
        assert_eq!(s.iterations_covered, (14, 24));
        assert_eq!(s.files_created_modified, vec!["a.rs"]);
        assert_eq!(s.errors_resolved, vec!["boom"]);

        state.iteration_count = 4;
        assert_eq!(build_summary(&state, "").iterations_covered, (0, 4));
    }

    // ── Compaction ───────────────────────────────────────────────────────────

    fn conversation() -> Vec<Message> {
        vec![
            Message::user("PROMPT\n\nTask: do it"),
            Message::assistant("looking"),
            Message::tool_call("c1", "bash", "{}"),
            Message::tool_result("c1", "out1"),
            Message::assistant("more"),
            Message::tool_call("c2", "grep_search", "{}"),
            Message::tool_result("c2", "out2"),
        ]
    }

    #[test]
    fn compaction_keeps_first_and_embeds_summary() {
        let state = TaskState::new("t");
        let mut summary = build_summary(&state, DIGEST);
        summary.iterations_covered = (0, 12);
        let block = summary_block(&summary, 2, 11);
        let out = compact_messages(&conversation(), &block, 3);

        assert_eq!(out[0].as_text(), Some("PROMPT\n\nTask: do it"));
        let text = out[1].as_text().unwrap();
        assert!(text.starts_with("CONTEXT SUMMARY: "));
        assert!(text.contains("Created hello.txt"));
        assert!(text.contains("currently working on the parser module"));
        assert!(text.contains("Add error handling"));
        assert!(text.contains("Sub-agents used: 2"));
        assert!(text.contains("Tools available: 11"));
        assert_eq!(out[2].as_text(), Some("more"));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn tail_never_starts_with_orphaned_tool_result() {
        let out = compact_messages(&conversation(), "S", 1);
        assert!(!out[2].is_tool_result());
        assert!(!out[2].is_tool_call());
        assert_eq!(out.last().unwrap().render(), "out2");
    }

    #[test]
    fn short_logs_are_kept_whole() {
        let msgs = vec![Message::user("only")];
        let out = compact_messages(&msgs, "S", 8);
        assert_eq!(out.len(), 2);
        assert_eq!(compact_messages(&[], "S", 8).len(), 1);
    }

    #[test]
    fn files_list_is_clipped_at_five() {
        let mut state = TaskState::new("t");
        for i in 0..7 {
            state.track_file(format!("f{i}"), FileMeta::created(1, None, "unknown"));
        }
        let block = summary_block(&build_summary(&state, ""), 0, 1);
        assert!(block.contains("Files tracked: 7 (f0, f1, f2, f3, f4 ...)"));
    }

    // ── Model round-trip ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn summarize_sends_window_without_tools() {
        let model = ScriptedMockProvider::new(vec![text_turn(DIGEST)]);
        let msgs: Vec<Message> = (0..15).map(|i| Message::user(format!("msg-{i}"))).collect();
        let text = summarize(&model, &msgs, Some(1500)).await.unwrap();
        assert_eq!(text, DIGEST);

        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(req.tools.is_empty());
        assert_eq!(req.max_tokens, Some(1500));
        let body = req.messages[0].as_text().unwrap();
        assert!(body.contains("msg-14"));
        assert!(body.contains("msg-5"));
        assert!(!body.contains("msg-4"));
    }

    #[tokio::test]
    async fn summarize_propagates_model_failure() {
        let model = FailingProvider::new("m", "down");
        assert!(summarize(&model, &[Message::user("x")], None).await.is_err());
    }

    #[tokio::test]
    async fn summarize_fails_on_stream_error() {
        let model = ScriptedMockProvider::new(vec![vec![
            ResponseEvent::TextDelta("- partial".into()),
            ResponseEvent::Error("overloaded".into()),
        ]]);
        let err = summarize(&model, &[Message::user("x")], None).await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }
}
