//! Console rendering of [`AgentEvent`]s.
//!
//! Events from sub-agents are indented by their nesting depth.  Everything
//! goes to stdout; tracing output stays on stderr.

use swe_config::Verbosity;
use swe_core::{AgentEvent, ScopedEvent, TaskOutcome};

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Render one event as console lines, or `None` when `verbosity` hides it.
pub fn render(ev: &ScopedEvent, verbosity: Verbosity) -> Option<String> {
    let text = match &ev.event {
        AgentEvent::TaskStarted { task_id, task, resumed } => {
            if ev.depth > 0 {
                format!("▶ sub-agent: {}", clip(task.lines().next().unwrap_or(""), 80))
            } else if *resumed {
                format!("🔄 Resuming task {task_id}: {task}")
            } else {
                format!("🚀 Task {task_id}: {task}")
            }
        }
        AgentEvent::IterationStarted { iteration, max_iterations } => {
            if verbosity < Verbosity::Verbose {
                return None;
            }
            format!("── iteration {iteration}/{max_iterations}")
        }
        AgentEvent::Status(s) => {
            if verbosity < Verbosity::Standard {
                return None;
            }
            format!("ℹ {s}")
        }
        AgentEvent::TextComplete(t) => {
            if verbosity < Verbosity::Standard {
                return None;
            }
            t.clone()
        }
        AgentEvent::ToolCallStarted(call) => {
            if verbosity < Verbosity::Standard {
                return None;
            }
            if verbosity >= Verbosity::Verbose {
                format!("🔧 {} {}", call.name, call.args)
            } else {
                format!("🔧 {}", call.name)
            }
        }
        AgentEvent::ToolCallFinished { tool_name, output, is_error, .. } => {
            if verbosity < Verbosity::Standard && !is_error {
                return None;
            }
            let mark = if *is_error { "✗" } else { "✓" };
            let body = if verbosity >= Verbosity::Verbose {
                output.clone()
            } else {
                clip(output.lines().next().unwrap_or(""), 120)
            };
            format!("  {mark} {tool_name}: {body}")
        }
        AgentEvent::ContextCompacted { summary_id, messages_before, messages_after } => {
            if verbosity < Verbosity::Standard {
                return None;
            }
            format!("📝 {summary_id}: context {messages_before} → {messages_after} messages")
        }
        AgentEvent::StateSaved { iteration } => {
            if verbosity < Verbosity::Debug {
                return None;
            }
            format!("💾 state saved (iteration {iteration})")
        }
        AgentEvent::Error(e) => format!("❌ {e}"),
        AgentEvent::Flush(_) => return None,
        AgentEvent::Finished { success, iterations } => {
            if ev.depth == 0 {
                return None;
            }
            let mark = if *success { "✓" } else { "✗" };
            format!("◀ sub-agent {mark} after {iterations} iterations")
        }
    };
    let indent = "    ".repeat(ev.depth);
    Some(
        text.lines()
            .map(|l| format!("{indent}{l}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Final report printed after the run.
pub fn outcome_summary(outcome: &TaskOutcome) -> String {
    let mut out = String::new();
    if outcome.success {
        out.push_str("✅ Task completed successfully!\n");
    } else {
        out.push_str(&format!(
            "❌ Task failed: {}\n",
            outcome.error.as_deref().unwrap_or("unknown error")
        ));
    }
    out.push_str(&format!("Task ID: {}\n", outcome.task_id));
    out.push_str(&format!("Iterations: {}\n", outcome.iterations));
    out.push_str(&format!("Tools available: {}\n", outcome.tools_available));
    out.push_str(&format!("Files created/modified: {}\n", outcome.files_created));
    out.push_str(&format!("Sub-agents spawned: {}", outcome.sub_agents_spawned));
    if outcome.resume_possible {
        out.push_str(&format!(
            "\nResume with: swe-agent --resume {}",
            outcome.task_id
        ));
    }
    out
}
