// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use swe_state::TaskState;

/// Inputs for [`system_prompt`].
#[derive(Debug)]
pub struct PromptContext<'a> {
    /// Names of the registered tools
    pub tools: &'a [String],
    pub working_dir: &'a Path,
    /// Present on resume; its latest summary is appended to the prompt.
    pub state: Option<&'a TaskState>,
    /// Full prompt override from `agent.system_prompt`
    pub custom: Option<&'a str>,
}

// ─── Guidelines Module ───────────────────────────────────────────────────────

mod guidelines {
    pub fn behaviour() -> &'static str {
        "1. **Task Analysis** - Use the tool suite to understand the requirements first\n\
         2. **Systematic Execution** - Break complex tasks down with todo_write\n\
         3. **Search Before Editing** - Use glob_search and grep_search to learn the codebase\n\
         4. **Research** - Use the web tools for documentation and known solutions\n\
         5. **Delegation** - Use task_agent for focused analysis or isolated sub-tasks\n\
         6. **Progress Transparency** - Call update_progress_md and create_summary as you go\n\
         7. **Error Recovery** - Report failures with ask_user_step instead of guessing\n\
         8. **Completion** - Reply without any tool call only when the task is done"
    }

    pub fn persistence() -> &'static str {
        "- State is saved after every step\n\
         - An interrupted task can be resumed from the last saved step\n\
         - Build on previous work instead of restarting"
    }
}

fn section(out: &mut String, title: &str, entries: &[(&str, &str)], tools: &[String]) {
    let lines: Vec<String> = entries
        .iter()
        .filter(|(name, _)| tools.iter().any(|t| t == name))
        .map(|(name, what)| format!("- {name}: {what}"))
        .collect();
    out.push_str(title);
    if lines.is_empty() {
        out.push_str(" Disabled\n\n");
    } else {
        out.push('\n');
        out.push_str(&lines.join("\n"));
        out.push_str("\n\n");
    }
}

/// Build the system prompt: capabilities, behaviour contract, the latest
/// summary when resuming, and the working directory.
pub fn system_prompt(ctx: &PromptContext<'_>) -> String {
    let footer = format!(
        "\n\nWorking directory: {}\nTools available: {}",
        ctx.working_dir.display(),
        ctx.tools.len()
    );
    if let Some(custom) = ctx.custom {
        return format!("{custom}{footer}");
    }

    let mut out = String::from(
        "You are a software engineering agent with a full tool suite. \
         Work autonomously, verify every result with tools, and keep the \
         task state current.\n\nCAPABILITIES:\n\n",
    );
    section(
        &mut out,
        "FILE OPERATIONS:",
        &[
            ("str_replace_editor", "Create, view and edit files with range viewing"),
            ("glob_search", "Find files using patterns (**/*.py, src/**/*.rs)"),
            ("list_directory", "Directory listing with sizes and languages"),
        ],
        ctx.tools,
    );
    section(
        &mut out,
        "SEARCH & ANALYSIS:",
        &[
            ("grep_search", "Regex search across files with context"),
            ("task_agent", "Spawn specialised sub-agents (search, analysis, coding, debugging, general)"),
        ],
        ctx.tools,
    );
    section(
        &mut out,
        "EXECUTION:",
        &[("bash", "Run shell commands with timeouts scaled to the command type")],
        ctx.tools,
    );
    section(
        &mut out,
        "PROJECT MANAGEMENT:",
        &[
            ("todo_write", "Maintain a task list with statuses and priorities"),
            ("create_summary", "Record a summary of progress so far"),
            ("update_progress_md", "Log an action and refresh the progress report"),
        ],
        ctx.tools,
    );
    section(
        &mut out,
        "USER INTERACTION:",
        &[("ask_user_step", "Ask the user for guidance on failures and decisions")],
        ctx.tools,
    );
    section(
        &mut out,
        "WEB & RESEARCH:",
        &[
            ("web_fetch", "Fetch documentation, examples and tutorials"),
            ("web_search", "Search for solutions and libraries"),
        ],
        ctx.tools,
    );
    section(
        &mut out,
        "NOTEBOOKS:",
        &[("notebook_edit", "Create, read and extend Jupyter notebooks")],
        ctx.tools,
    );

    out.push_str("BEHAVIOUR:\n");
    out.push_str(guidelines::behaviour());
    out.push_str("\n\nPERSISTENCE & RECOVERY:\n");
    out.push_str(guidelines::persistence());

    if let Some(state) = ctx.state {
        if let Some(latest) = state.latest_summary() {
            out.push_str(&format!(
                "\n\nPREVIOUS PROGRESS:\n\
                 Key accomplishments: {}\n\
                 Current focus: {}\n\
                 Files created/modified: {}\n\
                 Errors resolved: {}\n\
                 Next steps: {}\n\
                 Sub-agent results: {} completed\n\n\
                 Continue building on this progress.",
                latest.key_accomplishments.join(", "),
                latest.current_focus,
                latest.files_created_modified.join(", "),
                latest.errors_resolved.join(", "),
                latest.next_steps.join(", "),
                state.sub_agent_results.len(),
            ));
        }
    }

    out.push_str(&footer);
    out
}

/// First user message of a run.  A resumed task carries its prior progress.
pub fn initial_message(prompt: &str, task: &str, state: &TaskState) -> String {
    match state.summary_context() {
        Some(ctx) => format!("{prompt}\n\n{ctx}\n\nContinue task with full capabilities: {task}"),
        None => format!("{prompt}\n\nTask: {task}"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
