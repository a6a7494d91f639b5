// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use swe_config::Config;
use swe_model::{parse_prompted_tool_calls, CompletionRequest, Message, ModelProvider, ResponseEvent};
use swe_state::{ProgressReport, ReportStatus, StateStore, TaskState};
use swe_tools::builtin::progress::GUIDANCE_STATUSES;
use swe_tools::{classify_command, ToolCall, ToolContext, ToolOutput, ToolRegistry};

use crate::{
    compact::{build_summary, compact_messages, summarize, summary_block},
    errors::friendly_message,
    events::{AgentEvent, EventSink},
    operator::{CompletionAnswer, GuidanceRequest, Operator, RecoveryAction, RecoveryContext},
    prompts::{initial_message, system_prompt, PromptContext},
    session::Session,
    task_tool::SubAgentOrchestrator,
};

/// Where the orchestration loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    Running,
    AwaitingModel,
    AwaitingToolResults,
    Completed,
    Aborted,
    MaxIterations,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::MaxIterations)
    }
}

/// Result of [`Agent::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub success: bool,
    pub status: LoopState,
    pub iterations: u32,
    pub final_response: Option<String>,
    pub task_id: String,
    pub tools_available: usize,
    pub files_created: usize,
    pub sub_agents_spawned: usize,
    pub error: Option<String>,
    /// The saved record can be picked up with `--resume <task_id>`
    pub resume_possible: bool,
}

/// What a single loop pass ended with.
enum Pass {
    Continue,
    Completed(String),
}

/// One accumulated model turn.
struct Turn {
    text: String,
    calls: Vec<ToolCall>,
    /// Calls arrived as native function calls (not parsed out of the text)
    native: bool,
}

/// The core agent.  Drives the model ↔ tool loop for one task.
pub struct Agent {
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    config: Arc<Config>,
    operator: Arc<dyn Operator>,
    events: EventSink,
    orchestrator: Option<Arc<SubAgentOrchestrator>>,
    working_dir: PathBuf,
    /// `None` for sub-agents, which never persist
    store: Option<StateStore>,
    /// `None` when progress tracking is off or for sub-agents
    progress: Option<ProgressReport>,
    max_iterations: u32,
    depth: usize,
    session: Session,
    loop_state: LoopState,
    state: Option<TaskState>,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        config: Arc<Config>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        let working_dir = config.working_dir();
        let max_iterations = config.agent.max_iterations;
        let mut agent = Self {
            model,
            tools,
            config,
            operator,
            events: EventSink::none(),
            orchestrator: None,
            working_dir,
            store: None,
            progress: None,
            max_iterations,
            depth: 0,
            session: Session::new(),
            loop_state: LoopState::Init,
            state: None,
        };
        agent.attach_files();
        agent
    }

    fn attach_files(&mut self) {
        let agent = &self.config.agent;
        self.store = Some(StateStore::new(self.working_dir.join(&agent.state_file)));
        self.progress = agent.progress_tracking.then(|| {
            ProgressReport::new(self.working_dir.join(&agent.progress_file), self.tools.len())
                .with_namespaces(self.config.tools.enable_web, self.config.tools.enable_notebooks)
        });
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events.at_depth(self.depth);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<SubAgentOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Operate in `dir` instead of the configured working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        if self.store.is_some() {
            self.attach_files();
        }
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Turn this agent into a nested worker: no state file, no progress
    /// report, events tagged one level deeper.
    pub fn into_sub_agent(mut self, depth: usize, max_iterations: u32) -> Self {
        self.depth = depth;
        self.max_iterations = max_iterations;
        self.store = None;
        self.progress = None;
        self.events = self.events.at_depth(depth);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    /// State of the last run, kept after it ends.
    pub fn state(&self) -> Option<&TaskState> {
        self.state.as_ref()
    }

    pub fn orchestrator(&self) -> Option<&Arc<SubAgentOrchestrator>> {
        self.orchestrator.as_ref()
    }

    pub fn store(&self) -> Option<&StateStore> {
        self.store.as_ref()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Execute `task`, or continue the record saved under `resume`.
    ///
    /// A resume id that cannot be loaded falls back to a fresh start of
    /// `task`; with no task text to fall back to, the run aborts.
    pub async fn run(&mut self, task: &str, resume: Option<&str>) -> TaskOutcome {
        let outcome = self.drive(task, resume).await;
        self.events
            .emit(AgentEvent::Finished { success: outcome.success, iterations: outcome.iterations })
            .await;
        outcome
    }

    async fn drive(&mut self, task: &str, resume: Option<&str>) -> TaskOutcome {
        self.loop_state = LoopState::Init;
        self.session = Session::new();

        let (mut state, resumed) = match self.prepare_state(task, resume).await {
            Ok(prepared) => prepared,
            Err(msg) => {
                self.loop_state = LoopState::Aborted;
                self.events.emit(AgentEvent::Error(msg.clone())).await;
                let state = TaskState::new(task);
                return self.finish(state, false, None, Some(msg), false);
            }
        };
        let task = state.original_task.clone();

        self.events
            .emit(AgentEvent::TaskStarted {
                task_id: state.task_id.clone(),
                task: task.clone(),
                resumed,
            })
            .await;
        if let Some(report) = &self.progress {
            report.write(&state, ReportStatus::InProgress).await;
        }

        let names = self.tools.names();
        let prompt = system_prompt(&PromptContext {
            tools: &names,
            working_dir: &self.working_dir,
            state: resumed.then_some(&state),
            custom: self.config.agent.system_prompt.as_deref(),
        });
        self.session.push(Message::user(initial_message(&prompt, &task, &state)));
        self.loop_state = LoopState::Running;

        while state.iteration_count < self.max_iterations {
            self.events
                .emit(AgentEvent::IterationStarted {
                    iteration: state.iteration_count + 1,
                    max_iterations: self.max_iterations,
                })
                .await;
            debug!(
                iteration = state.iteration_count + 1,
                step = %state.current_step,
                depth = self.depth,
                "loop pass"
            );

            match self.pass(&mut state).await {
                Ok(Pass::Continue) => {}
                Ok(Pass::Completed(response)) => {
                    self.loop_state = LoopState::Completed;
                    return self.finish(state, true, Some(response), None, false);
                }
                Err(e) => {
                    self.loop_state = LoopState::Running;
                    let msg = format!("{e:#}");
                    if self.recover(&mut state, &msg).await == RecoveryAction::Abort {
                        self.save(&state).await;
                        self.loop_state = LoopState::Aborted;
                        let resumable = self.store.is_some();
                        return self.finish(state, false, None, Some(msg), resumable);
                    }
                    self.checkpoint(&mut state).await;
                }
            }
        }

        self.events.emit(AgentEvent::Status("Max iterations reached".into())).await;
        if let Some(report) = &self.progress {
            report.write(&state, ReportStatus::InProgress).await;
        }
        self.save(&state).await;
        self.loop_state = LoopState::MaxIterations;
        let resumable = self.store.is_some();
        self.finish(state, false, None, Some("Max iterations reached".into()), resumable)
    }

    async fn prepare_state(
        &self,
        task: &str,
        resume: Option<&str>,
    ) -> Result<(TaskState, bool), String> {
        if let Some(id) = resume {
            if let Some(store) = &self.store {
                if let Some(state) = store.load(id).await {
                    return Ok((state, true));
                }
            }
            warn!(task_id = id, "could not resume task");
            if task.trim().is_empty() {
                return Err(format!("Could not resume task {id} and no task was given"));
            }
            self.events
                .emit(AgentEvent::Status(format!(
                    "Could not resume task {id}; starting new task instead"
                )))
                .await;
        }
        Ok((TaskState::new(task), false))
    }

    fn finish(
        &mut self,
        state: TaskState,
        success: bool,
        final_response: Option<String>,
        error: Option<String>,
        resume_possible: bool,
    ) -> TaskOutcome {
        let outcome = TaskOutcome {
            success,
            status: self.loop_state,
            iterations: state.iteration_count,
            final_response,
            task_id: state.task_id.clone(),
            tools_available: self.tools.len(),
            files_created: state.files_tracking.len(),
            sub_agents_spawned: state.sub_agent_results.len(),
            error,
            resume_possible,
        };
        self.state = Some(state);
        outcome
    }

    /// One loop pass: compact when due, call the model, then either run the
    /// requested tools or treat the reply as a candidate final answer.
    async fn pass(&mut self, state: &mut TaskState) -> anyhow::Result<Pass> {
        let threshold = self.config.agent.summarization_threshold;
        if threshold > 0 && state.iteration_count > 0 && state.iteration_count % threshold == 0 {
            self.compact(state).await;
        }

        self.loop_state = LoopState::AwaitingModel;
        let turn = self.stream_turn(state.iteration_count).await?;
        if !turn.text.is_empty() {
            self.events.emit(AgentEvent::TextComplete(turn.text.clone())).await;
        }

        if turn.calls.is_empty() {
            self.loop_state = LoopState::Running;
            let response = if turn.text.is_empty() {
                "Task completed".to_string()
            } else {
                turn.text
            };
            self.session.push(Message::assistant(&response));
            return self.confirm(state, response).await;
        }

        self.loop_state = LoopState::AwaitingToolResults;
        if turn.native {
            if !turn.text.is_empty() {
                self.session.push(Message::assistant(&turn.text));
            }
            for call in &turn.calls {
                self.session.push(Message::tool_call(&call.id, &call.name, call.args.to_string()));
            }
        } else {
            self.session.push(Message::assistant(&turn.text));
        }

        for call in &turn.calls {
            let output = self.dispatch(state, call).await;
            let content = output.content();
            if turn.native {
                self.session.push(Message::tool_result(&call.id, &content));
            } else {
                self.session.push(Message::user(format!(
                    "[tool result {} ({})]\n{content}",
                    call.name, call.id
                )));
            }
        }

        self.checkpoint(state).await;
        self.loop_state = LoopState::Running;
        Ok(Pass::Continue)
    }

    /// Run one tool call against the task state and report it.
    async fn dispatch(&mut self, state: &mut TaskState, call: &ToolCall) -> ToolOutput {
        self.events.emit(AgentEvent::ToolCallStarted(call.clone())).await;
        debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");

        let tools = Arc::clone(&self.tools);
        let mut output = {
            let mut ctx = ToolContext {
                state: &mut *state,
                working_dir: &self.working_dir,
                progress: self.progress.as_ref(),
                depth: self.depth,
            };
            tools.execute(call, &mut ctx).await
        };

        if call.name == "ask_user_step" && output.success {
            let status = str_arg(&call.args, "status");
            if GUIDANCE_STATUSES.contains(&status) {
                let req = GuidanceRequest {
                    step_description: str_arg(&call.args, "step_description").to_string(),
                    status: status.to_string(),
                    error_details: str_arg(&call.args, "error_details").to_string(),
                    suggested_next_action: str_arg(&call.args, "suggested_next_action").to_string(),
                    tools_available: self.tools.len(),
                    sub_agents_available: self.sub_agents_available(),
                };
                let guidance = self.operator.guidance(&req).await.render();
                apply_guidance(state, &guidance, &req.step_description);
                output.output = Some(guidance);
            }
        }

        if output.success {
            track_progress(state, call);
        }

        self.events
            .emit(AgentEvent::ToolCallFinished {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: output.content(),
                is_error: output.is_error(),
            })
            .await;
        output
    }

    async fn confirm(&mut self, state: &mut TaskState, response: String) -> anyhow::Result<Pass> {
        if let Some(report) = &self.progress {
            report.write(state, ReportStatus::InProgress).await;
        }
        match self.operator.confirm_completion(&response).await {
            CompletionAnswer::Yes => {
                if let Some(report) = &self.progress {
                    report.finalize(state).await;
                }
                if let Some(store) = &self.store {
                    store.cleanup().await;
                }
                return Ok(Pass::Completed(response));
            }
            CompletionAnswer::No => {
                let feedback = self.operator.completion_feedback().await;
                self.session
                    .push(Message::user(format!("Task not complete. User feedback: {feedback}")));
            }
            CompletionAnswer::Continue => {
                self.session.push(Message::user(
                    "Please continue working on the task with your full capabilities.",
                ));
            }
        }
        self.checkpoint(state).await;
        Ok(Pass::Continue)
    }

    /// Record a failed pass and ask how to go on.  Retry and skip leave a
    /// note for the model; the caller handles abort.
    async fn recover(&mut self, state: &mut TaskState, msg: &str) -> RecoveryAction {
        let snapshot = state.context_snapshot(self.tools.len());
        let names = self.tools.names();
        state.record_error(msg, snapshot.clone(), names.clone());
        warn!(error = %msg, iteration = state.iteration_count + 1, "loop pass failed");
        self.events.emit(AgentEvent::Error(friendly_message(msg))).await;

        let ctx = RecoveryContext {
            error: msg.to_string(),
            step: state.current_step.clone(),
            snapshot,
            tools: names,
            sub_agents_available: self.sub_agents_available(),
        };
        let action = self.operator.recovery_choice(&ctx).await;
        match action {
            RecoveryAction::Retry => self.session.push(Message::user(format!(
                "Error occurred: {msg}. Please retry using your full tool suite and the progress made so far."
            ))),
            RecoveryAction::Skip => self.session.push(Message::user(
                "The previous step failed and was skipped. Continue with the next part of the task.",
            )),
            RecoveryAction::Abort => {}
        }
        action
    }

    /// Close a pass: count it and persist.
    async fn checkpoint(&mut self, state: &mut TaskState) {
        state.iteration_count += 1;
        self.save(state).await;
    }

    async fn save(&self, state: &TaskState) {
        if let Some(store) = &self.store {
            store.save(state).await;
            self.events
                .emit(AgentEvent::StateSaved { iteration: state.iteration_count })
                .await;
        }
    }

    /// Summarise recent history and replace the log with
    /// `[first, summary, tail]`.  A failed summary is logged and the latest
    /// earlier summary, if any, is used instead.
    async fn compact(&mut self, state: &mut TaskState) {
        self.events
            .emit(AgentEvent::Status(format!(
                "Creating summary after {} iterations",
                state.iteration_count
            )))
            .await;
        match summarize(
            self.model.as_ref(),
            &self.session.messages,
            self.config.model.summary_max_tokens,
        )
        .await
        {
            Ok(text) => {
                let summary = build_summary(state, &text);
                debug!(
                    summary_id = %summary.summary_id,
                    accomplishments = summary.key_accomplishments.len(),
                    "summary created"
                );
                state.conversation_summaries.push(summary);
            }
            Err(e) => warn!("could not create summary: {e:#}"),
        }

        let Some(latest) = state.latest_summary() else {
            return;
        };
        let block = summary_block(latest, state.sub_agent_results.len(), self.tools.len());
        let summary_id = latest.summary_id.clone();
        let before = self.session.len();
        let compacted =
            compact_messages(&self.session.messages, &block, self.config.agent.context_retention);
        self.session.replace_messages(compacted);
        self.events
            .emit(AgentEvent::ContextCompacted {
                summary_id,
                messages_before: before,
                messages_after: self.session.len(),
            })
            .await;
    }

    fn sub_agents_available(&self) -> usize {
        self.orchestrator.as_ref().map(|o| o.available()).unwrap_or(0)
    }

    /// Call the model and accumulate one streamed turn.
    async fn stream_turn(&mut self, iteration: u32) -> anyhow::Result<Turn> {
        let native = self.model.supports_function_calling();
        let tools: Vec<swe_model::ToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| swe_model::ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();
        let req = CompletionRequest {
            messages: self.session.messages.clone(),
            tools,
            max_tokens: self.config.model.max_tokens,
            native_tools: native,
        };

        let mut stream = self.model.complete(req).await.context("model completion failed")?;

        let mut text = String::new();
        // Keyed by the parallel-tool-call index from the provider.
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    let ptc = pending.entry(index).or_default();
                    if !id.is_empty() {
                        ptc.id = id;
                    }
                    if !name.is_empty() {
                        ptc.name = name;
                    }
                    ptc.args_buf.push_str(&arguments);
                }
                ResponseEvent::Usage { input_tokens, output_tokens } => {
                    debug!(input_tokens, output_tokens, "token usage");
                }
                ResponseEvent::Done => break,
                ResponseEvent::Error(e) => anyhow::bail!("model stream error: {e}"),
            }
        }

        let mut sorted: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
        sorted.sort_by_key(|(idx, _)| *idx);
        let mut calls = Vec::with_capacity(sorted.len());
        for (i, (_, ptc)) in sorted.into_iter().enumerate() {
            if ptc.name.is_empty() {
                warn!(tool_call_id = %ptc.id, "dropping tool call with empty name from model");
                continue;
            }
            let mut call = ptc.finish();
            if call.id.is_empty() {
                call.id = format!("call_{iteration}_{i}");
            }
            calls.push(call);
        }

        if calls.is_empty() && !native {
            let (_, parsed) = parse_prompted_tool_calls(&text);
            calls = parsed
                .into_iter()
                .enumerate()
                .map(|(i, f)| {
                    PendingToolCall {
                        id: format!("call_{iteration}_{i}"),
                        name: f.name,
                        args_buf: f.arguments,
                    }
                    .finish()
                })
                .collect();
            return Ok(Turn { text, calls, native: false });
        }

        Ok(Turn { text, calls, native: true })
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn clip(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Completed-step entry for a successful tool call.
fn describe_operation(call: &ToolCall) -> String {
    let args = &call.args;
    match call.name.as_str() {
        "bash" => {
            let cmd = str_arg(args, "command");
            format!("Executed {}: {}...", classify_command(cmd), clip(cmd, 50))
        }
        "str_replace_editor" => {
            format!("File {}: {}", str_arg(args, "command"), str_arg(args, "path"))
        }
        "task_agent" => {
            let kind = args.get("agent_type").and_then(|v| v.as_str()).unwrap_or("general");
            format!("Spawned {kind} sub-agent: {}...", clip(str_arg(args, "description"), 50))
        }
        "glob_search" | "grep_search" => {
            let pattern = args.get("pattern").and_then(|v| v.as_str()).unwrap_or("N/A");
            format!("Search with {}: {pattern}", call.name)
        }
        other => {
            let keys: Vec<&str> = args
                .as_object()
                .map(|m| m.keys().map(String::as_str).collect())
                .unwrap_or_default();
            format!("Used {other}: [{}]", keys.join(", "))
        }
    }
}

fn track_progress(state: &mut TaskState, call: &ToolCall) {
    let operation = describe_operation(call);
    if call.name != "ask_user_step" {
        state.current_step = operation.clone();
    }
    state.record_step(operation);
}

/// Mark the step as skipped, manual or delegated when the guidance says so.
fn apply_guidance(state: &mut TaskState, guidance: &str, step: &str) {
    let lower = guidance.to_lowercase();
    let tag = if lower.contains("skip") {
        "SKIPPED"
    } else if lower.contains("manual") {
        "MANUAL"
    } else if lower.contains("delegate") {
        "DELEGATED"
    } else {
        return;
    };
    state.record_step(format!("{tag}: {step}"));
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    fn finish(self) -> ToolCall {
        // Always resolve to a JSON object; tools index into it by key.
        let args = if self.args_buf.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(&self.args_buf) {
                Ok(v) if v.is_object() => v,
                Ok(_) => {
                    warn!(tool_name = %self.name, "tool arguments are not an object; substituting {{}}");
                    Value::Object(Default::default())
                }
                Err(e) => match attempt_json_repair(&self.args_buf) {
                    Some(v) => {
                        warn!(tool_name = %self.name, tool_call_id = %self.id, "repaired invalid JSON arguments from model");
                        v
                    }
                    None => {
                        warn!(
                            tool_name = %self.name,
                            tool_call_id = %self.id,
                            args_buf = %self.args_buf,
                            error = %e,
                            "model sent tool call with invalid JSON arguments; substituting {{}}"
                        );
                        Value::Object(Default::default())
                    }
                },
            }
        };
        ToolCall { id: self.id, name: self.name, args }
    }
}

/// Fix the two breakages seen in practice: a missing comma between a value
/// and the next key, and a body cut off before its closing quote or brace.
fn attempt_json_repair(raw: &str) -> Option<Value> {
    if let Ok(re) = regex::Regex::new(r#""([^"]+)"([a-zA-Z_][a-zA-Z0-9_]*)":\s*"#) {
        let repaired = re.replace_all(raw, r#""$1", "$2": "#);
        if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
            return Some(v).filter(Value::is_object);
        }
    }
    let trimmed = raw.trim_end();
    if !trimmed.ends_with('}') {
        let mut completed = trimmed.to_string();
        if completed.chars().filter(|&c| c == '"').count() % 2 == 1 {
            completed.push('"');
        }
        completed.push('}');
        if let Ok(v) = serde_json::from_str::<Value>(&completed) {
            return Some(v).filter(Value::is_object);
        }
    }
    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall { id: "c".into(), name: name.into(), args }
    }

    // ── Progress descriptions ────────────────────────────────────────────────

    #[test]
    fn bash_operation_is_classified_and_clipped() {
        let long = format!("pip install {}", "x".repeat(80));
        let op = describe_operation(&call("bash", json!({ "command": long })));
        assert!(op.starts_with("Executed package_management: pip install "));
        assert!(op.ends_with("..."));
        assert_eq!(op.chars().count(), "Executed package_management: ".len() + 50 + 3);
    }

    #[test]
    fn editor_and_search_operations() {
        assert_eq!(
            describe_operation(&call("str_replace_editor", json!({"command": "create", "path": "a.txt"}))),
            "File create: a.txt"
        );
        assert_eq!(
            describe_operation(&call("grep_search", json!({"pattern": "fn main"}))),
            "Search with grep_search: fn main"
        );
        assert_eq!(describe_operation(&call("glob_search", json!({}))), "Search with glob_search: N/A");
    }

    #[test]
    fn task_agent_and_other_operations() {
        assert_eq!(
            describe_operation(&call("task_agent", json!({"description": "find todos"}))),
            "Spawned general sub-agent: find todos..."
        );
        assert_eq!(
            describe_operation(&call("todo_write", json!({"todos": []}))),
            "Used todo_write: [todos]"
        );
    }

    #[test]
    fn track_progress_dedups_and_sets_step() {
        let mut state = TaskState::new("t");
        let c = call("str_replace_editor", json!({"command": "view", "path": "x"}));
        track_progress(&mut state, &c);
        track_progress(&mut state, &c);
        assert_eq!(state.completed_steps, vec!["File view: x"]);
        assert_eq!(state.current_step, "File view: x");
    }

    // ── Guidance ─────────────────────────────────────────────────────────────

    #[test]
    fn guidance_keywords_tag_steps() {
        let mut state = TaskState::new("t");
        apply_guidance(&mut state, "User chose 'skip' with agent context. Additional info: ", "deploy");
        apply_guidance(&mut state, "User chose 'manual' with agent context. Additional info: did it", "migrate");
        apply_guidance(&mut state, "User chose 'delegate' with agent context. Additional info: x", "triage");
        apply_guidance(&mut state, "User chose 'continue' with agent context. Additional info: ", "other");
        assert_eq!(
            state.completed_steps,
            vec!["SKIPPED: deploy", "MANUAL: migrate", "DELEGATED: triage"]
        );
    }

    // ── Argument repair ──────────────────────────────────────────────────────

    #[test]
    fn pending_call_parses_valid_json() {
        let tc = PendingToolCall {
            id: "1".into(),
            name: "bash".into(),
            args_buf: r#"{"command":"ls"}"#.into(),
        }
        .finish();
        assert_eq!(tc.args["command"], "ls");
    }

    #[test]
    fn pending_call_empty_or_garbage_becomes_object() {
        let empty = PendingToolCall { name: "x".into(), ..Default::default() }.finish();
        assert!(empty.args.as_object().unwrap().is_empty());
        let garbage = PendingToolCall { name: "x".into(), args_buf: "not json".into(), ..Default::default() }.finish();
        assert!(garbage.args.as_object().unwrap().is_empty());
        let scalar = PendingToolCall { name: "x".into(), args_buf: "42".into(), ..Default::default() }.finish();
        assert!(scalar.args.is_object());
    }

    #[test]
    fn repair_missing_comma_and_truncation() {
        let v = attempt_json_repair(r#"{"path": "a.txt"command": "view"}"#).unwrap();
        assert_eq!(v["command"], "view");
        let v = attempt_json_repair(r#"{"command": "ls"#).unwrap();
        assert_eq!(v["command"], "ls");
        assert!(attempt_json_repair("[[[").is_none());
    }

    #[test]
    fn loop_state_terminality() {
        assert!(LoopState::Completed.is_terminal());
        assert!(LoopState::MaxIterations.is_terminal());
        assert!(!LoopState::AwaitingModel.is_terminal());
    }
}
