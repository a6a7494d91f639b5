use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use swe_config::Config;
use swe_model::ModelProvider;
use swe_state::{SubAgentResult, TaskState};
use swe_tools::{Tool, ToolCall, ToolContext, ToolOutput};

use crate::agent::Agent;
use crate::bootstrap::child_registry;
use crate::events::EventSink;
use crate::operator::DelegatedOperator;

/// Deepest nesting level a sub-agent may run at.
pub const MAX_DEPTH: usize = 3;

const AGENT_TYPES: &[&str] = &["search", "analysis", "coding", "debugging", "general"];

/// Tools a sub-agent of `agent_type` may use, limited to what the parent has.
pub fn allowed_tools(agent_type: &str, parent: &[String]) -> Vec<String> {
    let role: &[&str] = match agent_type {
        "search" => &["glob_search", "grep_search", "list_directory", "str_replace_editor"],
        "analysis" => &["str_replace_editor", "grep_search", "bash", "create_summary"],
        "coding" => &["str_replace_editor", "bash", "glob_search", "grep_search"],
        "debugging" => &["str_replace_editor", "bash", "grep_search", "list_directory"],
        "general" => &[
            "str_replace_editor",
            "bash",
            "glob_search",
            "grep_search",
            "list_directory",
            "todo_write",
        ],
        _ => {
            let mut names = parent.to_vec();
            names.sort();
            names.truncate(6);
            return names;
        }
    };
    role.iter()
        .filter(|name| parent.iter().any(|p| p == *name))
        .map(|name| name.to_string())
        .collect()
}

/// Releases one sub-agent slot when dropped.
pub struct SlotGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounds and runs delegated sub-agents.
///
/// The active count is shared by every clone of the orchestrator, so
/// concurrent spawns from one parent respect the same cap.
pub struct SubAgentOrchestrator {
    active: Arc<AtomicUsize>,
    max_sub_agents: usize,
    model: Arc<dyn ModelProvider>,
    config: Arc<Config>,
    events: EventSink,
    parent_tools: Vec<String>,
}

impl SubAgentOrchestrator {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        config: Arc<Config>,
        events: EventSink,
        parent_tools: Vec<String>,
    ) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max_sub_agents: config.agent.max_sub_agents,
            model,
            config,
            events,
            parent_tools,
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_sub_agents(&self) -> usize {
        self.max_sub_agents
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.max_sub_agents.saturating_sub(self.active())
    }

    /// Take a slot, or `None` when all are in use.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max_sub_agents {
                return None;
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(SlotGuard { active: Arc::clone(&self.active) }),
                Err(seen) => current = seen,
            }
        }
    }

    /// Run a child agent on `prompt` and fold its result into `parent`.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        &self,
        call_id: &str,
        description: &str,
        prompt: &str,
        agent_type: &str,
        depth: usize,
        working_dir: &Path,
        parent: &mut TaskState,
    ) -> ToolOutput {
        if depth >= MAX_DEPTH {
            return ToolOutput::err(
                call_id,
                format!("Maximum sub-agent depth ({MAX_DEPTH}) reached"),
            );
        }
        let Some(_slot) = self.try_acquire() else {
            return ToolOutput::err(
                call_id,
                format!("Maximum sub-agents ({}) already active", self.max_sub_agents),
            );
        };

        let allowed = allowed_tools(agent_type, &self.parent_tools);
        debug!(
            agent_type,
            depth = depth + 1,
            tools = ?allowed,
            active = self.active(),
            "spawning sub-agent"
        );
        let tools = Arc::new(child_registry(&self.config, &allowed));
        let mut child = Agent::new(
            Arc::clone(&self.model),
            tools,
            Arc::clone(&self.config),
            Arc::new(DelegatedOperator),
        )
        .with_working_dir(working_dir)
        .with_events(self.events.clone())
        .into_sub_agent(depth + 1, self.config.agent.sub_agent_max_iterations);

        let task = format!("{description}\n\n{prompt}");
        let outcome = child.run(&task, None).await;

        let response = outcome
            .final_response
            .clone()
            .or_else(|| outcome.error.clone())
            .unwrap_or_default();
        parent.sub_agent_results.push(SubAgentResult {
            agent_type: agent_type.to_string(),
            description: description.to_string(),
            success: outcome.success,
            iterations: outcome.iterations,
            response: response.clone(),
            timestamp: Utc::now(),
        });

        if !outcome.success {
            warn!(agent_type, iterations = outcome.iterations, "sub-agent did not complete");
            return ToolOutput::err(
                call_id,
                format!(
                    "Sub-agent ({agent_type}) failed after {} iterations: {response}",
                    outcome.iterations
                ),
            );
        }

        let mut text = format!(
            "Sub-agent ({agent_type}) completed in {} iterations:\n",
            outcome.iterations
        );
        text.extend(response.chars().take(500));
        if response.chars().count() > 500 {
            text.push_str("...");
        }
        ToolOutput::ok(call_id, text)
            .with_field("agent_type", agent_type)
            .with_field("iterations", outcome.iterations)
            .with_field("tools_used", allowed.len())
    }
}

/// `task_agent`: delegate a focused sub-task to a specialised sub-agent.
pub struct TaskAgentTool {
    orchestrator: Arc<SubAgentOrchestrator>,
}

impl TaskAgentTool {
    pub fn new(orchestrator: Arc<SubAgentOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for TaskAgentTool {
    fn name(&self) -> &str {
        "task_agent"
    }

    fn description(&self) -> &str {
        "Spawn a specialised sub-agent for a focused task and return its final answer. \
         search: find files and code; analysis: read and summarise; coding: implement \
         changes; debugging: diagnose failures; general: mixed work."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short description of the sub-task"
                },
                "prompt": {
                    "type": "string",
                    "description": "Detailed instructions for the sub-agent"
                },
                "agent_type": {
                    "type": "string",
                    "enum": AGENT_TYPES,
                    "description": "Kind of sub-agent (default: general)"
                }
            },
            "required": ["description", "prompt"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let Some(description) = call.args.get("description").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'description'");
        };
        let Some(prompt) = call.args.get("prompt").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing 'prompt'");
        };
        let agent_type = call.args.get("agent_type").and_then(|v| v.as_str()).unwrap_or("general");

        self.orchestrator
            .spawn(
                &call.id,
                description,
                prompt,
                agent_type,
                ctx.depth,
                ctx.working_dir,
                &mut *ctx.state,
            )
            .await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
