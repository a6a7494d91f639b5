mod agent;
mod bootstrap;
mod compact;
mod errors;
mod events;
mod operator;
mod prompts;
mod session;
mod task_tool;

pub use agent::{Agent, LoopState, TaskOutcome};
pub use bootstrap::{build_registry, child_registry, AgentBuilder};
pub use compact::{build_summary, compact_messages, summarize, summary_block};
pub use errors::friendly_message;
pub use events::{AgentEvent, EventSink, ScopedEvent};
pub use operator::{
    CompletionAnswer, ConsoleOperator, DelegatedOperator, Guidance, GuidanceRequest, Operator,
    RecoveryAction, RecoveryContext, ScriptedOperator,
};
pub use prompts::{initial_message, system_prompt, PromptContext};
pub use session::Session;
pub use task_tool::{allowed_tools, SlotGuard, SubAgentOrchestrator, TaskAgentTool, MAX_DEPTH};
