// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`AgentBuilder`]: single entry point for constructing a fully wired Agent.
//!
//! Discovery runs over the built-in catalog for every enabled namespace;
//! `task_agent` is added on top because it needs the model and the
//! orchestrator, which the catalog factories do not see.

use std::sync::Arc;

use swe_config::Config;
use swe_model::ModelProvider;
use swe_tools::{catalog, enabled_namespaces, Tool, ToolRegistry};

use crate::agent::Agent;
use crate::events::EventSink;
use crate::operator::Operator;
use crate::task_tool::{SubAgentOrchestrator, TaskAgentTool};

/// Registry for a top-level agent, with `task_agent` wired to a fresh
/// orchestrator.
pub fn build_registry(
    cfg: &Arc<Config>,
    model: Arc<dyn ModelProvider>,
    events: EventSink,
) -> (ToolRegistry, Arc<SubAgentOrchestrator>) {
    let namespaces = enabled_namespaces(&cfg.tools);
    let mut registry = ToolRegistry::discover(&namespaces, &catalog(), &cfg.tools, &|_| true);

    let mut parent_tools = registry.names();
    parent_tools.push("task_agent".to_string());
    parent_tools.sort();

    let orchestrator = Arc::new(SubAgentOrchestrator::new(
        model,
        Arc::clone(cfg),
        events,
        parent_tools,
    ));
    registry.insert(Arc::new(TaskAgentTool::new(Arc::clone(&orchestrator))));
    (registry, orchestrator)
}

/// Registry for a sub-agent: only the `allowed` names, never `task_agent`.
pub fn child_registry(cfg: &Config, allowed: &[String]) -> ToolRegistry {
    let namespaces = enabled_namespaces(&cfg.tools);
    let filter = |tool: &dyn Tool| allowed.iter().any(|name| name == tool.name());
    ToolRegistry::discover(&namespaces, &catalog(), &cfg.tools, &filter)
}

/// Constructs a fully wired [`Agent`] from configuration.
///
/// # Example
/// ```rust,ignore
/// let agent = AgentBuilder::new(config)
///     .with_events(EventSink::new(tx))
///     .build(model, Arc::new(ConsoleOperator::new()));
/// ```
pub struct AgentBuilder {
    config: Arc<Config>,
    events: EventSink,
}

impl AgentBuilder {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, events: EventSink::none() }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn build(self, model: Arc<dyn ModelProvider>, operator: Arc<dyn Operator>) -> Agent {
        let (registry, orchestrator) =
            build_registry(&self.config, Arc::clone(&model), self.events.clone());
        Agent::new(model, Arc::new(registry), self.config, operator)
            .with_events(self.events)
            .with_orchestrator(orchestrator)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
