// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use swe_config::ToolsConfig;
use tracing::{debug, warn};

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// A tool schema.  Mirrors `swe_model::ToolSchema` but keeps the tools crate
/// independent from the model crate.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Constructor for one capability, given the tool settings.
pub type ToolFactory = fn(&ToolsConfig) -> anyhow::Result<Arc<dyn Tool>>;

/// One entry of a plugin catalog: a factory filed under a namespace.
#[derive(Clone, Copy)]
pub struct PluginEntry {
    pub namespace: &'static str,
    pub name: &'static str,
    pub factory: ToolFactory,
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish()
    }
}

/// Central registry holding all available tools.  Built once, then shared
/// read-only behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Build a registry from `catalog`.
    ///
    /// Namespaces are visited in the given order and the entries of each in
    /// lexical name order, so collisions resolve the same way on every run.
    /// A factory that errors or panics is skipped; discovery always
    /// completes.  `filter` sees each constructed tool before insertion.
    pub fn discover(
        namespaces: &[String],
        catalog: &[PluginEntry],
        settings: &ToolsConfig,
        filter: &dyn Fn(&dyn Tool) -> bool,
    ) -> Self {
        let mut reg = Self::new();
        for ns in namespaces {
            let mut entries: Vec<&PluginEntry> =
                catalog.iter().filter(|e| e.namespace == ns.as_str()).collect();
            entries.sort_by_key(|e| e.name);
            if entries.is_empty() {
                debug!(namespace = %ns, "namespace has no catalog entries");
            }
            for entry in entries {
                let built = catch_unwind(AssertUnwindSafe(|| (entry.factory)(settings)));
                let tool = match built {
                    Ok(Ok(tool)) => tool,
                    Ok(Err(e)) => {
                        warn!(namespace = %ns, plugin = entry.name, error = %e, "skipping plugin");
                        continue;
                    }
                    Err(_) => {
                        warn!(namespace = %ns, plugin = entry.name, "plugin factory panicked; skipping");
                        continue;
                    }
                };
                if !filter(tool.as_ref()) {
                    debug!(tool = tool.name(), "tool rejected by filter");
                    continue;
                }
                reg.insert(tool);
            }
        }
        reg
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.insert(Arc::new(tool));
    }

    /// Insert a shared tool.  Last registration under a name wins.
    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "tool name registered twice; keeping the later one");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => match AssertUnwindSafe(tool.execute(call, ctx)).catch_unwind().await {
                Ok(out) => out,
                Err(_) => {
                    warn!(tool = %call.name, "tool panicked");
                    ToolOutput::err(&call.id, format!("tool {} panicked", call.name))
                }
            },
            None => ToolOutput::err(&call.id, format!("Unknown tool: {}", call.name)),
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
