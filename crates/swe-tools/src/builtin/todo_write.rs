// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Key under which the latest list is kept in the task's working context.
pub const TODOS_KEY: &str = "todos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    "medium".into()
}

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Create and manage a structured task list.\n\
         Statuses: pending, in_progress, completed. Priorities: high, medium, low.\n\
         Calling todo_write replaces the entire list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] },
                            "priority": { "type": "string", "enum": ["high", "medium", "low"] }
                        },
                        "required": ["id", "content", "status", "priority"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let Some(raw) = call.args.get("todos") else {
            return ToolOutput::err(&call.id, "missing 'todos' array");
        };
        let items: Vec<TodoItem> = match serde_json::from_value(raw.clone()) {
            Ok(items) => items,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid todos: {e}")),
        };

        debug!(count = items.len(), "todo_write tool");

        let (mut pending, mut in_progress, mut completed) = (0usize, 0usize, 0usize);
        let mut out = String::from("Update Todos\n");
        for t in &items {
            let symbol = match t.status.as_str() {
                "completed" => {
                    completed += 1;
                    "[x]"
                }
                "in_progress" => {
                    in_progress += 1;
                    "[~]"
                }
                _ => {
                    pending += 1;
                    "[ ]"
                }
            };
            out.push_str(&format!("  {symbol} {} ({})\n", t.content, t.priority));
        }
        out.push_str(&format!(
            "\nSummary: {completed} completed, {in_progress} in progress, {pending} pending\n"
        ));

        ctx.state.working_context.insert(TODOS_KEY.into(), json!(items));
        ToolOutput::ok(&call.id, out)
            .with_field("total_todos", items.len())
            .with_field(
                "status_counts",
                json!({"pending": pending, "in_progress": in_progress, "completed": completed}),
            )
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use swe_state::TaskState;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "t1".into(), name: "todo_write".into(), args }
    }

    #[tokio::test]
    async fn renders_counts_and_stores_list() {
        let mut state = TaskState::new("t");
        let out = {
            let mut ctx = ToolContext::new(&mut state, Path::new("."));
            TodoWriteTool
                .execute(
                    &call(json!({"todos": [
                        {"id": "1", "content": "scaffold", "status": "completed", "priority": "high"},
                        {"id": "2", "content": "tests", "status": "in_progress", "priority": "low"},
                        {"id": "3", "content": "docs", "status": "pending", "priority": "medium"}
                    ]})),
                    &mut ctx,
                )
                .await
        };
        assert!(out.success);
        assert!(out.content().contains("Summary: 1 completed, 1 in progress, 1 pending"));
        assert!(out.content().contains("[x] scaffold (high)"));
        assert_eq!(state.working_context[TODOS_KEY].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_todos_is_error() {
        let mut state = TaskState::new("t");
        let mut ctx = ToolContext::new(&mut state, Path::new("."));
        let out = TodoWriteTool.execute(&call(json!({})), &mut ctx).await;
        assert!(out.error.unwrap().contains("missing 'todos'"));
    }

    #[tokio::test]
    async fn malformed_item_is_error() {
        let mut state = TaskState::new("t");
        let mut ctx = ToolContext::new(&mut state, Path::new("."));
        let out = TodoWriteTool
            .execute(&call(json!({"todos": [{"id": "1"}]})), &mut ctx)
            .await;
        assert!(out.error.unwrap().starts_with("invalid todos"));
    }
}
