use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use swe_state::FileMeta;
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Create, inspect and extend Jupyter notebooks (nbformat 4).
pub struct NotebookEditTool;

fn empty_notebook() -> Value {
    json!({
        "cells": [],
        "metadata": {
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3"
            },
            "language_info": { "name": "python", "version": "3.8.0" }
        },
        "nbformat": 4,
        "nbformat_minor": 4
    })
}

async fn read_notebook(path: &std::path::Path) -> anyhow::Result<Value> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

#[async_trait]
impl Tool for NotebookEditTool {
    fn name(&self) -> &str {
        "notebook_edit"
    }

    fn description(&self) -> &str {
        "Jupyter notebook operations: create an empty notebook, read its cell \
         summary, or add_cell with cell_content and cell_type (code or markdown)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "enum": ["create", "read", "add_cell"] },
                "path": { "type": "string" },
                "cell_content": { "type": "string" },
                "cell_type": { "type": "string", "enum": ["code", "markdown"] }
            },
            "required": ["command", "path"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'command'"),
        };
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'path'"),
        };
        let full = ctx.resolve(&path);

        debug!(command = %command, path = %path, "notebook_edit tool");

        match command.as_str() {
            "create" => {
                let nb = empty_notebook();
                let text = match serde_json::to_string_pretty(&nb) {
                    Ok(t) => t,
                    Err(e) => return ToolOutput::err(&call.id, e.to_string()),
                };
                if let Some(parent) = full.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return ToolOutput::err(&call.id, e.to_string());
                    }
                }
                if let Err(e) = tokio::fs::write(&full, &text).await {
                    return ToolOutput::err(&call.id, e.to_string());
                }
                let mut meta = FileMeta::created(text.len() as u64, None, "json");
                meta.kind = Some("jupyter_notebook".into());
                ctx.state.track_file(path.clone(), meta);
                ToolOutput::ok(&call.id, format!("Created Jupyter notebook: {path}"))
            }
            "read" => {
                let nb = match read_notebook(&full).await {
                    Ok(nb) => nb,
                    Err(e) => return ToolOutput::err(&call.id, e.to_string()),
                };
                let cells = nb.get("cells").and_then(|c| c.as_array()).cloned().unwrap_or_default();
                let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
                for cell in &cells {
                    let kind = cell.get("cell_type").and_then(|v| v.as_str()).unwrap_or("unknown");
                    *kinds.entry(kind.to_string()).or_default() += 1;
                }
                let breakdown: Vec<String> = kinds.iter().map(|(k, n)| format!("{k}: {n}")).collect();
                ToolOutput::ok(
                    &call.id,
                    format!(
                        "Notebook: {path}\nCells: {} total ({})",
                        cells.len(),
                        breakdown.join(", ")
                    ),
                )
                .with_field("cell_count", cells.len())
                .with_field("cell_types", json!(kinds))
            }
            "add_cell" => {
                let content = call.args.get("cell_content").and_then(|v| v.as_str()).unwrap_or("");
                let cell_type = call.args.get("cell_type").and_then(|v| v.as_str()).unwrap_or("code");
                let mut nb = match read_notebook(&full).await {
                    Ok(nb) => nb,
                    Err(e) => return ToolOutput::err(&call.id, e.to_string()),
                };
                let source: Vec<&str> = content.split('\n').collect();
                let mut cell = json!({ "cell_type": cell_type, "source": source, "metadata": {} });
                if cell_type == "code" {
                    cell["execution_count"] = Value::Null;
                    cell["outputs"] = json!([]);
                }
                let Some(cells) = nb.get_mut("cells").and_then(|c| c.as_array_mut()) else {
                    return ToolOutput::err(&call.id, format!("{path} has no cells array"));
                };
                cells.push(cell);
                let total = cells.len();
                let text = match serde_json::to_string_pretty(&nb) {
                    Ok(t) => t,
                    Err(e) => return ToolOutput::err(&call.id, e.to_string()),
                };
                if let Err(e) = tokio::fs::write(&full, text).await {
                    return ToolOutput::err(&call.id, e.to_string());
                }
                ToolOutput::ok(
                    &call.id,
                    format!("Added {cell_type} cell to {path} (now {total} cells)"),
                )
            }
            other => ToolOutput::err(&call.id, format!("Notebook command '{other}' not implemented")),
        }
    }
}
