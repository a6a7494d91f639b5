// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tool calling for endpoints without native function definitions.
//!
//! The catalog is rendered into the prompt and the model is asked to answer
//! with `<tool_call>{"name": ..., "arguments": {...}}</tool_call>` blocks,
//! which are parsed back into [`FunctionCall`]s once the turn is complete.

use serde_json::Value;

use crate::{FunctionCall, ToolSchema};

const OPEN: &str = "<tool_call>";
const CLOSE: &str = "</tool_call>";

/// Render the tool catalog as prompt text.
pub fn render_tool_catalog(tools: &[ToolSchema]) -> String {
    let mut out = String::from(
        "You can call the following tools. To call one, reply with a block of the form\n\
         <tool_call>{\"name\": \"<tool>\", \"arguments\": {...}}</tool_call>\n\
         You may emit several blocks in one reply. Reply without any block when the task is done.\n\n\
         Available tools:\n",
    );
    for t in tools {
        out.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            t.name, t.description, t.parameters
        ));
    }
    out
}

/// Split assistant text into its prose and the tool calls embedded in it.
///
/// Blocks whose JSON does not parse or lacks a `name` stay in the prose.
pub fn parse_prompted_tool_calls(text: &str) -> (String, Vec<FunctionCall>) {
    let mut calls = Vec::new();
    let mut prose = String::new();
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let consumed = start + OPEN.len() + end + CLOSE.len();
        match parse_block(after_open[..end].trim()) {
            Some(call) => {
                prose.push_str(&rest[..start]);
                calls.push(call);
            }
            None => prose.push_str(&rest[..consumed]),
        }
        rest = &rest[consumed..];
    }
    prose.push_str(rest);
    (prose.trim().to_string(), calls)
}

fn parse_block(body: &str) -> Option<FunctionCall> {
    let v: Value = serde_json::from_str(body).ok()?;
    let name = v.get("name")?.as_str()?.to_string();
    let args = v
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(FunctionCall { name, arguments: args.to_string() })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
