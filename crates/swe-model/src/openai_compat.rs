// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible chat completion driver.
//!
//! Speaks the `/chat/completions` SSE wire format used by OpenAI, LiteLLM
//! proxies, vLLM, Ollama and most hosted gateways.  Every configured model
//! name becomes one instance of this driver inside a
//! [`FallbackProvider`](crate::FallbackProvider).

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    prompted::render_tool_catalog, provider::ResponseStream, CompletionRequest, Message,
    MessageContent, ResponseEvent, Role,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completion provider.
pub struct OpenAiCompatProvider {
    /// Model id forwarded to the API.
    model: String,
    /// API key (pre-resolved from config or env).  `None` sends no auth
    /// header, which suits local servers.
    api_key: Option<String>,
    /// Full chat completions URL.
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    function_calling: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// # Parameters
    /// - `base_url` — API base that ends before `/chat/completions`
    /// - `max_tokens` — `None` defaults to 4000
    /// - `temperature` — `None` defaults to 0.1
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        function_calling: bool,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens: max_tokens.unwrap_or(4000),
            temperature: temperature.unwrap_or(0.1),
            function_calling,
            client: reqwest::Client::new(),
        }
    }

    pub(crate) fn request_body(&self, req: &CompletionRequest) -> Value {
        let mut messages = req.messages.clone();
        if !req.native_tools && !req.tools.is_empty() {
            embed_catalog(&mut messages, &render_tool_catalog(&req.tools));
        }
        let wire = build_openai_messages(&messages);

        let mut body = json!({
            "model": self.model,
            "messages": wire,
            "stream": true,
            "max_tokens": req.max_tokens.unwrap_or(self.max_tokens),
            "temperature": self.temperature,
            "stream_options": { "include_usage": true },
        });
        if req.native_tools && !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// Append the rendered catalog to the leading system message, or insert one.
fn embed_catalog(messages: &mut Vec<Message>, catalog: &str) {
    if let Some(first) = messages.first_mut() {
        if first.role == Role::System {
            if let MessageContent::Text(t) = &first.content {
                first.content = MessageContent::Text(format!("{t}\n\n{catalog}"));
                return;
            }
        }
    }
    messages.insert(0, Message::system(catalog));
}

#[async_trait]
impl crate::ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_function_calling(&self) -> bool {
        self.function_calling
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let body = self.request_body(&req);

        debug!(
            model = %self.model,
            tool_count = req.tools.len(),
            native_tools = req.native_tools,
            message_count = req.messages.len(),
            "sending completion request"
        );
        tracing::trace!(request_body = ?body, "full completion request");

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            http_req = http_req.bearer_auth(key);
        }

        let resp = http_req
            .send()
            .await
            .with_context(|| format!("{} request failed", self.model))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("{} error {status}: {text}", self.model);
        }

        // SSE events can be split across TCP packets; keep a line buffer
        // across chunks and emit events only for complete lines.
        let event_stream = resp
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let events: Vec<anyhow::Result<ResponseEvent>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Parse a single complete SSE `data:` line into a [`ResponseEvent`].
///
/// Returns `None` for empty lines, comment lines, or unparseable data.
fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<ResponseEvent>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(parse_sse_chunk(&v))
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// A trailing incomplete line stays in `buf` to be extended by the next chunk.
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<ResponseEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        buf.drain(..=nl_pos);
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn parse_sse_chunk(v: &Value) -> anyhow::Result<ResponseEvent> {
    if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
        let msg = err["message"].as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Ok(ResponseEvent::Error(msg));
    }

    // Usage-only chunk (emitted when stream_options.include_usage = true)
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        return Ok(ResponseEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });
    }

    let delta = &v["choices"][0]["delta"];

    // Each SSE chunk carries one tool-call delta in practice; the index routes
    // accumulation in the agent.
    if let Some(tc) = delta.get("tool_calls").and_then(|t| t.get(0)) {
        let index = tc["index"].as_u64().unwrap_or(0) as u32;
        let id = tc["id"].as_str().unwrap_or("").to_string();
        let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
        let args = tc["function"]["arguments"].as_str().unwrap_or("").to_string();
        return Ok(ResponseEvent::ToolCall { index, id, name, arguments: args });
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        return Ok(ResponseEvent::TextDelta(text.to_string()));
    }

    Ok(ResponseEvent::TextDelta(String::new()))
}

/// Convert a slice of [`Message`]s into the OpenAI wire-format JSON array.
///
/// OpenAI requires all tool calls of one assistant turn inside a single
/// assistant message, so consecutive `ToolCall` messages are merged, together
/// with an immediately preceding assistant text message.
pub(crate) fn build_openai_messages(messages: &[Message]) -> Vec<Value> {
    fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
        json!({
            "id": tool_call_id,
            "type": "function",
            "function": {
                "name": function.name,
                "arguments": function.arguments,
            }
        })
    }

    let mut result: Vec<Value> = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let m = &messages[i];

        if let MessageContent::ToolCall { .. } = &m.content {
            let mut calls = Vec::new();
            while let Some(MessageContent::ToolCall { tool_call_id, function }) =
                messages.get(i).map(|m| &m.content)
            {
                calls.push(tool_call_to_json(tool_call_id, function));
                i += 1;
            }
            let preamble = match result.last() {
                Some(prev)
                    if prev["role"] == "assistant" && prev.get("tool_calls").is_none() =>
                {
                    result.pop().map(|p| p["content"].clone())
                }
                _ => None,
            };
            result.push(json!({
                "role": "assistant",
                "content": preamble.unwrap_or(Value::Null),
                "tool_calls": calls,
            }));
            continue;
        }

        let v = match &m.content {
            MessageContent::Text(t) => json!({
                "role": role_str(m.role),
                "content": t,
            }),
            MessageContent::ToolResult { tool_call_id, content } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
            MessageContent::ToolCall { .. } => unreachable!("handled above"),
        };
        result.push(v);
        i += 1;
    }

    result
}
