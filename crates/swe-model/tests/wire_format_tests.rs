// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire-format tests: spin up a minimal HTTP/1.1 mock server, point the
//! driver at it, issue a `CompletionRequest`, and assert both the HTTP
//! request the driver sent and the `ResponseEvent`s it emitted.
//!
//! These tests run without API keys and without external network access.

use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use swe_config::ModelConfig;
use swe_model::{from_config, CompletionRequest, Message, ResponseEvent, ToolSchema};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

// ── Minimal HTTP/1.1 mock server ──────────────────────────────────────────────

#[derive(Debug)]
struct CapturedRequest {
    path: String,
    headers: HashMap<String, String>,
    body: Value,
}

/// Bind a mock server on a random loopback port that answers one request per
/// entry in `responses`, in order.  Every captured request is sent on the
/// returned channel.
async fn mock_server(
    responses: Vec<(u16, &'static str, String)>,
) -> (u16, tokio::sync::mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<CapturedRequest>();

    tokio::spawn(async move {
        for (status, content_type, resp_body) in responses {
            let (stream, _) = listener.accept().await.expect("accept");
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).await.unwrap();
            let path = request_line.split(' ').nth(1).unwrap_or("").to_string();

            let mut headers: HashMap<String, String> = HashMap::new();
            let mut content_length: usize = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    break;
                }
                if let Some((k, v)) = trimmed.split_once(": ") {
                    let key = k.to_lowercase();
                    if key == "content-length" {
                        content_length = v.parse().unwrap_or(0);
                    }
                    headers.insert(key, v.to_string());
                }
            }

            let mut body_bytes = vec![0u8; content_length];
            reader.read_exact(&mut body_bytes).await.unwrap();
            let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
            let _ = tx.send(CapturedRequest { path, headers, body });

            let http_resp = format!(
                "HTTP/1.1 {status} OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                resp_body.len(),
                resp_body,
            );
            let _ = write_half.write_all(http_resp.as_bytes()).await;
        }
    });

    (port, rx)
}

/// Build an SSE response body from `data:` payloads, ending with `[DONE]`.
fn sse_body(events: &[&str]) -> String {
    let mut s = events.iter().map(|e| format!("data: {e}\n\n")).collect::<String>();
    s.push_str("data: [DONE]\n\n");
    s
}

fn cfg(port: u16) -> ModelConfig {
    ModelConfig {
        provider: "openai".into(),
        name: "claude-3-5-sonnet-20241022".into(),
        api_key: Some("sk-test".into()),
        base_url: Some(format!("http://127.0.0.1:{port}/v1")),
        max_tokens: Some(32),
        temperature: Some(0.5),
        ..ModelConfig::default()
    }
}

fn bash_schema() -> ToolSchema {
    ToolSchema {
        name: "bash".into(),
        description: "runs shell commands".into(),
        parameters: serde_json::json!({"type":"object"}),
    }
}

async fn collect(mut stream: swe_model::ResponseStream) -> Vec<ResponseEvent> {
    let mut events = Vec::new();
    while let Some(ev) = stream.next().await {
        let ev = ev.unwrap();
        let done = ev == ResponseEvent::Done;
        events.push(ev);
        if done {
            break;
        }
    }
    events
}

// ── Request body ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_correct_request_body_and_bearer_auth() {
    let sse = sse_body(&[r#"{"choices":[{"delta":{"content":"hi"}}]}"#]);
    let (port, mut rx) = mock_server(vec![(200, "text/event-stream", sse)]).await;

    let provider = from_config(&cfg(port)).unwrap();
    let stream = provider
        .complete(CompletionRequest {
            messages: vec![Message::system("be brief"), Message::user("hello")],
            tools: vec![bash_schema()],
            ..Default::default()
        })
        .await
        .unwrap();
    collect(stream).await;

    let req = rx.recv().await.unwrap();
    assert_eq!(req.path, "/v1/chat/completions");
    assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer sk-test"));
    assert_eq!(req.body["model"], "claude-3-5-sonnet-20241022");
    assert_eq!(req.body["max_tokens"], 32);
    assert_eq!(req.body["stream"], true);
    assert_eq!(req.body["tools"][0]["function"]["name"], "bash");
    let msgs = req.body["messages"].as_array().expect("messages array");
    assert_eq!(msgs.len(), 2, "system + user");
    assert_eq!(msgs[0]["role"], "system");
}

#[tokio::test]
async fn prompted_tool_mode_omits_tools_field() {
    let sse = sse_body(&[r#"{"choices":[{"delta":{"content":"ok"}}]}"#]);
    let (port, mut rx) = mock_server(vec![(200, "text/event-stream", sse)]).await;

    let mut c = cfg(port);
    c.function_calling = false;
    let provider = from_config(&c).unwrap();
    assert!(!provider.supports_function_calling());
    let stream = provider
        .complete(CompletionRequest {
            messages: vec![Message::system("sys"), Message::user("hello")],
            tools: vec![bash_schema()],
            ..Default::default()
        })
        .await
        .unwrap();
    collect(stream).await;

    let req = rx.recv().await.unwrap();
    assert!(req.body.get("tools").is_none());
    let sys = req.body["messages"][0]["content"].as_str().unwrap();
    assert!(sys.contains("- bash: runs shell commands"));
}

// ── SSE event parsing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn text_usage_and_tool_call_events_collected() {
    let sse = sse_body(&[
        r#"{"choices":[{"delta":{"content":"hel"}}]}"#,
        r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"bash","arguments":""}}]}}]}"#,
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"command\":\"ls\"}"}}]}}]}"#,
        r#"{"usage":{"prompt_tokens":10,"completion_tokens":5}}"#,
    ]);
    let (port, _rx) = mock_server(vec![(200, "text/event-stream", sse)]).await;

    let provider = from_config(&cfg(port)).unwrap();
    let stream = provider
        .complete(CompletionRequest { messages: vec![Message::user("go")], ..Default::default() })
        .await
        .unwrap();
    let events = collect(stream).await;

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::TextDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "hello");
    assert!(events.iter().any(|e| matches!(e, ResponseEvent::ToolCall { id, name, .. }
        if id == "call_1" && name == "bash")));
    assert!(events.contains(&ResponseEvent::Usage { input_tokens: 10, output_tokens: 5 }));
    assert_eq!(events.last(), Some(&ResponseEvent::Done));
}

// ── Fallback across models ────────────────────────────────────────────────────

#[tokio::test]
async fn failing_primary_falls_back_to_next_model() {
    let sse = sse_body(&[r#"{"choices":[{"delta":{"content":"from backup"}}]}"#]);
    let (port, mut rx) = mock_server(vec![
        (500, "application/json", r#"{"error":{"message":"overloaded"}}"#.to_string()),
        (200, "text/event-stream", sse),
    ])
    .await;

    let mut c = cfg(port);
    c.fallbacks = vec!["gpt-4o".into()];
    let provider = from_config(&c).unwrap();
    let stream = provider
        .complete(CompletionRequest { messages: vec![Message::user("hi")], ..Default::default() })
        .await
        .unwrap();
    let events = collect(stream).await;
    assert!(events.contains(&ResponseEvent::TextDelta("from backup".into())));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.body["model"], "claude-3-5-sonnet-20241022");
    assert_eq!(second.body["model"], "gpt-4o");
}

#[tokio::test]
async fn every_model_failing_yields_aggregate_error() {
    let (port, _rx) = mock_server(vec![
        (401, "application/json", r#"{"error":{"message":"Unauthorized"}}"#.to_string()),
    ])
    .await;

    let provider = from_config(&cfg(port)).unwrap();
    let result = provider
        .complete(CompletionRequest { messages: vec![Message::user("hi")], ..Default::default() })
        .await;

    let msg = result.err().unwrap().to_string();
    assert!(msg.starts_with("All configured LLM models failed:"), "got: {msg}");
    assert!(msg.contains("401"), "error should include status 401, got: {msg}");
}
