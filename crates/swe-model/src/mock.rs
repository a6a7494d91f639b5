// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::ResponseStream, CompletionRequest, ResponseEvent};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage { input_tokens: 10, output_tokens: 10 }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response script from the front of the queue, so tests can specify exact
/// event sequences (tool calls included) without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<VecDeque<Vec<ResponseEvent>>>>,
    function_calling: bool,
    /// The last `CompletionRequest` seen by this provider.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// Every request seen, in order.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is the
    /// sequence of [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            function_calling: true,
            last_request: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Declare that this endpoint needs the tool catalog in the prompt.
    pub fn without_function_calling(mut self) -> Self {
        self.function_calling = false;
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![text_turn(reply)])
    }

    /// Convenience: provider that returns a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            tool_turn(tool_id, tool_name, args_json),
            text_turn(final_text),
        ])
    }

    /// Number of scripts not yet consumed.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// One model turn that answers with plain text.
pub fn text_turn(reply: impl Into<String>) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::TextDelta(reply.into()),
        ResponseEvent::Usage { input_tokens: 5, output_tokens: 5 },
        ResponseEvent::Done,
    ]
}

/// One model turn that requests a single tool call.
pub fn tool_turn(
    id: impl Into<String>,
    name: impl Into<String>,
    args_json: impl Into<String>,
) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::ToolCall {
            index: 0,
            id: id.into(),
            name: name.into(),
            arguments: args_json.into(),
        },
        ResponseEvent::Done,
    ]
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    fn supports_function_calling(&self) -> bool {
        self.function_calling
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        if let Ok(mut all) = self.requests.lock() {
            all.push(req.clone());
        }
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(req);
        }
        let next = self.scripts.lock().ok().and_then(|mut s| s.pop_front());
        let events = next.unwrap_or_else(|| {
            vec![ResponseEvent::TextDelta("[no more scripts]".into()), ResponseEvent::Done]
        });
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

/// Provider whose every call fails before streaming.  Used to exercise
/// fallback and error recovery.
pub struct FailingProvider {
    model: String,
    error: String,
}

impl FailingProvider {
    pub fn new(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self { model: model.into(), error: error.into() }
    }
}

#[async_trait]
impl crate::ModelProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing-mock"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        anyhow::bail!("{}: {}", self.model, self.error)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{CompletionRequest, Message, ModelProvider, ResponseEvent};

    fn empty_req() -> CompletionRequest {
        CompletionRequest { messages: vec![Message::user("hi")], ..Default::default() }
    }

    async fn drain(p: &dyn ModelProvider) -> Vec<ResponseEvent> {
        let mut events = Vec::new();
        let mut stream = p.complete(empty_req()).await.unwrap();
        while let Some(ev) = stream.next().await {
            events.push(ev.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message_and_ends_with_done() {
        let events = drain(&MockProvider).await;
        assert!(matches!(&events[0], ResponseEvent::TextDelta(t) if t.contains("MOCK: hi")));
        assert!(matches!(events.last(), Some(ResponseEvent::Done)));
    }

    #[tokio::test]
    async fn scripted_tool_then_text_two_rounds() {
        let p = ScriptedMockProvider::tool_then_text("call-1", "bash", r#"{"command":"ls"}"#, "done");
        assert_eq!(p.remaining(), 2);

        let round1 = drain(&p).await;
        assert!(round1
            .iter()
            .any(|e| matches!(e, ResponseEvent::ToolCall { name, .. } if name == "bash")));

        let round2 = drain(&p).await;
        assert!(round2.iter().any(|e| matches!(e, ResponseEvent::TextDelta(t) if t == "done")));
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scripted_fallback_when_scripts_exhausted() {
        let p = ScriptedMockProvider::new(vec![]);
        let events = drain(&p).await;
        assert!(matches!(&events[0], ResponseEvent::TextDelta(t) if t.contains("no more scripts")));
    }

    #[tokio::test]
    async fn failing_provider_names_its_model() {
        let p = FailingProvider::new("m-x", "unreachable");
        let err = p.complete(empty_req()).await.err().unwrap();
        assert_eq!(err.to_string(), "m-x: unreachable");
    }
}
