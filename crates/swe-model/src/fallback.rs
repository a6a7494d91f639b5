// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{provider::ResponseStream, CompletionRequest, ModelProvider};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no models configured")]
    NoModels,
    #[error("All configured LLM models failed: {last}")]
    AllModelsFailed { last: String },
}

/// Tries each provider in order until one accepts the request.
///
/// The tool-calling mode is decided per attempt: a provider that cannot take
/// native tool definitions gets the catalog rendered into its prompt.
pub struct FallbackProvider {
    providers: Vec<Box<dyn ModelProvider>>,
}

impl FallbackProvider {
    pub fn new(providers: Vec<Box<dyn ModelProvider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl ModelProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.providers.first().map(|p| p.name()).unwrap_or("fallback")
    }

    fn model_name(&self) -> &str {
        self.providers.first().map(|p| p.model_name()).unwrap_or("none")
    }

    fn supports_function_calling(&self) -> bool {
        self.providers.iter().all(|p| p.supports_function_calling())
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let mut last: Option<anyhow::Error> = None;
        for provider in &self.providers {
            let mut attempt = req.clone();
            attempt.native_tools = req.native_tools && provider.supports_function_calling();
            match provider.complete(attempt).await {
                Ok(stream) => {
                    debug!(model = provider.model_name(), "model accepted request");
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(model = provider.model_name(), error = %e, "model call failed, trying next");
                    last = Some(e);
                }
            }
        }
        match last {
            Some(e) => Err(ModelError::AllModelsFailed { last: format!("{e:#}") }.into()),
            None => Err(ModelError::NoModels.into()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{FailingProvider, Message, ResponseEvent, ScriptedMockProvider};

    fn req() -> CompletionRequest {
        CompletionRequest { messages: vec![Message::user("hi")], ..Default::default() }
    }

    #[tokio::test]
    async fn first_healthy_provider_answers() {
        let p = FallbackProvider::new(vec![
            Box::new(FailingProvider::new("m1", "connection refused")),
            Box::new(ScriptedMockProvider::always_text("from m2")),
        ]);
        let mut stream = p.complete(req()).await.unwrap();
        let ev = stream.next().await.unwrap().unwrap();
        assert_eq!(ev, ResponseEvent::TextDelta("from m2".into()));
    }

    #[tokio::test]
    async fn all_failing_reports_last_error() {
        let p = FallbackProvider::new(vec![
            Box::new(FailingProvider::new("m1", "first boom")),
            Box::new(FailingProvider::new("m2", "second boom")),
        ]);
        let err = p.complete(req()).await.err().unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("All configured LLM models failed:"), "{msg}");
        assert!(msg.contains("second boom"), "{msg}");
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::AllModelsFailed { .. })
        ));
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let p = FallbackProvider::new(vec![]);
        assert!(p.is_empty());
        let err = p.complete(req()).await.err().unwrap();
        assert!(matches!(err.downcast_ref::<ModelError>(), Some(ModelError::NoModels)));
    }

    #[tokio::test]
    async fn native_tools_follow_each_provider() {
        let prompted = ScriptedMockProvider::always_text("ok").without_function_calling();
        let seen = prompted.last_request.clone();
        let p = FallbackProvider::new(vec![
            Box::new(FailingProvider::new("m1", "down")),
            Box::new(prompted),
        ]);
        assert!(!p.supports_function_calling());
        let _ = p.complete(req()).await.unwrap();
        let sent = seen.lock().unwrap().clone().unwrap();
        assert!(!sent.native_tools);
    }

    #[test]
    fn reports_primary_model_name() {
        let p = FallbackProvider::new(vec![
            Box::new(FailingProvider::new("primary", "x")),
            Box::new(FailingProvider::new("backup", "y")),
        ]);
        assert_eq!(p.model_name(), "primary");
        assert_eq!(p.len(), 2);
    }
}
