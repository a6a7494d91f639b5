mod types;
mod provider;
mod openai_compat;
mod fallback;
mod prompted;
mod mock;

pub use types::*;
pub use provider::{ModelProvider, ResponseStream};
pub use openai_compat::{OpenAiCompatProvider, DEFAULT_BASE_URL};
pub use fallback::{FallbackProvider, ModelError};
pub use prompted::{parse_prompted_tool_calls, render_tool_catalog};
pub use mock::{text_turn, tool_turn, FailingProvider, MockProvider, ScriptedMockProvider};

use anyhow::bail;
use swe_config::ModelConfig;

/// Construct a boxed [`ModelProvider`] from configuration.
///
/// Provider selection:
/// - `"openai"` → a [`FallbackProvider`] with one [`OpenAiCompatProvider`]
///   per model in [`ModelConfig::chain`]
/// - `"mock"` → [`MockProvider`] (echo-back)
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    match cfg.provider.as_str() {
        "openai" => {
            let key = resolve_api_key(cfg);
            let base = cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
            let chain: Vec<Box<dyn ModelProvider>> = cfg
                .chain()
                .into_iter()
                .map(|model| {
                    Box::new(OpenAiCompatProvider::new(
                        model,
                        key.clone(),
                        base,
                        cfg.max_tokens,
                        cfg.temperature,
                        cfg.function_calling,
                    )) as Box<dyn ModelProvider>
                })
                .collect();
            Ok(Box::new(FallbackProvider::new(chain)))
        }
        "mock" => Ok(Box::new(MockProvider)),
        other => bail!("unknown model provider: {other}"),
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    std::env::var("OPENAI_API_KEY").ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
