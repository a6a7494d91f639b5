// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` falls back to `false`, so fields that are
/// enabled unless switched off need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Working directory with `~` and environment variables expanded.
    pub fn working_dir(&self) -> PathBuf {
        let raw = self.agent.working_dir.as_str();
        match shellexpand::full(raw) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(raw),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Wire format.  Only `"openai"` (chat-completions, also spoken by
    /// LiteLLM and most proxies) and `"mock"` are understood.
    pub provider: String,
    /// Primary model name forwarded to the API
    pub name: String,
    /// Models tried in order when the primary one fails
    #[serde(default)]
    pub fallbacks: Vec<String>,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in checked-in files
    pub api_key: Option<String>,
    /// Base URL override for proxies and self-hosted endpoints
    pub base_url: Option<String>,
    /// Maximum tokens requested per completion
    pub max_tokens: Option<u32>,
    /// Maximum tokens requested for a conversation summary
    pub summary_max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
    /// Whether the endpoint accepts native tool definitions.  When false the
    /// tool catalog is rendered into the prompt instead.
    #[serde(default = "default_true")]
    pub function_calling: bool,
}

impl ModelConfig {
    /// Primary model followed by the fallbacks, duplicates removed.
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.name.clone()];
        for m in &self.fallbacks {
            if !chain.contains(m) {
                chain.push(m.clone());
            }
        }
        chain
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "claude-3-5-sonnet-20241022".into(),
            fallbacks: Vec::new(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4000),
            summary_max_tokens: Some(1500),
            temperature: Some(0.1),
            function_calling: true,
        }
    }
}

/// How much the console renderer prints.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Minimal,
    #[default]
    Standard,
    Verbose,
    Debug,
}

impl std::fmt::Display for Verbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verbosity::Minimal => write!(f, "minimal"),
            Verbosity::Standard => write!(f, "standard"),
            Verbosity::Verbose => write!(f, "verbose"),
            Verbosity::Debug => write!(f, "debug"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Directory the tools operate in; `~` is expanded
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Loop passes allowed before the run stops with resume possible
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub verbosity: Verbosity,
    /// State file name, relative to the working directory
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Progress report name, relative to the working directory
    #[serde(default = "default_progress_file")]
    pub progress_file: String,
    /// Messages kept verbatim after a compaction
    #[serde(default = "default_context_retention")]
    pub context_retention: usize,
    /// Compaction runs every N iterations
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: u32,
    #[serde(default = "default_true")]
    pub progress_tracking: bool,
    /// Concurrent sub-agents allowed per orchestrator
    #[serde(default = "default_max_sub_agents")]
    pub max_sub_agents: usize,
    #[serde(default = "default_sub_agent_max_iterations")]
    pub sub_agent_max_iterations: u32,
    /// System prompt override; leave None to use the built-in prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_working_dir() -> String {
    ".".into()
}
fn default_max_iterations() -> u32 {
    50
}
fn default_state_file() -> String {
    ".swe_agent_state.json".into()
}
fn default_progress_file() -> String {
    "progress.md".into()
}
fn default_context_retention() -> usize {
    8
}
fn default_summarization_threshold() -> u32 {
    12
}
fn default_max_sub_agents() -> usize {
    3
}
fn default_sub_agent_max_iterations() -> u32 {
    8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            max_iterations: default_max_iterations(),
            debug_mode: false,
            verbosity: Verbosity::Standard,
            state_file: default_state_file(),
            progress_file: default_progress_file(),
            context_retention: default_context_retention(),
            summarization_threshold: default_summarization_threshold(),
            progress_tracking: true,
            max_sub_agents: default_max_sub_agents(),
            sub_agent_max_iterations: default_sub_agent_max_iterations(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Register the `web` namespace (web_fetch, web_search)
    #[serde(default = "default_true")]
    pub enable_web: bool,
    /// Register the `notebooks` namespace (notebook_edit)
    #[serde(default = "default_true")]
    pub enable_notebooks: bool,
    /// Base timeout for bash commands before per-class scaling
    #[serde(default = "default_bash_timeout_secs")]
    pub bash_timeout_secs: u64,
    /// Discovery order; later namespaces win on name collisions
    #[serde(default = "default_namespaces")]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub web: WebConfig,
}

fn default_bash_timeout_secs() -> u64 {
    30
}
fn default_namespaces() -> Vec<String> {
    vec!["core".into(), "web".into(), "notebooks".into()]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_web: true,
            enable_notebooks: true,
            bash_timeout_secs: default_bash_timeout_secs(),
            namespaces: default_namespaces(),
            web: WebConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Brave Search API key (also checked via BRAVE_API_KEY env var)
    pub search_api_key: Option<String>,
    /// Characters of page text kept by web_fetch
    pub fetch_max_chars: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search_api_key: None,
            fetch_max_chars: 8_000,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ─────────────────────────────────────────────────────────────

    #[test]
    fn config_default_model_is_claude_sonnet() {
        let c = Config::default();
        assert_eq!(c.model.name, "claude-3-5-sonnet-20241022");
        assert_eq!(c.model.provider, "openai");
        assert!(c.model.function_calling);
    }

    #[test]
    fn config_default_agent_limits() {
        let c = Config::default();
        assert_eq!(c.agent.max_iterations, 50);
        assert_eq!(c.agent.context_retention, 8);
        assert_eq!(c.agent.summarization_threshold, 12);
        assert_eq!(c.agent.max_sub_agents, 3);
        assert_eq!(c.agent.sub_agent_max_iterations, 8);
    }

    #[test]
    fn config_default_files() {
        let c = Config::default();
        assert_eq!(c.agent.state_file, ".swe_agent_state.json");
        assert_eq!(c.agent.progress_file, "progress.md");
        assert!(c.agent.progress_tracking);
    }

    #[test]
    fn config_default_tools_enable_all_namespaces() {
        let c = Config::default();
        assert!(c.tools.enable_web);
        assert!(c.tools.enable_notebooks);
        assert_eq!(c.tools.namespaces, vec!["core", "web", "notebooks"]);
        assert_eq!(c.tools.bash_timeout_secs, 30);
    }

    #[test]
    fn verbosity_orders_from_minimal_to_debug() {
        assert!(Verbosity::Minimal < Verbosity::Standard);
        assert!(Verbosity::Verbose < Verbosity::Debug);
        assert_eq!(Verbosity::default().to_string(), "standard");
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    #[test]
    fn model_chain_puts_primary_first_and_dedups() {
        let mut c = Config::default();
        c.model.name = "a".into();
        c.model.fallbacks = vec!["b".into(), "a".into(), "c".into(), "b".into()];
        assert_eq!(c.model.chain(), vec!["a", "b", "c"]);
    }

    #[test]
    fn working_dir_expands_home() {
        let mut c = Config::default();
        c.agent.working_dir = "~/proj".into();
        let wd = c.working_dir();
        assert!(!wd.to_string_lossy().starts_with('~'));
        assert!(wd.ends_with("proj"));
    }

    // ── Serde ────────────────────────────────────────────────────────────────

    #[test]
    fn partial_toml_fills_in_defaults() {
        let c: Config = toml::from_str("[agent]\nmax_iterations = 7\n").unwrap();
        assert_eq!(c.agent.max_iterations, 7);
        assert_eq!(c.agent.summarization_threshold, 12);
        assert!(c.tools.enable_web);
    }

    #[test]
    fn disabled_flags_survive_toml() {
        let c: Config =
            toml::from_str("[tools]\nenable_web = false\n[agent]\nprogress_tracking = false\n")
                .unwrap();
        assert!(!c.tools.enable_web);
        assert!(c.tools.enable_notebooks);
        assert!(!c.agent.progress_tracking);
    }

    #[test]
    fn model_table_with_only_fallbacks_keeps_default_name() {
        let c: Config = toml::from_str("[model]\nfallbacks = [\"gpt-4o\"]\n").unwrap();
        assert_eq!(c.model.chain(), vec!["claude-3-5-sonnet-20241022", "gpt-4o"]);
    }

    #[test]
    fn verbosity_parses_lowercase() {
        let c: Config = toml::from_str("[agent]\nverbosity = \"verbose\"\n").unwrap();
        assert_eq!(c.agent.verbosity, Verbosity::Verbose);
    }

    #[test]
    fn config_serialises_to_valid_yaml() {
        let c = Config::default();
        let yaml_str = serde_yaml::to_string(&c).unwrap();
        assert!(yaml_str.contains("claude-3-5-sonnet-20241022"));
        let back: Config = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(back.agent.state_file, c.agent.state_file);
    }
}
