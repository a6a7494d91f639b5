// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use swe_config::{Config, Verbosity};

#[derive(Parser, Debug)]
#[command(
    name = "swe-agent",
    about = "Autonomous software engineering agent with persistent, resumable task state",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Task description; read interactively when omitted
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Resume the task saved under this id
    #[arg(long, value_name = "TASK_ID")]
    pub resume: Option<String>,

    /// Directory the agent works in
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Loop passes allowed before the run stops (resumable)
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Debug logging on stderr
    #[arg(long)]
    pub debug: bool,

    /// Do not write the progress report
    #[arg(long)]
    pub no_progress: bool,

    /// Disable the web namespace (web_fetch, web_search)
    #[arg(long)]
    pub no_web: bool,

    /// Disable the notebooks namespace
    #[arg(long)]
    pub no_notebooks: bool,

    /// Primary model, e.g. "gpt-4o"
    #[arg(long, short = 'M', env = "SWE_AGENT_MODEL")]
    pub model: Option<String>,

    /// Comma-separated model chain; the first is primary, the rest fallbacks
    #[arg(long, value_delimiter = ',', value_name = "A,B,...")]
    pub models: Vec<String>,

    /// API key for the model endpoint
    #[arg(long, env = "SWE_AGENT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Console output level
    #[arg(long, value_enum)]
    pub verbosity: Option<Verbosity>,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print the effective configuration and exit
    ShowConfig,
}

impl Cli {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply(&self, cfg: &mut Config) {
        if let Some(dir) = &self.working_dir {
            cfg.agent.working_dir = dir.display().to_string();
        }
        if let Some(n) = self.max_iterations {
            cfg.agent.max_iterations = n;
        }
        if self.debug {
            cfg.agent.debug_mode = true;
            cfg.agent.verbosity = Verbosity::Debug;
        }
        if let Some(v) = self.verbosity {
            cfg.agent.verbosity = v;
        }
        if self.no_progress {
            cfg.agent.progress_tracking = false;
        }
        if self.no_web {
            cfg.tools.enable_web = false;
        }
        if self.no_notebooks {
            cfg.tools.enable_notebooks = false;
        }
        if let Some((first, rest)) = self.models.split_first() {
            cfg.model.name = first.clone();
            cfg.model.fallbacks = rest.to_vec();
        }
        if let Some(m) = &self.model {
            cfg.model.name = m.clone();
        }
        if let Some(k) = &self.api_key {
            cfg.model.api_key = Some(k.clone());
        }
    }
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "swe-agent", &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("swe-agent").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "fix the build",
            "--max-iterations",
            "7",
            "--no-web",
            "--no-progress",
            "--models",
            "a,b,c",
            "--verbosity",
            "minimal",
        ]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cli.task.as_deref(), Some("fix the build"));
        assert_eq!(cfg.agent.max_iterations, 7);
        assert!(!cfg.tools.enable_web);
        assert!(cfg.tools.enable_notebooks);
        assert!(!cfg.agent.progress_tracking);
        assert_eq!(cfg.model.name, "a");
        assert_eq!(cfg.model.fallbacks, vec!["b", "c"]);
        assert_eq!(cfg.agent.verbosity, Verbosity::Minimal);
    }

    #[test]
    fn model_flag_wins_over_chain_head() {
        let cli = parse(&["--models", "a,b", "--model", "z"]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.model.name, "z");
        assert_eq!(cfg.model.fallbacks, vec!["b"]);
    }

    #[test]
    fn resume_and_subcommand_parse() {
        assert_eq!(parse(&["--resume", "ab12cd34"]).resume.as_deref(), Some("ab12cd34"));
        assert!(matches!(parse(&["show-config"]).command, Some(Commands::ShowConfig)));
    }
}
