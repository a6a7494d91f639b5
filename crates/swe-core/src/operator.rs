// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The human side of the loop.
//!
//! Every point where the agent waits for a person goes through [`Operator`]:
//! confirming a final answer, explaining what is still missing, choosing how
//! to recover from a failed pass, and steering a step the model flagged with
//! `ask_user_step`.  The console implementation reads stdin; tests script the
//! answers; sub-agents answer for themselves.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};

use crate::events::EventSink;

/// Answer to "Is the overall task complete?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAnswer {
    Yes,
    No,
    Continue,
}

impl CompletionAnswer {
    /// `y` confirms, `n` asks for feedback, anything else keeps going.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "y" => Self::Yes,
            "n" => Self::No,
            _ => Self::Continue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    Skip,
    Abort,
}

impl RecoveryAction {
    /// Menu numbers or words.  `delegate` and unknown input retry.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "3" | "skip" => Self::Skip,
            "4" | "abort" => Self::Abort,
            _ => Self::Retry,
        }
    }
}

/// What the model reported through `ask_user_step`.
#[derive(Debug, Clone, Default)]
pub struct GuidanceRequest {
    pub step_description: String,
    pub status: String,
    pub error_details: String,
    pub suggested_next_action: String,
    pub tools_available: usize,
    pub sub_agents_available: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guidance {
    pub choice: String,
    pub info: String,
}

impl Guidance {
    pub fn new(choice: impl Into<String>, info: impl Into<String>) -> Self {
        Self { choice: choice.into(), info: info.into() }
    }

    /// Text handed back to the model in place of the tool output.
    pub fn render(&self) -> String {
        format!(
            "User chose '{}' with agent context. Additional info: {}",
            self.choice, self.info
        )
    }
}

/// Context shown alongside a recovery prompt.
#[derive(Debug, Clone, Default)]
pub struct RecoveryContext {
    pub error: String,
    pub step: String,
    pub snapshot: String,
    pub tools: Vec<String>,
    pub sub_agents_available: usize,
}

#[async_trait]
pub trait Operator: Send + Sync {
    /// Show the candidate final answer and ask whether the task is done.
    async fn confirm_completion(&self, response: &str) -> CompletionAnswer;

    /// What still needs to be done after a `n` answer.
    async fn completion_feedback(&self) -> String;

    async fn recovery_choice(&self, ctx: &RecoveryContext) -> RecoveryAction;

    async fn guidance(&self, req: &GuidanceRequest) -> Guidance;
}

// ── Console ──────────────────────────────────────────────────────────────────

/// Reads answers from stdin, one line per question.
///
/// When given the event stream, every prompt first waits for the renderer to
/// print the events that led up to it.
pub struct ConsoleOperator {
    stdin: tokio::sync::Mutex<BufReader<Stdin>>,
    events: EventSink,
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self {
            stdin: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())),
            events: EventSink::none(),
        }
    }
}

impl ConsoleOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    async fn ask(&self, prompt: &str) -> String {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let mut stdin = self.stdin.lock().await;
        match stdin.read_line(&mut line).await {
            Ok(_) => line.trim().to_string(),
            Err(_) => String::new(),
        }
    }
}

/// Map a numbered menu answer to its word so that downstream keyword
/// matching (`skip`, `manual`, `delegate`) sees what the user meant.
fn guidance_word(status: &str, choice: &str) -> String {
    let word = if status == "failed" {
        match choice {
            "1" => "retry",
            "2" => "delegate",
            "3" => "research",
            "4" => "skip",
            "5" => "manual",
            other => other,
        }
    } else {
        match choice {
            "1" => "continue",
            "2" => "focus",
            "3" => "delegate",
            other => other,
        }
    };
    word.to_string()
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm_completion(&self, response: &str) -> CompletionAnswer {
        self.events.flush().await;
        println!("\n{response}");
        let raw = self.ask("\nIs the overall task complete? (y/n/continue) ").await;
        CompletionAnswer::parse(&raw)
    }

    async fn completion_feedback(&self) -> String {
        self.events.flush().await;
        self.ask("What still needs to be done? ").await
    }

    async fn recovery_choice(&self, ctx: &RecoveryContext) -> RecoveryAction {
        self.events.flush().await;
        println!("\nError during: {}", ctx.step);
        println!("{}", ctx.error);
        println!("Context:\n{}", ctx.snapshot);
        println!("Available tools: {}", ctx.tools.join(", "));
        println!("Sub-agents available: {}", ctx.sub_agents_available);
        println!("\nRecovery options:");
        println!("1. retry - Try again with full tool suite");
        println!("2. delegate - Retry and consider a sub-agent for the issue");
        println!("3. skip - Skip this step and continue");
        println!("4. abort - Save state and exit");
        let raw = self.ask("Recovery choice (1-4): ").await;
        RecoveryAction::parse(&raw)
    }

    async fn guidance(&self, req: &GuidanceRequest) -> Guidance {
        self.events.flush().await;
        println!("\nStep: {}", req.step_description);
        println!("Status: {}", req.status.to_uppercase());
        println!("Tools available: {}", req.tools_available);
        println!("Sub-agents available: {}", req.sub_agents_available);
        if !req.error_details.is_empty() {
            println!("Error: {}", req.error_details);
        }
        if !req.suggested_next_action.is_empty() {
            println!("Suggested: {}", req.suggested_next_action);
        }
        if req.status == "failed" {
            println!("\nHow should the agent handle this failure?");
            println!("1. retry - Use full tool suite to try again");
            println!("2. delegate - Spawn specialized sub-agent");
            println!("3. research - Use web tools to find solution");
            println!("4. skip - Mark as skipped and continue");
            println!("5. manual - I'll handle this manually");
        } else {
            println!("\nHow should the agent proceed?");
            println!("1. continue - Proceed with full capabilities");
            println!("2. focus - Focus on specific aspect");
            println!("3. delegate - Spawn sub-agent for next steps");
        }
        let raw = self.ask("Your guidance: ").await;
        let choice = guidance_word(&req.status, &raw);
        let info = match choice.as_str() {
            "delegate" | "focus" => self.ask("What should be the focus/delegation? ").await,
            "manual" => self.ask("What did you do manually? ").await,
            _ => String::new(),
        };
        Guidance { choice, info }
    }
}

// ── Scripted ─────────────────────────────────────────────────────────────────

/// Pre-recorded answers for tests.  Each queue is consumed front to back;
/// an exhausted queue falls back to `y`, empty feedback, `abort` and
/// `continue` respectively so a runaway script terminates.
#[derive(Default)]
pub struct ScriptedOperator {
    completions: Mutex<VecDeque<String>>,
    feedback: Mutex<VecDeque<String>>,
    recoveries: Mutex<VecDeque<String>>,
    guidance: Mutex<VecDeque<Guidance>>,
    /// Every guidance request seen, in order.
    pub guidance_requests: Mutex<Vec<GuidanceRequest>>,
    /// Every final answer presented for confirmation.
    pub presented: Mutex<Vec<String>>,
}

fn pop<T>(q: &Mutex<VecDeque<T>>) -> Option<T> {
    q.lock().ok().and_then(|mut q| q.pop_front())
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completions<I, S>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut q) = self.completions.lock() {
            q.extend(answers.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_feedback(self, text: impl Into<String>) -> Self {
        if let Ok(mut q) = self.feedback.lock() {
            q.push_back(text.into());
        }
        self
    }

    pub fn with_recoveries<I, S>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut q) = self.recoveries.lock() {
            q.extend(answers.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_guidance(self, choice: impl Into<String>, info: impl Into<String>) -> Self {
        if let Ok(mut q) = self.guidance.lock() {
            q.push_back(Guidance::new(choice, info));
        }
        self
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm_completion(&self, response: &str) -> CompletionAnswer {
        if let Ok(mut seen) = self.presented.lock() {
            seen.push(response.to_string());
        }
        CompletionAnswer::parse(&pop(&self.completions).unwrap_or_else(|| "y".into()))
    }

    async fn completion_feedback(&self) -> String {
        pop(&self.feedback).unwrap_or_default()
    }

    async fn recovery_choice(&self, _ctx: &RecoveryContext) -> RecoveryAction {
        RecoveryAction::parse(&pop(&self.recoveries).unwrap_or_else(|| "abort".into()))
    }

    async fn guidance(&self, req: &GuidanceRequest) -> Guidance {
        if let Ok(mut seen) = self.guidance_requests.lock() {
            seen.push(req.clone());
        }
        pop(&self.guidance).unwrap_or_else(|| Guidance::new("continue", ""))
    }
}

// ── Delegated ────────────────────────────────────────────────────────────────

/// Operator for sub-agents: nobody is watching, so the first final answer is
/// accepted, loop errors end the run and guidance requests continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelegatedOperator;

#[async_trait]
impl Operator for DelegatedOperator {
    async fn confirm_completion(&self, _response: &str) -> CompletionAnswer {
        CompletionAnswer::Yes
    }

    async fn completion_feedback(&self) -> String {
        String::new()
    }

    async fn recovery_choice(&self, _ctx: &RecoveryContext) -> RecoveryAction {
        RecoveryAction::Abort
    }

    async fn guidance(&self, _req: &GuidanceRequest) -> Guidance {
        Guidance::new("continue", "decide autonomously")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
