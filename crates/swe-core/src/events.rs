// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use swe_tools::ToolCall;

/// Events emitted by the agent while it works on a task.
/// The console renderer subscribes to these to drive its output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A task was started or resumed
    TaskStarted { task_id: String, task: String, resumed: bool },
    /// A loop pass is about to call the model
    IterationStarted { iteration: u32, max_iterations: u32 },
    /// Free-form status line (compaction, resume fallback, ...)
    Status(String),
    /// The full text of one model turn
    TextComplete(String),
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Conversation was summarised and compacted
    ContextCompacted {
        summary_id: String,
        messages_before: usize,
        messages_after: usize,
    },
    /// The task state was written to disk
    StateSaved { iteration: u32 },
    /// A loop pass failed and entered recovery
    Error(String),
    /// The loop reached a terminal state
    Finished { success: bool, iterations: u32 },
    /// Barrier: the consumer signals it once every earlier event is handled
    Flush(Arc<Notify>),
}

/// An [`AgentEvent`] tagged with the nesting level of the agent that sent it.
#[derive(Debug, Clone)]
pub struct ScopedEvent {
    pub depth: usize,
    pub event: AgentEvent,
}

/// Sending half of the event stream.  Sub-agents get a copy one level deeper.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ScopedEvent>>,
    depth: usize,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ScopedEvent>) -> Self {
        Self { tx: Some(tx), depth: 0 }
    }

    /// A sink that drops everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Same stream, tagged for an agent at `depth`.
    pub fn at_depth(&self, depth: usize) -> Self {
        Self { tx: self.tx.clone(), depth }
    }

    pub async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is watching.
            let _ = tx.send(ScopedEvent { depth: self.depth, event }).await;
        }
    }

    /// Wait until the consumer has handled everything emitted so far.
    /// Gives up after [`FLUSH_TIMEOUT`] so a consumer that ignores
    /// [`AgentEvent::Flush`] cannot stall the caller.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let ack = Arc::new(Notify::new());
        let event = ScopedEvent { depth: self.depth, event: AgentEvent::Flush(ack.clone()) };
        if tx.send(event).await.is_err() {
            return;
        }
        let _ = tokio::time::timeout(FLUSH_TIMEOUT, ack.notified()).await;
    }
}

pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

// ─── Unit tests ──────────────────────────────────────────────────────────────
