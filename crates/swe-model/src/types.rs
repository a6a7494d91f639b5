use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in the conversation history.
///
/// Each tool call requested by the assistant is stored as its own message;
/// drivers coalesce consecutive calls into one wire-level assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::ToolCall {
                tool_call_id: id.into(),
                function: FunctionCall { name: name.into(), arguments: arguments.into() },
            },
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
            },
        }
    }

    /// Plain text of a text message.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Best-effort textual rendering used for summaries and logs.
    pub fn render(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::ToolCall { function, .. } => {
                format!("[tool call {}({})]", function.name, function.arguments)
            }
            MessageContent::ToolResult { content, .. } => content.clone(),
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.content, MessageContent::ToolCall { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self.content, MessageContent::ToolResult { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The content of a message.
///
/// - `Text` – simple string
/// - `ToolCall` – the assistant requests a tool invocation
/// - `ToolResult` – the result of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall {
        tool_call_id: String,
        function: FunctionCall,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    /// Per-request output cap; `None` uses the provider default
    pub max_tokens: Option<u32>,
    /// Send `tools` as native function definitions.  When false the driver
    /// renders the catalog into the prompt instead.
    pub native_tools: bool,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self { messages: Vec::new(), tools: Vec::new(), max_tokens: None, native_tools: true }
    }
}

/// A single streamed event from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// A text delta streamed from the model
    TextDelta(String),
    /// A tool-call delta.  `index` routes accumulation when the model issues
    /// several calls in one turn; `id` and `name` arrive on the first delta.
    ToolCall {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    /// Final usage statistics
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// The stream finished normally
    Done,
    /// A recoverable error reported inside the stream
    Error(String),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
