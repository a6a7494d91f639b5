use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use swe_state::{ProgressReport, TaskState};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
///
/// Exactly one of `output` / `error` is meaningful, selected by `success`.
/// `data` carries tool-specific structured fields (e.g. `returncode` for
/// bash) that are kept out of the model-facing text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub call_id: String,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub data: Map<String, Value>,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: Some(output.into()),
            error: None,
            data: Map::new(),
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: None,
            error: Some(msg.into()),
            data: Map::new(),
        }
    }

    /// Attach a structured field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        !self.success
    }

    /// Text sent back to the model as the tool-role message.
    pub fn content(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("Unknown error")
            )
        }
    }
}

/// Mutable view of the running task handed to every tool invocation.
///
/// Tools that track files, record summaries or spawn sub-agents do so
/// through this context instead of reaching back into the loop.
pub struct ToolContext<'a> {
    pub state: &'a mut TaskState,
    pub working_dir: &'a Path,
    /// Present when progress tracking is on
    pub progress: Option<&'a ProgressReport>,
    /// Sub-agent nesting level; 0 for the top-level loop
    pub depth: usize,
}

impl<'a> ToolContext<'a> {
    pub fn new(state: &'a mut TaskState, working_dir: &'a Path) -> Self {
        Self { state, working_dir, progress: None, depth: 0 }
    }

    /// Resolve a tool-supplied path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }
}

/// Trait that every built-in and plugin capability implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Errors are returned as [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_on_success_is_output() {
        let o = ToolOutput::ok("1", "done");
        assert_eq!(o.content(), "done");
        assert!(!o.is_error());
    }

    #[test]
    fn content_on_failure_is_prefixed() {
        let o = ToolOutput::err("1", "boom");
        assert_eq!(o.content(), "Error: boom");
        assert!(o.is_error());
    }

    #[test]
    fn with_field_populates_data() {
        let o = ToolOutput::ok("1", "x").with_field("returncode", 0);
        assert_eq!(o.data["returncode"], 0);
    }

    #[test]
    fn resolve_keeps_absolute_and_joins_relative() {
        let mut s = TaskState::new("t");
        let ctx = ToolContext::new(&mut s, Path::new("/work"));
        assert_eq!(ctx.resolve("a/b.txt"), PathBuf::from("/work/a/b.txt"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
