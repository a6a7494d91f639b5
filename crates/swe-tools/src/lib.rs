mod registry;
mod tool;
pub mod builtin;

pub use registry::{PluginEntry, ToolFactory, ToolRegistry, ToolSchema};
pub use tool::{Tool, ToolCall, ToolContext, ToolOutput};
pub use builtin::{catalog, enabled_namespaces};
pub use builtin::bash::{classify_command, effective_timeout};
