use async_trait::async_trait;
use serde_json::{json, Value};
use swe_state::detect_language;
use tracing::debug;
use walkdir::WalkDir;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

pub struct ListDirectoryTool;

struct Item {
    name: String,
    is_dir: bool,
    size: u64,
    language: Option<&'static str>,
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List a directory: directories first, then files, with sizes and detected language."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (default: working directory)" },
                "show_hidden": { "type": "boolean", "description": "Include dot-files (default false)" },
                "recursive": { "type": "boolean", "description": "Descend into subdirectories (default false)" }
            }
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> ToolOutput {
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let show_hidden = call.args.get("show_hidden").and_then(|v| v.as_bool()).unwrap_or(false);
        let recursive = call.args.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false);
        let root = ctx.resolve(path);

        debug!(path = %root.display(), recursive, "list_directory tool");

        if !root.is_dir() {
            return ToolOutput::err(&call.id, format!("Not a directory: {path}"));
        }

        let mut walker = WalkDir::new(&root).min_depth(1);
        if !recursive {
            walker = walker.max_depth(1);
        }
        let mut items = Vec::new();
        let mut total_size = 0u64;
        for entry in walker.into_iter().filter_entry(|e| {
            show_hidden || !e.file_name().to_string_lossy().starts_with('.')
        }) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => return ToolOutput::err(&call.id, e.to_string()),
            };
            let is_dir = entry.file_type().is_dir();
            let size = if is_dir {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            };
            total_size += size;
            let name = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            let language = (!is_dir).then(|| detect_language(&name));
            items.push(Item { name, is_dir, size, language });
        }
        items.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

        let mut out = format!(
            "Directory: {path}\nTotal items: {}, Total size: {total_size} bytes\n\n",
            items.len()
        );
        for item in &items {
            if item.is_dir {
                out.push_str(&format!("[dir]  {}\n", item.name));
            } else {
                let lang = item.language.map(|l| format!(" [{l}]")).unwrap_or_default();
                out.push_str(&format!("[file] {} ({} bytes){lang}\n", item.name, item.size));
            }
        }
        ToolOutput::ok(&call.id, out)
            .with_field("total_size", total_size)
            .with_field("item_count", items.len())
    }
}
