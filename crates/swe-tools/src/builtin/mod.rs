// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use swe_config::ToolsConfig;

use crate::registry::PluginEntry;
use crate::tool::Tool;

pub mod bash;
pub mod editor;
pub mod glob_search;
pub mod grep_search;
pub mod list_directory;
pub mod notebook;
pub mod progress;
pub mod todo_write;
pub mod web;

fn bash(cfg: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(bash::BashTool { timeout_secs: cfg.bash_timeout_secs }))
}
fn editor(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(editor::StrReplaceEditorTool))
}
fn glob_search(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(glob_search::GlobSearchTool))
}
fn grep_search(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(grep_search::GrepSearchTool))
}
fn list_directory(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(list_directory::ListDirectoryTool))
}
fn todo_write(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(todo_write::TodoWriteTool))
}
fn create_summary(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(progress::CreateSummaryTool))
}
fn update_progress(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(progress::UpdateProgressTool))
}
fn ask_user_step(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(progress::AskUserStepTool))
}
fn web_fetch(cfg: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(web::WebFetchTool { max_chars: cfg.web.fetch_max_chars }))
}
fn web_search(cfg: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(web::WebSearchTool { api_key: cfg.web.search_api_key.clone() }))
}
fn notebook_edit(_: &ToolsConfig) -> anyhow::Result<Arc<dyn Tool>> {
    Ok(Arc::new(notebook::NotebookEditTool))
}

/// Every built-in capability, filed under its namespace.
pub fn catalog() -> Vec<PluginEntry> {
    vec![
        PluginEntry { namespace: "core", name: "ask_user_step", factory: ask_user_step },
        PluginEntry { namespace: "core", name: "bash", factory: bash },
        PluginEntry { namespace: "core", name: "create_summary", factory: create_summary },
        PluginEntry { namespace: "core", name: "glob_search", factory: glob_search },
        PluginEntry { namespace: "core", name: "grep_search", factory: grep_search },
        PluginEntry { namespace: "core", name: "list_directory", factory: list_directory },
        PluginEntry { namespace: "core", name: "str_replace_editor", factory: editor },
        PluginEntry { namespace: "core", name: "todo_write", factory: todo_write },
        PluginEntry { namespace: "core", name: "update_progress_md", factory: update_progress },
        PluginEntry { namespace: "web", name: "web_fetch", factory: web_fetch },
        PluginEntry { namespace: "web", name: "web_search", factory: web_search },
        PluginEntry { namespace: "notebooks", name: "notebook_edit", factory: notebook_edit },
    ]
}

/// Configured namespaces minus those switched off by the enable flags.
pub fn enabled_namespaces(cfg: &ToolsConfig) -> Vec<String> {
    cfg.namespaces
        .iter()
        .filter(|ns| match ns.as_str() {
            "web" => cfg.enable_web,
            "notebooks" => cfg.enable_notebooks,
            _ => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;

    fn build(cfg: &ToolsConfig) -> ToolRegistry {
        ToolRegistry::discover(&enabled_namespaces(cfg), &catalog(), cfg, &|_| true)
    }

    #[test]
    fn default_config_registers_everything() {
        let reg = build(&ToolsConfig::default());
        assert_eq!(reg.len(), catalog().len());
        for entry in catalog() {
            assert_eq!(reg.get(entry.name).unwrap().name(), entry.name);
        }
    }

    #[test]
    fn disabling_web_and_notebooks_removes_their_tools() {
        let cfg = ToolsConfig { enable_web: false, enable_notebooks: false, ..ToolsConfig::default() };
        let reg = build(&cfg);
        assert!(reg.get("web_fetch").is_none());
        assert!(reg.get("web_search").is_none());
        assert!(reg.get("notebook_edit").is_none());
        assert!(reg.get("bash").is_some());
        assert_eq!(reg.len(), 9);
    }

    #[test]
    fn schemas_declare_object_parameters() {
        let reg = build(&ToolsConfig::default());
        for s in reg.schemas() {
            assert_eq!(s.parameters["type"], "object", "{}", s.name);
            assert!(!s.description.is_empty());
        }
    }
}
