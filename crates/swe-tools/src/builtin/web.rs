// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const PREVIEW_CHARS: usize = 1000;
const USER_AGENT: &str = "swe-agent/0.1";

// ── web_fetch ────────────────────────────────────────────────────────────────

pub struct WebFetchTool {
    /// Characters of page text kept after HTML conversion
    pub max_chars: usize,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self { max_chars: 8_000 }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL for documentation or reference. HTML is converted to plain text; \
         a preview is returned together with the analysis prompt."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (http or https)" },
                "prompt": { "type": "string", "description": "What to look for in the content" }
            },
            "required": ["url", "prompt"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &mut ToolContext<'_>) -> ToolOutput {
        let url = match call.args.get("url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'url'"),
        };
        let prompt = call.args.get("prompt").and_then(|v| v.as_str()).unwrap_or("");

        debug!(url = %url, "web_fetch tool");

        match fetch_url(&url).await {
            Ok((status, body)) => {
                let content: String = body.chars().take(self.max_chars).collect();
                let len = content.chars().count();
                let preview: String = content.chars().take(PREVIEW_CHARS).collect();
                let ellipsis = if len > PREVIEW_CHARS { "..." } else { "" };
                ToolOutput::ok(
                    &call.id,
                    format!(
                        "Fetched from {url} ({len} chars)\n\nContent preview:\n{preview}{ellipsis}\n\nAnalysis prompt: {prompt}"
                    ),
                )
                .with_field("url", url)
                .with_field("content_length", len)
                .with_field("status_code", status)
            }
            Err(e) => ToolOutput::err(&call.id, format!("Failed to fetch {url}: {e}")),
        }
    }
}

async fn fetch_url(url: &str) -> anyhow::Result<(u16, String)> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(USER_AGENT)
        .build()?;

    let response = client.get(url).send().await?.error_for_status()?;
    let status = response.status().as_u16();
    let is_html = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_lowercase().contains("html"))
        .unwrap_or(false);
    let body = response.text().await?;
    let text = if is_html { html_to_text(&body) } else { body };
    Ok((status, text))
}

/// Convert HTML to plain text using html2text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

// ── web_search ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct WebSearchTool {
    /// Optional API key override (falls back to env BRAVE_API_KEY)
    pub api_key: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for solutions and information. Requires a Brave Search API key \
         (tools.web.search_api_key or BRAVE_API_KEY). num_results: 1-10 (default 5)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "num_results": { "type": "number", "description": "Number of results (default 5)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &mut ToolContext<'_>) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'query'"),
        };
        let count = call
            .args
            .get("num_results")
            .and_then(|v| v.as_f64())
            .map(|n| n.clamp(1.0, 10.0) as usize)
            .unwrap_or(5);

        debug!(query = %query, count, "web_search tool");

        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("BRAVE_API_KEY").ok());
        let Some(api_key) = api_key else {
            return ToolOutput::err(
                &call.id,
                "Web search is unavailable: set BRAVE_API_KEY or tools.web.search_api_key.",
            );
        };

        match brave_search(&query, count, &api_key).await {
            Ok(results) if results.is_empty() => {
                ToolOutput::err(&call.id, "No results found or query failed.")
            }
            Ok(results) => ToolOutput::ok(
                &call.id,
                format!("Web search results for '{query}':\n\n{}", results.join("\n\n")),
            )
            .with_field("query", query),
            Err(e) => ToolOutput::err(&call.id, format!("search error: {e}")),
        }
    }
}

async fn brave_search(query: &str, count: usize, api_key: &str) -> anyhow::Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
        urlencoding(query),
        count
    );
    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("X-Subscription-Token", api_key)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("Brave API returned status {}", resp.status());
    }
    let body: Value = resp.json().await?;
    Ok(format_results(&body, count))
}

/// `N. [title](url)\nsnippet` lines from a Brave response body.
fn format_results(body: &Value, count: usize) -> Vec<String> {
    body.get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[])
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, r)| {
            let title = r.get("title").and_then(|v| v.as_str()).unwrap_or("(no title)");
            let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let desc = r.get("description").and_then(|v| v.as_str()).unwrap_or("");
            format!("{}. [{title}]({url})\n{desc}", i + 1)
        })
        .collect()
}

fn urlencoding(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('+'),
            c => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use swe_state::TaskState;

    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let text = html_to_text("<html><body><h1>Hello</h1><p>World</p></body></html>");
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn urlencoding_escapes_reserved_and_unicode() {
        assert_eq!(urlencoding("rust async"), "rust+async");
        assert_eq!(urlencoding("a&b"), "a%26b");
        assert_eq!(urlencoding("é"), "%C3%A9");
    }

    #[test]
    fn format_results_numbers_entries() {
        let body = json!({"web": {"results": [
            {"title": "Tokio", "url": "https://tokio.rs", "description": "async runtime"},
            {"title": "Serde", "url": "https://serde.rs", "description": "serialization"}
        ]}});
        let lines = format_results(&body, 1);
        assert_eq!(lines, vec!["1. [Tokio](https://tokio.rs)\nasync runtime"]);
        assert!(format_results(&json!({}), 5).is_empty());
    }

    #[tokio::test]
    async fn search_without_key_is_error() {
        std::env::remove_var("BRAVE_API_KEY");
        let mut state = TaskState::new("t");
        let mut ctx = ToolContext::new(&mut state, Path::new("."));
        let call = ToolCall {
            id: "w1".into(),
            name: "web_search".into(),
            args: json!({"query": "tokio"}),
        };
        let out = WebSearchTool::default().execute(&call, &mut ctx).await;
        assert!(out.error.unwrap().contains("BRAVE_API_KEY"));
    }

    #[tokio::test]
    async fn fetch_requires_url() {
        let mut state = TaskState::new("t");
        let mut ctx = ToolContext::new(&mut state, Path::new("."));
        let call = ToolCall { id: "w2".into(), name: "web_fetch".into(), args: json!({}) };
        let out = WebFetchTool::default().execute(&call, &mut ctx).await;
        assert_eq!(out.error.as_deref(), Some("missing 'url'"));
    }

    #[tokio::test]
    async fn fetch_unreachable_host_fails_cleanly() {
        let mut state = TaskState::new("t");
        let mut ctx = ToolContext::new(&mut state, Path::new("."));
        let call = ToolCall {
            id: "w3".into(),
            name: "web_fetch".into(),
            args: json!({"url": "http://127.0.0.1:9/", "prompt": "x"}),
        };
        let out = WebFetchTool::default().execute(&call, &mut ctx).await;
        assert!(out.error.unwrap().starts_with("Failed to fetch http://127.0.0.1:9/"));
    }
}
