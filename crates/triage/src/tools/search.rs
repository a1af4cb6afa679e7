use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{parse_arguments, ToolContext, ToolSpec};
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::Tool;
use crate::services::{MediaCapability, SearchCapability, SearchResponse};

/// Search results kept for the model
pub const MAX_SEARCH_RESULTS: usize = 3;

/// The top results reduced to what a model needs: title, content (or the
/// description when there is none), snippets and url
pub fn condense_results(response: &SearchResponse, limit: usize) -> Value {
    Value::Array(
        response
            .results
            .iter()
            .take(limit)
            .map(|result| {
                json!({
                    "title": result.title,
                    "content": result.content.as_ref().or(result.description.as_ref()),
                    "snippets": result.snippets,
                    "url": result.url,
                })
            })
            .collect(),
    )
}

pub struct WebSearchTool {
    search: Arc<dyn SearchCapability>,
}

impl WebSearchTool {
    pub fn new(search: Arc<dyn SearchCapability>) -> Self {
        Self { search }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl ToolSpec for WebSearchTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "web_search",
            "Search the web for up to date information. Returns the top results with title, content, snippets and url.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {"type": "string", "description": "The search query"}
                }
            }),
        )
    }

    async fn call(&self, arguments: Value, _context: &ToolContext) -> ToolResult<String> {
        let args: SearchArgs = parse_arguments(arguments)?;
        let response = self
            .search
            .search(&args.query)
            .await
            .map_err(|e| ToolError::ExecutionError(format!("{:#}", e)))?;
        Ok(condense_results(&response, MAX_SEARCH_RESULTS).to_string())
    }
}

pub struct ScrapeTool {
    media: Arc<dyn MediaCapability>,
}

impl ScrapeTool {
    pub fn new(media: Arc<dyn MediaCapability>) -> Self {
        Self { media }
    }
}

#[derive(Deserialize)]
struct ScrapeArgs {
    url: String,
    #[serde(default)]
    fields: Vec<String>,
}

#[async_trait]
impl ToolSpec for ScrapeTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "scrape",
            "Scrape a web page and extract the requested fields from it.",
            json!({
                "type": "object",
                "required": ["url", "fields"],
                "properties": {
                    "url": {"type": "string", "description": "The page to scrape"},
                    "fields": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "What to extract, e.g. [\"product price\", \"author\"]"
                    }
                }
            }),
        )
    }

    async fn call(&self, arguments: Value, context: &ToolContext) -> ToolResult<String> {
        let args: ScrapeArgs = parse_arguments(arguments)?;
        let url = context.files.resolve(&args.url).as_url();
        let scraped = self
            .media
            .scrape(&url, &args.fields)
            .await
            .map_err(|e| ToolError::ExecutionError(format!("{:#}", e)))?;
        Ok(scraped.to_string())
    }
}
