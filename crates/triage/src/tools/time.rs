use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::{ToolContext, ToolSpec};
use crate::errors::ToolResult;
use crate::models::tool::Tool;

pub struct CurrentTimeTool;

#[async_trait]
impl ToolSpec for CurrentTimeTool {
    fn tool(&self) -> Tool {
        Tool::new(
            "current_time",
            "Get the current date and time in UTC.",
            json!({"type": "object", "properties": {}}),
        )
    }

    async fn call(&self, _arguments: Value, _context: &ToolContext) -> ToolResult<String> {
        Ok(Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn test_current_time_is_rfc3339() {
        let now = CurrentTimeTool
            .call(json!({}), &ToolContext::default())
            .await
            .unwrap();
        assert!(DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
