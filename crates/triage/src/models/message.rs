use super::content::{Content, MediaContent, TextContent};
use super::role::Role;
use super::tool::ToolCall;
use crate::errors::ToolResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_call: ToolResult<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub tool_result: ToolResult<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Content passed inside a message, which can be both simple content and tool content
pub enum MessageContent {
    Text(TextContent),
    Image(MediaContent),
    File(MediaContent),
    ToolRequest(ToolRequest),
    ToolResponse(ToolResponse),
}

impl MessageContent {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MessageContent::Text(TextContent { text: text.into() })
    }

    pub fn tool_request<S: Into<String>>(id: S, tool_call: ToolResult<ToolCall>) -> Self {
        MessageContent::ToolRequest(ToolRequest {
            id: id.into(),
            tool_call,
        })
    }

    pub fn tool_response<S: Into<String>>(id: S, tool_result: ToolResult<String>) -> Self {
        MessageContent::ToolResponse(ToolResponse {
            id: id.into(),
            tool_result,
        })
    }

    pub fn as_tool_request(&self) -> Option<&ToolRequest> {
        if let MessageContent::ToolRequest(ref tool_request) = self {
            Some(tool_request)
        } else {
            None
        }
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(self, MessageContent::Image(_) | MessageContent::File(_))
    }
}

impl From<Content> for MessageContent {
    fn from(content: Content) -> Self {
        match content {
            Content::Text(text) => MessageContent::Text(text),
            Content::Image(image) => MessageContent::Image(image),
            Content::File(file) => MessageContent::File(file),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: Vec<MessageContent>,
}

impl Message {
    fn with_role(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: Vec::new(),
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::with_role(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::with_role(Role::Assistant)
    }

    pub fn system() -> Self {
        Self::with_role(Role::System)
    }

    /// Add any MessageContent to the message
    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content.push(content);
        self
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(MessageContent::text(text))
    }

    pub fn with_image<S: Into<String>, T: Into<String>>(self, data: S, mime_type: T) -> Self {
        self.with_content(Content::image(data, mime_type).into())
    }

    pub fn with_file<S: Into<String>, T: Into<String>>(self, data: S, mime_type: T) -> Self {
        self.with_content(Content::file(data, mime_type).into())
    }

    pub fn with_tool_request<S: Into<String>>(
        self,
        id: S,
        tool_call: ToolResult<ToolCall>,
    ) -> Self {
        self.with_content(MessageContent::tool_request(id, tool_call))
    }

    pub fn with_tool_response<S: Into<String>>(self, id: S, result: ToolResult<String>) -> Self {
        self.with_content(MessageContent::tool_response(id, result))
    }

    /// All text parts joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_requests(&self) -> Vec<&ToolRequest> {
        self.content
            .iter()
            .filter_map(|c| c.as_tool_request())
            .collect()
    }

    pub fn has_media(&self) -> bool {
        self.content.iter().any(|c| c.is_media())
    }

    /// A copy of this message with image and file parts removed
    pub fn without_media(&self) -> Message {
        Message {
            role: self.role,
            created: self.created,
            content: self
                .content
                .iter()
                .filter(|c| !c.is_media())
                .cloned()
                .collect(),
        }
    }
}

/// A chat turn as supplied by a caller: the content is either a plain string
/// or an ordered list of content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<Content>),
}

impl From<Turn> for Message {
    fn from(turn: Turn) -> Self {
        let message = Message::with_role(turn.role);
        match turn.content {
            TurnContent::Text(text) => message.with_text(text),
            TurnContent::Parts(parts) => parts
                .into_iter()
                .fold(message, |m, part| m.with_content(part.into())),
        }
    }
}
