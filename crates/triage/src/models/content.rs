use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
}

/// Attached media. `data` is either base64 encoded bytes or a URL the
/// provider or service can fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub data: String,
    pub mime_type: String,
}

impl MediaContent {
    pub fn is_url(&self) -> bool {
        self.data.starts_with("http://") || self.data.starts_with("https://")
    }

    /// A URL form of the media, inlining base64 payloads as a data URL
    pub fn as_url(&self) -> String {
        if self.is_url() || self.data.starts_with("data:") {
            self.data.clone()
        } else {
            format!("data:{};base64,{}", self.mime_type, self.data)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// A content part supplied by a caller
pub enum Content {
    Text(TextContent),
    Image(MediaContent),
    File(MediaContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(TextContent { text: text.into() })
    }

    pub fn image<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        Content::Image(MediaContent {
            data: data.into(),
            mime_type: mime_type.into(),
        })
    }

    pub fn file<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        Content::File(MediaContent {
            data: data.into(),
            mime_type: mime_type.into(),
        })
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&MediaContent> {
        match self {
            Content::Image(media) | Content::File(media) => Some(media),
            Content::Text(_) => None,
        }
    }
}
