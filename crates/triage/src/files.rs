//! Stand-in URIs for attached media, so tool arguments can point at an
//! attachment without carrying its bytes.
use serde::Serialize;

use crate::models::content::MediaContent;
use crate::models::message::{Message, MessageContent};
use crate::services::MediaSource;

pub const FILE_REFERENCE_PREFIX: &str = "attachment://files/";

/// What a model is told about one attachment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReference {
    pub uri: String,
    pub mime_type: String,
}

/// Attachments of the latest turn, addressed as `attachment://files/<index>`
/// in the order they appear. Lives for one request.
#[derive(Debug, Clone, Default)]
pub struct FileReferences {
    files: Vec<MediaContent>,
}

impl FileReferences {
    pub fn from_message(message: &Message) -> Self {
        let files = message
            .content
            .iter()
            .filter_map(|content| match content {
                MessageContent::Image(media) | MessageContent::File(media) => Some(media.clone()),
                _ => None,
            })
            .collect();
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn references(&self) -> Vec<FileReference> {
        self.files
            .iter()
            .enumerate()
            .map(|(index, media)| FileReference {
                uri: format!("{}{}", FILE_REFERENCE_PREFIX, index),
                mime_type: media.mime_type.clone(),
            })
            .collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.references().into_iter().map(|r| r.uri).collect()
    }

    pub fn get(&self, uri: &str) -> Option<&MediaContent> {
        let index: usize = uri.strip_prefix(FILE_REFERENCE_PREFIX)?.parse().ok()?;
        self.files.get(index)
    }

    /// The attachment behind `uri`, or `uri` itself as an external URL
    pub fn resolve(&self, uri: &str) -> MediaSource {
        match self.get(uri) {
            Some(media) if media.is_url() => MediaSource::Url(media.data.clone()),
            Some(media) => MediaSource::Inline {
                data: media.data.clone(),
                mime_type: media.mime_type.clone(),
            },
            None => MediaSource::Url(uri.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn references() -> FileReferences {
        FileReferences::from_message(
            &Message::user()
                .with_text("what is the total?")
                .with_image("iVBORw0KGgo=", "image/png")
                .with_file("https://example.com/invoice.pdf", "application/pdf"),
        )
    }

    #[test]
    fn test_uris_follow_attachment_order() {
        assert_eq!(
            references().uris(),
            vec!["attachment://files/0", "attachment://files/1"]
        );
    }

    #[test]
    fn test_resolve_known_references() {
        let refs = references();
        assert_eq!(
            refs.resolve("attachment://files/0"),
            MediaSource::Inline {
                data: "iVBORw0KGgo=".to_string(),
                mime_type: "image/png".to_string()
            }
        );
        assert_eq!(
            refs.resolve("attachment://files/1"),
            MediaSource::Url("https://example.com/invoice.pdf".to_string())
        );
    }

    #[test]
    fn test_unknown_uris_pass_through() {
        let refs = references();
        for uri in [
            "attachment://files/7",
            "attachment://files/x",
            "https://example.com/photo.jpg",
        ] {
            assert_eq!(refs.resolve(uri), MediaSource::Url(uri.to_string()));
        }
    }
}
