use crate::models::message::Message;

/// The running conversation of one request. Augmentation only ever inserts
/// synthetic turns ahead of the final turn, so the caller's last message stays
/// the tail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Plain text of the latest turn, if it has any
    pub fn latest_text(&self) -> Option<String> {
        self.last()
            .map(|m| m.text())
            .filter(|text| !text.trim().is_empty())
    }

    /// Insert a synthetic user turn immediately before the last turn
    pub fn insert_context<S: Into<String>>(&mut self, text: S) {
        let turn = Message::user().with_text(text);
        let position = self.messages.len().saturating_sub(1);
        self.messages.insert(position, turn);
    }

    /// A copy with image and file parts dropped, skipping turns left empty
    pub fn without_media(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(Message::without_media)
            .filter(|m| !m.content.is_empty())
            .collect()
    }
}
