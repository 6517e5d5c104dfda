pub mod demo;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;

/// One chat item as delivered by the remote stream.
///
/// `published_at` is the server-assigned timestamp in milliseconds since the
/// Unix epoch. Messages are never mutated after they are received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub author_id: String,
    pub display_name: String,
    pub text: String,
    pub published_at: i64,
}

impl ChatMessage {
    pub fn new(author_id: impl Into<String>, text: impl Into<String>, published_at: i64) -> Self {
        let author_id = author_id.into();
        Self {
            display_name: author_id.clone(),
            author_id,
            text: text.into(),
            published_at,
        }
    }
}

/// Continuation state for the remote feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCursor {
    /// Opaque token pointing at the next unread position. `None` means
    /// "start from wherever the server starts a new reader".
    pub token: Option<String>,
    /// Server-suggested delay before the next fetch, in milliseconds.
    pub interval_hint_ms: u64,
}

impl PollCursor {
    pub fn is_empty(&self) -> bool {
        self.token.is_none()
    }
}

/// One page of the "list chat messages" call.
#[derive(Debug, Clone, Default)]
pub struct ChatPage {
    pub messages: Vec<ChatMessage>,
    pub next_token: Option<String>,
    pub interval_hint_ms: u64,
}

impl ChatPage {
    pub fn into_cursor(self) -> (Vec<ChatMessage>, PollCursor) {
        (
            self.messages,
            PollCursor {
                token: self.next_token,
                interval_hint_ms: self.interval_hint_ms,
            },
        )
    }
}

#[async_trait]
pub trait ChatFetcher: Send + Sync {
    async fn fetch(&self, stream_id: &str, cursor: &PollCursor) -> Result<ChatPage>;
}
