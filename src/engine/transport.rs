//! Outbound side of the chat platform.

use async_trait::async_trait;

use super::event::{MessageId, ThreadId};

/// Send sink for chat messages.
///
/// Implemented by the Telegram adapter in production and by recording
/// fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `content` to `thread`, optionally as a reply, returning the id
    /// of the sent message.
    async fn send_message(
        &self,
        thread: ThreadId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> anyhow::Result<MessageId>;
}
