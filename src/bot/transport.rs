//! Telegram side of the engine's outbound seams.

use std::collections::HashSet;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;

use super::ThrottledBot;
use crate::engine::{MessageId, ThreadId, Transport, UserId};
use crate::permissions::AdminDirectory;

/// Sends through the throttled bot so Telegram's rate limits hold.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: ThrottledBot,
}

impl TelegramTransport {
    pub fn new(bot: ThrottledBot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        thread: ThreadId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> anyhow::Result<MessageId> {
        let mut req = self.bot.send_message(ChatId(thread.0), content);
        if let Some(anchor) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(teloxide::types::MessageId(anchor.0)));
        }
        let sent = req.await?;
        Ok(MessageId(sent.id.0))
    }
}

/// Chat administrators as reported by Telegram.
#[derive(Clone)]
pub struct TelegramAdmins {
    bot: Bot,
}

impl TelegramAdmins {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AdminDirectory for TelegramAdmins {
    async fn thread_admins(&self, thread: ThreadId) -> anyhow::Result<HashSet<UserId>> {
        // Private chats have positive ids and no administrators.
        if thread.0 > 0 {
            return Ok(HashSet::new());
        }

        let members = self.bot.get_chat_administrators(ChatId(thread.0)).await?;
        Ok(members
            .iter()
            .filter(|member| member.is_privileged())
            .map(|member| UserId(member.user.id.0))
            .collect())
    }
}
