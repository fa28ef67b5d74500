//! Inbound chat events as the engine sees them.
//!
//! The transport adapter converts platform updates into [`InboundEvent`]s;
//! nothing past this point knows which platform produced them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Conversation (group or private chat) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub i64);

/// Message identifier, unique within its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What changed in a thread's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Joined,
    Left,
    AdminsChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A text (or captioned) message, possibly a reply.
    Message,
    /// A reaction placed on `InboundEvent::message_id`.
    Reaction { emoji: String },
    Membership(MembershipChange),
}

/// One inbound unit from the transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub sender: UserId,
    /// Display name of the sender, when the platform supplies one.
    pub sender_name: Option<String>,
    pub thread: ThreadId,
    /// The message itself, or for reactions, the message reacted on.
    pub message_id: MessageId,
    pub body: Option<String>,
    /// Anchor of a reply.
    pub reply_to: Option<MessageId>,
}

impl InboundEvent {
    pub fn message(
        sender: UserId,
        thread: ThreadId,
        message_id: MessageId,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            sender,
            sender_name: None,
            thread,
            message_id,
            body: Some(body.into()),
            reply_to: None,
        }
    }

    pub fn reaction(
        sender: UserId,
        thread: ThreadId,
        anchor: MessageId,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Reaction {
                emoji: emoji.into(),
            },
            sender,
            sender_name: None,
            thread,
            message_id: anchor,
            body: None,
            reply_to: None,
        }
    }

    pub fn membership(sender: UserId, thread: ThreadId, change: MembershipChange) -> Self {
        Self {
            kind: EventKind::Membership(change),
            sender,
            sender_name: None,
            thread,
            message_id: MessageId(0),
            body: None,
            reply_to: None,
        }
    }

    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Mark this event as a reply to `anchor`.
    #[must_use]
    pub fn replying_to(mut self, anchor: MessageId) -> Self {
        self.reply_to = Some(anchor);
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn is_message(&self) -> bool {
        self.kind == EventKind::Message
    }

    pub fn membership_change(&self) -> Option<MembershipChange> {
        match self.kind {
            EventKind::Membership(change) => Some(change),
            _ => None,
        }
    }

    pub fn reaction_emoji(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Reaction { emoji } => Some(emoji),
            _ => None,
        }
    }
}
