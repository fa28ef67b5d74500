//! Pending reply and reaction continuations.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use super::event::{MessageId, ThreadId, UserId};
use crate::cache::{CacheConfig, TypedCache};

/// Which follow-up event a continuation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationKind {
    Reply,
    Reaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationMode {
    /// Removed atomically by the first matching event.
    #[default]
    Once,
    /// Kept until it expires or is cancelled.
    Persistent,
}

/// A handler's registered interest in follow-ups to one message.
#[derive(Debug, Clone)]
pub struct ContinuationToken {
    pub thread: ThreadId,
    pub anchor: MessageId,
    pub handler: String,
    /// Only this user may continue, when set.
    pub author: Option<UserId>,
    pub payload: Value,
    pub mode: ContinuationMode,
    pub created_at: DateTime<Utc>,
}

impl ContinuationToken {
    pub fn new(thread: ThreadId, anchor: MessageId, handler: impl Into<String>) -> Self {
        Self {
            thread,
            anchor,
            handler: handler.into(),
            author: None,
            payload: Value::Null,
            mode: ContinuationMode::Once,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: UserId) -> Self {
        self.author = Some(author);
        self
    }

    #[must_use]
    pub fn persistent(mut self) -> Self {
        self.mode = ContinuationMode::Persistent;
        self
    }

    pub fn accepts(&self, user: UserId) -> bool {
        self.author.is_none_or(|author| author == user)
    }
}

type AnchorKey = (ThreadId, MessageId);

/// TTL-bounded continuation storage, one map per [`ContinuationKind`].
///
/// Message ids are only unique within a thread, so entries are keyed by
/// `(thread, anchor)`.
#[derive(Clone)]
pub struct ContinuationStore {
    replies: TypedCache<AnchorKey, ContinuationToken>,
    reactions: TypedCache<AnchorKey, ContinuationToken>,
}

impl ContinuationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            replies: TypedCache::new("reply_continuations", CacheConfig::continuations(ttl)),
            reactions: TypedCache::new("reaction_continuations", CacheConfig::continuations(ttl)),
        }
    }

    fn map(&self, kind: ContinuationKind) -> &TypedCache<AnchorKey, ContinuationToken> {
        match kind {
            ContinuationKind::Reply => &self.replies,
            ContinuationKind::Reaction => &self.reactions,
        }
    }

    /// Register a token, replacing any earlier one on the same anchor.
    pub fn register(&self, kind: ContinuationKind, token: ContinuationToken) {
        debug!(
            "Registered {:?} continuation for {} on {}:{}",
            kind, token.handler, token.thread, token.anchor
        );
        self.map(kind).insert((token.thread, token.anchor), token);
    }

    pub fn peek(&self, kind: ContinuationKind, thread: ThreadId, anchor: MessageId) -> Option<ContinuationToken> {
        self.map(kind).get(&(thread, anchor))
    }

    /// Claim a token for one matching event.
    ///
    /// `Once` tokens are taken atomically; of two concurrent callers only
    /// one gets `true`. `Persistent` tokens always succeed while present.
    pub fn consume(&self, kind: ContinuationKind, token: &ContinuationToken) -> bool {
        let key = (token.thread, token.anchor);
        match token.mode {
            ContinuationMode::Once => self.map(kind).take(&key).is_some(),
            ContinuationMode::Persistent => self.map(kind).get(&key).is_some(),
        }
    }

    pub fn cancel(&self, kind: ContinuationKind, thread: ThreadId, anchor: MessageId) {
        self.map(kind).invalidate(&(thread, anchor));
    }

    /// Evict expired tokens now instead of waiting for cache housekeeping.
    pub fn sweep(&self) {
        self.replies.sweep();
        self.reactions.sweep();
    }

    pub fn len(&self) -> u64 {
        self.replies.entry_count() + self.reactions.entry_count()
    }

    /// Sweep on a fixed interval until the runtime shuts down.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep();
                debug!("Continuation sweep done, {} pending", store.len());
            }
        })
    }
}
