//! Role resolution with a cached thread admin directory.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::AuthorizationLevel;
use crate::cache::{CacheConfig, TypedCache};
use crate::engine::{ThreadId, UserId};

/// External source of per-thread admin lists.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn thread_admins(&self, thread: ThreadId) -> anyhow::Result<HashSet<UserId>>;
}

/// Answers "what authorization level does this user have here".
///
/// Bot owners and bot admins come from configuration. Thread admins are
/// fetched from the [`AdminDirectory`] on a cache miss and refreshed when a
/// membership event says they changed. Lookup failures resolve to
/// [`AuthorizationLevel::Everyone`].
#[derive(Clone)]
pub struct RoleResolver {
    owners: Arc<HashSet<UserId>>,
    admins: Arc<HashSet<UserId>>,
    directory: Arc<dyn AdminDirectory>,
    thread_admins: TypedCache<ThreadId, Arc<HashSet<UserId>>>,
}

impl RoleResolver {
    pub fn new(
        owners: impl IntoIterator<Item = UserId>,
        admins: impl IntoIterator<Item = UserId>,
        directory: Arc<dyn AdminDirectory>,
    ) -> Self {
        Self {
            owners: Arc::new(owners.into_iter().collect()),
            admins: Arc::new(admins.into_iter().collect()),
            directory,
            thread_admins: TypedCache::new("thread_admins", CacheConfig::thread_admins()),
        }
    }

    /// Check if a user is a configured bot owner.
    #[inline]
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owners.contains(&user)
    }

    pub async fn role_of(&self, user: UserId, thread: ThreadId) -> AuthorizationLevel {
        if self.is_owner(user) {
            return AuthorizationLevel::Owner;
        }
        if self.admins.contains(&user) {
            return AuthorizationLevel::BotAdmin;
        }

        match self.cached_thread_admins(thread).await {
            Some(admins) if admins.contains(&user) => AuthorizationLevel::ThreadAdmin,
            _ => AuthorizationLevel::Everyone,
        }
    }

    async fn cached_thread_admins(&self, thread: ThreadId) -> Option<Arc<HashSet<UserId>>> {
        if let Some(cached) = self.thread_admins.get(&thread) {
            debug!("Admin cache hit for thread {}", thread);
            return Some(cached);
        }

        debug!("Admin cache miss for thread {}", thread);
        match self.directory.thread_admins(thread).await {
            Ok(admins) => {
                let admins = Arc::new(admins);
                self.thread_admins.insert(thread, Arc::clone(&admins));
                Some(admins)
            }
            Err(e) => {
                warn!("Admin lookup failed for thread {}: {:#}", thread, e);
                None
            }
        }
    }

    /// Re-fetch a thread's admins now.
    ///
    /// On failure the cached entry is dropped so the next lookup retries.
    pub async fn refresh_thread(&self, thread: ThreadId) {
        match self.directory.thread_admins(thread).await {
            Ok(admins) => {
                debug!("Refreshed {} admins for thread {}", admins.len(), thread);
                self.thread_admins.insert(thread, Arc::new(admins));
            }
            Err(e) => {
                warn!("Admin refresh failed for thread {}: {:#}", thread, e);
                self.invalidate(thread);
            }
        }
    }

    pub fn invalidate(&self, thread: ThreadId) {
        self.thread_admins.invalidate(&thread);
        debug!("Invalidated admin cache for thread {}", thread);
    }
}
