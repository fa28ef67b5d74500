//! Per-thread command prefixes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use super::event::ThreadId;

pub const MAX_PREFIX_LEN: usize = 8;

/// Persistent storage for thread prefix overrides.
#[async_trait]
pub trait PrefixStore: Send + Sync {
    async fn thread_prefix(&self, thread: ThreadId) -> anyhow::Result<Option<String>>;

    /// Store an override, or clear it with `None`.
    async fn set_thread_prefix(&self, thread: ThreadId, prefix: Option<&str>) -> anyhow::Result<()>;

    async fn all_thread_prefixes(&self) -> anyhow::Result<HashMap<ThreadId, String>>;
}

#[derive(Debug, Error)]
pub enum PrefixError {
    #[error("prefix must not be empty")]
    Empty,

    #[error("prefix must not contain whitespace")]
    Whitespace,

    #[error("prefix must be at most {MAX_PREFIX_LEN} characters")]
    TooLong,

    #[error("prefix store failed: {0:#}")]
    Store(anyhow::Error),
}

/// Resolves the trigger string for a thread, override first.
#[derive(Clone)]
pub struct PrefixResolver {
    default: Arc<str>,
    overrides: Arc<DashMap<ThreadId, String>>,
    store: Arc<dyn PrefixStore>,
}

impl PrefixResolver {
    pub fn new(default: impl Into<Arc<str>>, store: Arc<dyn PrefixStore>) -> Self {
        Self {
            default: default.into(),
            overrides: Arc::new(DashMap::new()),
            store,
        }
    }

    /// Load all stored overrides. On failure every thread uses the default.
    pub async fn preload(&self) {
        match self.store.all_thread_prefixes().await {
            Ok(all) => {
                let count = all.len();
                for (thread, prefix) in all {
                    self.overrides.insert(thread, prefix);
                }
                info!("Loaded {} thread prefix overrides", count);
            }
            Err(e) => warn!("Could not load thread prefixes, using default: {:#}", e),
        }
    }

    pub fn resolve(&self, thread: ThreadId) -> String {
        self.overrides
            .get(&thread)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| self.default.to_string())
    }

    pub fn default_prefix(&self) -> &str {
        &self.default
    }

    pub fn is_customized(&self, thread: ThreadId) -> bool {
        self.overrides.contains_key(&thread)
    }

    pub fn validate(prefix: &str) -> Result<(), PrefixError> {
        if prefix.is_empty() {
            return Err(PrefixError::Empty);
        }
        if prefix.chars().any(char::is_whitespace) {
            return Err(PrefixError::Whitespace);
        }
        if prefix.chars().count() > MAX_PREFIX_LEN {
            return Err(PrefixError::TooLong);
        }
        Ok(())
    }

    /// Validate, persist, then apply an override.
    pub async fn set(&self, thread: ThreadId, prefix: &str) -> Result<(), PrefixError> {
        Self::validate(prefix)?;
        self.store
            .set_thread_prefix(thread, Some(prefix))
            .await
            .map_err(PrefixError::Store)?;
        self.overrides.insert(thread, prefix.to_string());
        info!("Prefix for thread {} set to {:?}", thread, prefix);
        Ok(())
    }

    pub async fn reset(&self, thread: ThreadId) -> Result<(), PrefixError> {
        self.store
            .set_thread_prefix(thread, None)
            .await
            .map_err(PrefixError::Store)?;
        self.overrides.remove(&thread);
        info!("Prefix for thread {} reset", thread);
        Ok(())
    }
}
