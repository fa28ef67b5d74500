//! In-process prefix store, used when no database is configured.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::engine::{PrefixStore, ThreadId};

/// Prefix overrides that live only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPrefixStore {
    prefixes: DashMap<ThreadId, String>,
}

impl MemoryPrefixStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrefixStore for MemoryPrefixStore {
    async fn thread_prefix(&self, thread: ThreadId) -> Result<Option<String>> {
        Ok(self.prefixes.get(&thread).map(|p| p.value().clone()))
    }

    async fn set_thread_prefix(&self, thread: ThreadId, prefix: Option<&str>) -> Result<()> {
        match prefix {
            Some(prefix) => {
                self.prefixes.insert(thread, prefix.to_string());
            }
            None => {
                self.prefixes.remove(&thread);
            }
        }
        Ok(())
    }

    async fn all_thread_prefixes(&self) -> Result<HashMap<ThreadId, String>> {
        Ok(self
            .prefixes
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect())
    }
}
