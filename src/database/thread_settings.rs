//! Thread settings repository.
//!
//! Backs the engine's [`PrefixStore`]. Reads happen once at startup (the
//! prefix resolver keeps its own map), so there is no cache layer here.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use mongodb::Collection;
use mongodb::bson::{self, doc};
use mongodb::options::UpdateOptions;
use tracing::{debug, warn};

use super::Database;
use super::models::ThreadSettings;
use crate::engine::{PrefixStore, ThreadId};

pub struct ThreadSettingsRepo {
    collection: Collection<ThreadSettings>,
}

impl ThreadSettingsRepo {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("thread_settings"),
        }
    }

    pub async fn get(&self, thread: ThreadId) -> Result<Option<ThreadSettings>> {
        let filter = doc! { "thread_id": thread.0 };
        Ok(self.collection.find_one(filter).await?)
    }
}

#[async_trait]
impl PrefixStore for ThreadSettingsRepo {
    async fn thread_prefix(&self, thread: ThreadId) -> Result<Option<String>> {
        Ok(self.get(thread).await?.and_then(|settings| settings.prefix))
    }

    async fn set_thread_prefix(&self, thread: ThreadId, prefix: Option<&str>) -> Result<()> {
        let filter = doc! { "thread_id": thread.0 };
        let now = bson::DateTime::now();
        let update = match prefix {
            Some(prefix) => doc! { "$set": { "prefix": prefix, "updated_at": now } },
            None => doc! { "$unset": { "prefix": "" }, "$set": { "updated_at": now } },
        };
        let options = UpdateOptions::builder().upsert(true).build();

        self.collection
            .update_one(filter, update)
            .with_options(options)
            .await?;

        debug!("Saved prefix {:?} for thread {}", prefix, thread);
        Ok(())
    }

    async fn all_thread_prefixes(&self) -> Result<HashMap<ThreadId, String>> {
        let filter = doc! { "prefix": { "$exists": true } };
        let mut cursor = self.collection.find(filter).await?;
        let mut prefixes = HashMap::new();

        while let Some(result) = cursor.next().await {
            match result {
                Ok(ThreadSettings {
                    thread_id,
                    prefix: Some(prefix),
                    ..
                }) => {
                    prefixes.insert(ThreadId(thread_id), prefix);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable thread settings: {}", e),
            }
        }

        Ok(prefixes)
    }
}
