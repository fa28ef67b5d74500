//! Persisted thread settings.

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Per-thread settings document in the `thread_settings` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSettings {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Chat (thread) ID
    pub thread_id: i64,

    /// Command prefix override; absent means the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<mongodb::bson::DateTime>,
}

