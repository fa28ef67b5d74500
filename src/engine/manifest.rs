//! TOML handler manifests.
//!
//! ```toml
//! name = "ping"
//! kind = "ping"          # defaults to name
//! aliases = ["latency"]
//! role = "everyone"      # or 0..=3, or a table: [role] run = "thread_admin"
//! cooldown = 2
//! category = "utility"
//! description = "Check bot latency"
//! usage = "{prefix}ping"
//!
//! [options]              # handed to the behavior
//! ```

use serde::Deserialize;

use super::error::LoadError;
use super::source::UnitId;
use crate::permissions::RoleRequirement;

#[derive(Debug, Clone, Deserialize)]
pub struct HandlerManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub role: RoleRequirement,
    /// Seconds between invocations per user.
    #[serde(default, alias = "countDown")]
    pub cooldown: u64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub options: toml::Table,
}

impl HandlerManifest {
    pub fn parse(unit: &UnitId, text: &str) -> Result<Self, LoadError> {
        toml::from_str(text).map_err(|source| LoadError::Parse {
            unit: unit.clone(),
            source,
        })
    }

    /// Lowercased, trimmed name; a blank name counts as missing.
    pub fn normalized_name(&self, unit: &UnitId) -> Result<String, LoadError> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase)
            .ok_or_else(|| LoadError::MissingName { unit: unit.clone() })
    }

    pub fn normalized_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        aliases.sort();
        aliases.dedup();
        aliases
    }
}
