//! Compiled handler behaviors, looked up by manifest `kind`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;

use super::handler::Handler;

pub type BehaviorFactory =
    Arc<dyn Fn(&toml::Table) -> anyhow::Result<Arc<dyn Handler>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct BehaviorCatalog {
    factories: HashMap<String, BehaviorFactory>,
}

impl BehaviorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `kind`, replacing any earlier one.
    #[must_use]
    pub fn with<F>(mut self, kind: &str, factory: F) -> Self
    where
        F: Fn(&toml::Table) -> anyhow::Result<Arc<dyn Handler>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_lowercase(), Arc::new(factory));
        self
    }

    /// `None` if no behavior is registered for `kind`.
    pub fn build(&self, kind: &str, options: &toml::Table) -> Option<anyhow::Result<Arc<dyn Handler>>> {
        self.factories.get(kind).map(|factory| factory(options))
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Deserialize a manifest's `[options]` table into a typed struct.
pub fn parse_options<T: DeserializeOwned>(options: &toml::Table) -> anyhow::Result<T> {
    toml::Value::Table(options.clone())
        .try_into()
        .context("options do not match the expected shape")
}
