//! Built-in handler behaviors.
//!
//! Each plugin exposes a `build` factory; manifests under `handlers/` pick
//! one through their `kind` (or, without one, their name).

pub mod help;
pub mod keywords;
pub mod ping;
pub mod prefix;
pub mod reload;
pub mod stats;
pub mod welcome;

use crate::engine::BehaviorCatalog;

/// Catalog of every compiled-in behavior.
pub fn catalog() -> BehaviorCatalog {
    BehaviorCatalog::new()
        .with("help", help::build)
        .with("keywords", keywords::build)
        .with("ping", ping::build)
        .with("prefix", prefix::build)
        .with("reload", reload::build)
        .with("stats", stats::build)
        .with("welcome", welcome::build)
}

/// [`catalog`] plus the engine's probe behavior.
#[cfg(test)]
pub fn test_catalog() -> BehaviorCatalog {
    catalog().with("probe", crate::engine::testing::probe_factory)
}
